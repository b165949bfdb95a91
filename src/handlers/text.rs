use crate::backend::InferenceBackend;
use crate::conversation::{ContentItem, Message, Role};
use crate::core::error::QllamaError;
use crate::handlers::{
    Device, GenerationOptions, GenerationOverrides, HandlerKind, ModelHandler, ModelSlot,
};
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_MODEL_ID: &str = "mistralai/Mistral-7B-Instruct-v0.2";

const DEFAULT_OPTIONS: GenerationOptions = GenerationOptions {
    max_new_tokens: 128,
    temperature: 0.7,
    top_p: 0.9,
    sampling_enabled: true,
};

/// Handler for text-only instruct models (Mistral family).
///
/// Messages are flattened to plain text and rendered with the Mistral instruct
/// template before being sent to the backend as a raw completion.
pub struct TextHandler {
    slot: ModelSlot,
}

impl TextHandler {
    pub fn new(model_id: &str, device: Device, backend: Arc<dyn InferenceBackend>) -> Self {
        tracing::info!("Initializing TextHandler for model {} on {}", model_id, device);
        Self {
            slot: ModelSlot::new(model_id.to_string(), device, backend),
        }
    }
}

/// Concatenates the text items of `message`; other items are dropped with a warning.
fn flatten(message: &Message) -> String {
    let mut parts = Vec::new();
    for item in &message.content {
        match item {
            ContentItem::Text { text } => parts.push(text.as_str()),
            ContentItem::ImageRef { locator } | ContentItem::VideoRef { locator } => {
                tracing::warn!(
                    "text-only model ignores attachment {} in {} message",
                    locator,
                    message.role
                );
            }
        }
    }
    parts.join(" ").trim().to_string()
}

/// Mistral instruct format: `<s>[INST] user [/INST]assistant</s>[INST] ...`.
/// System text has no slot of its own and is prefixed to the next user turn.
pub fn render_prompt(conversation: &[(Role, String)]) -> String {
    let mut prompt = String::from("<s>");
    let mut pending_system: Option<String> = None;

    for (role, text) in conversation {
        match role {
            Role::System => {
                pending_system = Some(match pending_system.take() {
                    Some(prev) => format!("{}\n\n{}", prev, text),
                    None => text.clone(),
                });
            }
            Role::User => {
                let body = match pending_system.take() {
                    Some(system) => format!("{}\n\n{}", system, text),
                    None => text.clone(),
                };
                prompt.push_str(&format!("[INST] {} [/INST]", body));
            }
            Role::Assistant => {
                prompt.push_str(&format!("{}</s>", text));
            }
        }
    }

    if let Some(system) = pending_system {
        prompt.push_str(&format!("[INST] {} [/INST]", system));
    }
    prompt
}

/// Removes the decoded prompt from the decoded output.
///
/// When the output does not start with the prompt the cut falls back to the
/// prompt's character length, and the mismatch is logged.
pub fn strip_prompt(prompt: &str, output: &str) -> String {
    match output.strip_prefix(prompt) {
        Some(rest) => rest.trim().to_string(),
        None => {
            tracing::warn!(
                prompt_len = prompt.len(),
                output_len = output.len(),
                "decoded output does not start with the decoded prompt; response may be misaligned"
            );
            output
                .chars()
                .skip(prompt.chars().count())
                .collect::<String>()
                .trim()
                .to_string()
        }
    }
}

#[async_trait]
impl ModelHandler for TextHandler {
    fn model_id(&self) -> &str {
        self.slot.model_id()
    }

    fn device(&self) -> &Device {
        self.slot.device()
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Text
    }

    fn is_loaded(&self) -> bool {
        self.slot.is_loaded()
    }

    fn endpoint(&self) -> Option<&str> {
        self.slot.endpoint()
    }

    fn default_options(&self) -> GenerationOptions {
        DEFAULT_OPTIONS
    }

    async fn load(&mut self) -> Result<(), QllamaError> {
        self.slot.load().await
    }

    async fn generate(
        &mut self,
        messages: &[Message],
        overrides: &GenerationOverrides,
    ) -> Result<String, QllamaError> {
        let model = self.slot.ensure_loaded().await?;

        let conversation: Vec<(Role, String)> =
            messages.iter().map(|m| (m.role, flatten(m))).collect();
        let prompt = render_prompt(&conversation);
        let options = overrides.apply(DEFAULT_OPTIONS);
        tracing::debug!(?options, "Generating with parameters");

        let completion = self
            .slot
            .backend()
            .complete(&model, &prompt, &options)
            .await?;

        Ok(strip_prompt(&completion.prompt, &completion.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    fn user(items: Vec<ContentItem>) -> Message {
        Message::user(items)
    }

    #[test]
    fn renders_mistral_template() {
        let prompt = render_prompt(&[
            (Role::User, "hi".to_string()),
            (Role::Assistant, "hello".to_string()),
            (Role::User, "how are you?".to_string()),
        ]);
        assert_eq!(
            prompt,
            "<s>[INST] hi [/INST]hello</s>[INST] how are you? [/INST]"
        );
    }

    #[test]
    fn system_text_is_folded_into_next_user_turn() {
        let prompt = render_prompt(&[
            (Role::System, "Be brief.".to_string()),
            (Role::User, "Explain rust.".to_string()),
        ]);
        assert_eq!(prompt, "<s>[INST] Be brief.\n\nExplain rust. [/INST]");
    }

    #[test]
    fn flatten_keeps_only_text() {
        let message = user(vec![
            ContentItem::image("cat.png"),
            ContentItem::text("what"),
            ContentItem::video("clip.mp4"),
            ContentItem::text("is this?"),
        ]);
        assert_eq!(flatten(&message), "what is this?");
    }

    #[test]
    fn strip_prompt_exact_prefix() {
        assert_eq!(strip_prompt("<s>[INST] hi [/INST]", "<s>[INST] hi [/INST] Hello!"), "Hello!");
    }

    #[test]
    fn strip_prompt_mismatch_cuts_by_length() {
        // Backend dropped the BOS marker when decoding the output.
        assert_eq!(strip_prompt("<s>abc", "abcdefghi"), "ghi");
        assert_eq!(strip_prompt("a much longer prompt", "short"), "");
    }

    #[tokio::test]
    async fn generate_auto_loads_once() {
        let backend = Arc::new(FakeBackend::with_completion("Paris."));
        let mut handler = TextHandler::new("m", Device::Cpu, backend.clone());
        let messages = vec![user(vec![ContentItem::text("Capital of France?")])];

        assert!(!handler.is_loaded());
        handler.generate(&messages, &GenerationOverrides::default()).await.unwrap();
        assert!(handler.is_loaded());
        assert_eq!(handler.endpoint(), Some("fake://backend"));
        assert_eq!(backend.load_calls(), 1);

        handler.generate(&messages, &GenerationOverrides::default()).await.unwrap();
        assert_eq!(backend.load_calls(), 1);
        assert_eq!(backend.complete_calls(), 2);
    }

    #[tokio::test]
    async fn failed_load_is_fatal_to_the_handler() {
        let backend = Arc::new(FakeBackend::failing_load());
        let mut handler = TextHandler::new("m", Device::Cpu, backend.clone());
        let messages = vec![user(vec![ContentItem::text("hi")])];

        for _ in 0..2 {
            let err = handler
                .generate(&messages, &GenerationOverrides::default())
                .await
                .unwrap_err();
            assert!(matches!(err, QllamaError::BackendUnavailable(_)));
        }

        assert!(!handler.is_loaded());
        assert_eq!(backend.load_calls(), 1);
        assert_eq!(backend.complete_calls(), 0);
    }

    #[tokio::test]
    async fn mixed_content_uses_only_text() {
        let backend = Arc::new(FakeBackend::with_completion("A cat."));
        let mut handler = TextHandler::new("m", Device::Cpu, backend.clone());
        let messages = vec![user(vec![
            ContentItem::image("cat.png"),
            ContentItem::text("describe"),
        ])];

        let response = handler
            .generate(&messages, &GenerationOverrides::default())
            .await
            .unwrap();

        assert_eq!(response, "A cat.");
        assert_eq!(
            backend.last_prompt().as_deref(),
            Some("<s>[INST] describe [/INST]")
        );
    }

    #[tokio::test]
    async fn defaults_sample_and_overrides_apply() {
        let backend = Arc::new(FakeBackend::with_completion("ok"));
        let mut handler = TextHandler::new("m", Device::Cpu, backend.clone());
        let messages = vec![user(vec![ContentItem::text("hi")])];

        handler
            .generate(&messages, &GenerationOverrides::default())
            .await
            .unwrap();
        let used = backend.last_options().unwrap();
        assert!(used.sampling_enabled);
        assert_eq!(used.max_new_tokens, 128);

        let overrides = GenerationOverrides {
            max_new_tokens: Some(5),
            temperature: Some(0.1),
            ..Default::default()
        };
        handler.generate(&messages, &overrides).await.unwrap();
        let used = backend.last_options().unwrap();
        assert_eq!(used.max_new_tokens, 5);
        assert_eq!(used.temperature, 0.1);
        assert_eq!(used.top_p, 0.9);
    }

    #[tokio::test]
    async fn backend_failure_propagates() {
        let backend = Arc::new(FakeBackend::failing_generation());
        let mut handler = TextHandler::new("m", Device::Cpu, backend);
        let messages = vec![user(vec![ContentItem::text("hi")])];

        let err = handler
            .generate(&messages, &GenerationOverrides::default())
            .await
            .unwrap_err();

        assert!(matches!(err, QllamaError::Generation(_)));
    }
}
