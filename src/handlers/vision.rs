use crate::backend::{InferenceBackend, ResolvedContent, ResolvedMessage};
use crate::conversation::{ContentItem, Message};
use crate::core::error::QllamaError;
use crate::handlers::{
    Device, GenerationOptions, GenerationOverrides, HandlerKind, ModelHandler, ModelSlot,
};
use crate::media::{MAX_VIDEO_FRAMES, MediaLoader};
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_MODEL_ID: &str = "HuggingFaceTB/SmolVLM2-2.2B-Instruct";

const DEFAULT_OPTIONS: GenerationOptions = GenerationOptions {
    max_new_tokens: 64,
    temperature: 1.0,
    top_p: 1.0,
    sampling_enabled: false,
};

/// Handler for image/video-capable models (SmolVLM2 family).
pub struct VisionHandler {
    slot: ModelSlot,
    media: Arc<dyn MediaLoader>,
}

impl VisionHandler {
    pub fn new(
        model_id: &str,
        device: Device,
        backend: Arc<dyn InferenceBackend>,
        media: Arc<dyn MediaLoader>,
    ) -> Self {
        tracing::info!("Initializing VisionHandler for model {} on {}", model_id, device);
        Self {
            slot: ModelSlot::new(model_id.to_string(), device, backend),
            media,
        }
    }

    /// Replaces every locator with decoded media. The first failure aborts.
    async fn resolve(&self, messages: &[Message]) -> Result<Vec<ResolvedMessage>, QllamaError> {
        let mut resolved = Vec::with_capacity(messages.len());
        for message in messages {
            let mut content = Vec::with_capacity(message.content.len());
            for item in &message.content {
                let item = match item {
                    ContentItem::Text { text } => ResolvedContent::Text(text.clone()),
                    ContentItem::ImageRef { locator } => {
                        ResolvedContent::Image(self.media.load_image(locator).await?)
                    }
                    ContentItem::VideoRef { locator } => ResolvedContent::Video(
                        self.media.load_video(locator, MAX_VIDEO_FRAMES).await?,
                    ),
                };
                content.push(item);
            }
            resolved.push(ResolvedMessage {
                role: message.role,
                content,
            });
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ModelHandler for VisionHandler {
    fn model_id(&self) -> &str {
        self.slot.model_id()
    }

    fn device(&self) -> &Device {
        self.slot.device()
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Vision
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
        let resolved = self.resolve(messages).await?;
        let options = overrides.apply(DEFAULT_OPTIONS);
        tracing::debug!(?options, "Generating with parameters");

        self.slot.backend().chat(&model, &resolved, &options).await
    }
}
