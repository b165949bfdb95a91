use crate::backend::http_client::HttpClient;
use crate::backend::{
    Completion, InferenceBackend, LoadedModel, ResolvedContent, ResolvedMessage,
};
use crate::config::BackendConfig;
use crate::core::error::QllamaError;
use crate::handlers::{Device, GenerationOptions};
use crate::media::DecodedImage;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    echo: bool,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatCompletionMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatCompletionMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: Option<String>,
}

/// Backend talking to a locally hosted OpenAI-compatible inference server
/// (vLLM, llama.cpp server, LM Studio, ...).
pub struct OpenAiCompatibleBackend {
    default_client: HttpClient,
    device_clients: HashMap<String, HttpClient>,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, QllamaError> {
        let timeout = config.timeout_secs.map(Duration::from_secs);
        let default_client = HttpClient::new(&config.base_url, config.api_key.clone(), timeout)?;

        let mut device_clients = HashMap::new();
        for (device, endpoint) in &config.device_endpoints {
            let key = device.parse::<Device>()?.to_string();
            let client = HttpClient::new(endpoint, config.api_key.clone(), timeout)?;
            device_clients.insert(key, client);
        }

        Ok(Self {
            default_client,
            device_clients,
        })
    }

    /// Endpoint for `device`: an exact per-device entry, then the bare `cuda`
    /// entry for indexed CUDA devices, then the default.
    fn client_for_device(&self, device: &Device) -> &HttpClient {
        let exact = self.device_clients.get(&device.to_string());
        let family = match device {
            Device::Cuda(Some(_)) => self.device_clients.get(&Device::Cuda(None).to_string()),
            _ => None,
        };
        exact.or(family).unwrap_or(&self.default_client)
    }

    fn client_for_model(&self, model: &LoadedModel) -> Result<&HttpClient, QllamaError> {
        std::iter::once(&self.default_client)
            .chain(self.device_clients.values())
            .find(|client| client.endpoint() == model.endpoint)
            .ok_or_else(|| {
                QllamaError::Generation(format!("No client for endpoint {}", model.endpoint))
            })
    }

    /// Model ids the default endpoint currently serves.
    pub async fn served_models(&self) -> Result<Vec<String>, QllamaError> {
        list_models(&self.default_client).await
    }

    pub fn default_endpoint(&self) -> &str {
        self.default_client.endpoint()
    }
}

async fn list_models(client: &HttpClient) -> Result<Vec<String>, QllamaError> {
    let response = client.get("models").await?;
    let list: ModelList = response.json().await?;
    Ok(list.data.into_iter().map(|m| m.id).collect())
}

/// Greedy decoding when sampling is off.
fn sampling_params(options: &GenerationOptions) -> (f32, f32) {
    if options.sampling_enabled {
        (options.temperature, options.top_p)
    } else {
        (0.0, 1.0)
    }
}

fn encode_data_url(image: &DecodedImage) -> Result<String, QllamaError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| QllamaError::Decode(format!("PNG encode failed: {}", e)))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(buf.into_inner());
    Ok(format!("data:image/png;base64,{}", encoded))
}

fn to_chat_messages(
    messages: &[ResolvedMessage],
) -> Result<Vec<ChatCompletionMessage>, QllamaError> {
    messages
        .iter()
        .map(|m| {
            let mut content = Vec::with_capacity(m.content.len());
            for item in &m.content {
                match item {
                    ResolvedContent::Text(text) => {
                        content.push(ContentPart::Text { text: text.clone() })
                    }
                    ResolvedContent::Image(image) => content.push(ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: encode_data_url(image)?,
                        },
                    }),
                    ResolvedContent::Video(frames) => {
                        for frame in frames {
                            content.push(ContentPart::ImageUrl {
                                image_url: ImageUrl {
                                    url: encode_data_url(frame)?,
                                },
                            });
                        }
                    }
                }
            }
            Ok(ChatCompletionMessage {
                role: m.role.to_string(),
                content,
            })
        })
        .collect()
}

#[async_trait]
impl InferenceBackend for OpenAiCompatibleBackend {
    async fn load(&self, model_id: &str, device: &Device) -> Result<LoadedModel, QllamaError> {
        let client = self.client_for_device(device);
        tracing::debug!(endpoint = client.endpoint(), %device, "querying served models");

        let served = list_models(client).await.map_err(|e| {
            QllamaError::BackendUnavailable(format!("{}: {}", client.endpoint(), e))
        })?;

        if !served.iter().any(|id| id == model_id) {
            return Err(QllamaError::BackendUnavailable(format!(
                "{} does not serve {} (served: {})",
                client.endpoint(),
                model_id,
                if served.is_empty() {
                    "none".to_string()
                } else {
                    served.join(", ")
                }
            )));
        }

        Ok(LoadedModel {
            model_id: model_id.to_string(),
            endpoint: client.endpoint().to_string(),
        })
    }

    async fn complete(
        &self,
        model: &LoadedModel,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, QllamaError> {
        let (temperature, top_p) = sampling_params(options);
        let payload = CompletionRequest {
            model: &model.model_id,
            prompt,
            max_tokens: options.max_new_tokens,
            temperature,
            top_p,
            echo: true,
            stream: false,
        };

        let response = self.client_for_model(model)?.post("completions", &payload).await?;
        let parsed: CompletionResponse = response.json().await?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| QllamaError::Generation("No choices in completion response".into()))?;

        Ok(Completion {
            prompt: prompt.to_string(),
            text,
        })
    }

    async fn chat(
        &self,
        model: &LoadedModel,
        messages: &[ResolvedMessage],
        options: &GenerationOptions,
    ) -> Result<String, QllamaError> {
        let (temperature, top_p) = sampling_params(options);
        let payload = ChatCompletionRequest {
            model: &model.model_id,
            messages: to_chat_messages(messages)?,
            max_tokens: options.max_new_tokens,
            temperature,
            top_p,
            stream: false,
        };

        let response = self
            .client_for_model(model)?
            .post("chat/completions", &payload)
            .await?;
        let parsed: ChatCompletionResponse = response.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default().trim().to_string())
            .ok_or_else(|| QllamaError::Generation("No choices in chat response".into()))
    }
}
