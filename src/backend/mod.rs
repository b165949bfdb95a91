pub mod http_client;
pub mod openai_compatible;

use crate::conversation::Role;
use crate::core::error::QllamaError;
use crate::handlers::{Device, GenerationOptions};
use crate::media::DecodedImage;
use async_trait::async_trait;

/// Handle returned by a successful [`InferenceBackend::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModel {
    pub model_id: String,
    pub endpoint: String,
}

/// Raw completion output, both sides decoded by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The decoded input prompt.
    pub prompt: String,
    /// The decoded full output: prompt followed by the continuation.
    pub text: String,
}

/// Content with every media locator replaced by decoded pixels.
#[derive(Debug, Clone)]
pub enum ResolvedContent {
    Text(String),
    Image(DecodedImage),
    Video(Vec<DecodedImage>),
}

#[derive(Debug, Clone)]
pub struct ResolvedMessage {
    pub role: Role,
    pub content: Vec<ResolvedContent>,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn load(&self, model_id: &str, device: &Device) -> Result<LoadedModel, QllamaError>;

    /// Plain prompt completion; the caller owns prompt formatting.
    async fn complete(
        &self,
        model: &LoadedModel,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, QllamaError>;

    /// Structured chat; the backend owns template formatting and media placement.
    async fn chat(
        &self,
        model: &LoadedModel,
        messages: &[ResolvedMessage],
        options: &GenerationOptions,
    ) -> Result<String, QllamaError>;
}
