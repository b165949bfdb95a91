pub mod registry;
pub mod text;
pub mod vision;

use crate::backend::{InferenceBackend, LoadedModel};
use crate::conversation::Message;
use crate::core::error::QllamaError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Compute device a model should run on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Auto,
    Cpu,
    Cuda(Option<u32>),
    Metal,
}

impl FromStr for Device {
    type Err = QllamaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(None)),
            "metal" | "mps" => Ok(Device::Metal),
            other => match other.strip_prefix("cuda:") {
                Some(index) => index
                    .parse::<u32>()
                    .map(|i| Device::Cuda(Some(i)))
                    .map_err(|_| QllamaError::Config(format!("Invalid CUDA device: {}", s))),
                None => Err(QllamaError::Config(format!(
                    "Unknown device '{}' (expected auto, cpu, cuda, cuda:N or metal)",
                    s
                ))),
            },
        }
    }
}

impl TryFrom<String> for Device {
    type Error = QllamaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Auto => f.write_str("auto"),
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(None) => f.write_str("cuda"),
            Device::Cuda(Some(i)) => write!(f, "cuda:{}", i),
            Device::Metal => f.write_str("metal"),
        }
    }
}

/// Fully resolved sampling parameters for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub sampling_enabled: bool,
}

/// Session-level overrides layered on top of a handler's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOverrides {
    #[serde(default)]
    pub max_new_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub sampling_enabled: Option<bool>,
}

impl GenerationOverrides {
    pub fn validate(&self) -> Result<(), QllamaError> {
        if self.max_new_tokens == Some(0) {
            return Err(QllamaError::Config(
                "max_new_tokens must be a positive integer".to_string(),
            ));
        }
        if let Some(t) = self.temperature {
            if t.is_nan() || t < 0.0 {
                return Err(QllamaError::Config(format!(
                    "temperature must be >= 0, got {}",
                    t
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(p > 0.0 && p <= 1.0) {
                return Err(QllamaError::Config(format!(
                    "top_p must be in (0, 1], got {}",
                    p
                )));
            }
        }
        Ok(())
    }

    /// Fields set here win; everything else falls back to `defaults`.
    pub fn apply(&self, defaults: GenerationOptions) -> GenerationOptions {
        GenerationOptions {
            max_new_tokens: self.max_new_tokens.unwrap_or(defaults.max_new_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            sampling_enabled: self.sampling_enabled.unwrap_or(defaults.sampling_enabled),
        }
    }

    /// Overrides from `self` take priority over `other`.
    pub fn or(self, other: GenerationOverrides) -> GenerationOverrides {
        GenerationOverrides {
            max_new_tokens: self.max_new_tokens.or(other.max_new_tokens),
            temperature: self.temperature.or(other.temperature),
            top_p: self.top_p.or(other.top_p),
            sampling_enabled: self.sampling_enabled.or(other.sampling_enabled),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Text,
    Vision,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Text => f.write_str("text"),
            HandlerKind::Vision => f.write_str("vision"),
        }
    }
}

/// Uniform contract over model families.
///
/// `generate` on an unloaded handler loads it first; `load` on a loaded handler
/// does nothing.
#[async_trait]
pub trait ModelHandler: Send {
    fn model_id(&self) -> &str;
    fn device(&self) -> &Device;
    fn kind(&self) -> HandlerKind;
    fn is_loaded(&self) -> bool;
    /// Where the loaded model is served; `None` until `load` succeeds.
    fn endpoint(&self) -> Option<&str>;
    fn default_options(&self) -> GenerationOptions;

    async fn load(&mut self) -> Result<(), QllamaError>;

    async fn generate(
        &mut self,
        messages: &[Message],
        overrides: &GenerationOverrides,
    ) -> Result<String, QllamaError>;
}

/// UNLOADED / LOADED state shared by the handler variants.
///
/// `Failed` is terminal: the backend is not asked again.
pub(crate) enum LoadState {
    Unloaded,
    Loaded(LoadedModel),
    Failed(String),
}

/// Backend reference plus load state, embedded by each handler variant.
pub(crate) struct ModelSlot {
    model_id: String,
    device: Device,
    backend: Arc<dyn InferenceBackend>,
    state: LoadState,
}

impl ModelSlot {
    pub(crate) fn new(model_id: String, device: Device, backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            model_id,
            device,
            backend,
            state: LoadState::Unloaded,
        }
    }

    pub(crate) fn model_id(&self) -> &str {
        &self.model_id
    }

    pub(crate) fn device(&self) -> &Device {
        &self.device
    }

    pub(crate) fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    pub(crate) fn is_loaded(&self) -> bool {
        matches!(self.state, LoadState::Loaded(_))
    }

    pub(crate) async fn load(&mut self) -> Result<(), QllamaError> {
        match &self.state {
            LoadState::Loaded(_) => return Ok(()),
            LoadState::Failed(reason) => return Err(self.failed(reason)),
            LoadState::Unloaded => {}
        }
        tracing::info!(model = %self.model_id, device = %self.device, "loading model");
        match self.backend.load(&self.model_id, &self.device).await {
            Ok(loaded) => {
                tracing::info!(model = %self.model_id, endpoint = %loaded.endpoint, "model loaded");
                self.state = LoadState::Loaded(loaded);
                Ok(())
            }
            Err(e) => {
                tracing::error!(model = %self.model_id, "failed to load model: {}", e);
                self.state = LoadState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn failed(&self, reason: &str) -> QllamaError {
        QllamaError::BackendUnavailable(format!(
            "model {} failed to load earlier: {}",
            self.model_id, reason
        ))
    }

    /// Backend endpoint serving the model, once loaded.
    pub(crate) fn endpoint(&self) -> Option<&str> {
        match &self.state {
            LoadState::Loaded(model) => Some(&model.endpoint),
            _ => None,
        }
    }

    /// Loads on first use and hands back the loaded model.
    pub(crate) async fn ensure_loaded(&mut self) -> Result<LoadedModel, QllamaError> {
        self.load().await?;
        match &self.state {
            LoadState::Loaded(model) => Ok(model.clone()),
            LoadState::Failed(reason) => Err(self.failed(reason)),
            LoadState::Unloaded => Err(QllamaError::BackendUnavailable(format!(
                "model {} did not load",
                self.model_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    #[test]
    fn device_parsing() {
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda(None));
        assert_eq!("cuda:1".parse::<Device>().unwrap(), Device::Cuda(Some(1)));
        assert_eq!("mps".parse::<Device>().unwrap(), Device::Metal);
        assert!("tpu".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
        assert_eq!(Device::Cuda(Some(2)).to_string(), "cuda:2");
    }

    #[test]
    fn overrides_validation() {
        assert!(GenerationOverrides::default().validate().is_ok());
        let bad_tokens = GenerationOverrides {
            max_new_tokens: Some(0),
            ..Default::default()
        };
        assert!(bad_tokens.validate().is_err());
        let bad_temp = GenerationOverrides {
            temperature: Some(-0.1),
            ..Default::default()
        };
        assert!(bad_temp.validate().is_err());
        for p in [0.0, 1.5, f32::NAN] {
            let bad_top_p = GenerationOverrides {
                top_p: Some(p),
                ..Default::default()
            };
            assert!(bad_top_p.validate().is_err());
        }
        let ok = GenerationOverrides {
            max_new_tokens: Some(1),
            temperature: Some(0.0),
            top_p: Some(1.0),
            sampling_enabled: Some(true),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn overrides_apply_only_set_fields() {
        let defaults = GenerationOptions {
            max_new_tokens: 64,
            temperature: 1.0,
            top_p: 1.0,
            sampling_enabled: false,
        };
        let overrides = GenerationOverrides {
            temperature: Some(0.2),
            ..Default::default()
        };
        let applied = overrides.apply(defaults);
        assert_eq!(applied.temperature, 0.2);
        assert_eq!(applied.max_new_tokens, 64);
        assert!(!applied.sampling_enabled);
    }

    #[test]
    fn overrides_or_prefers_self() {
        let cli = GenerationOverrides {
            max_new_tokens: Some(10),
            ..Default::default()
        };
        let file = GenerationOverrides {
            max_new_tokens: Some(99),
            temperature: Some(0.5),
            ..Default::default()
        };
        let merged = cli.or(file);
        assert_eq!(merged.max_new_tokens, Some(10));
        assert_eq!(merged.temperature, Some(0.5));
    }

    #[tokio::test]
    async fn slot_load_is_idempotent() {
        let backend = Arc::new(FakeBackend::default());
        let mut slot = ModelSlot::new("m".to_string(), Device::Cpu, backend.clone());

        assert!(!slot.is_loaded());
        slot.load().await.unwrap();
        slot.load().await.unwrap();
        slot.ensure_loaded().await.unwrap();

        assert!(slot.is_loaded());
        assert_eq!(backend.load_calls(), 1);
    }

    #[tokio::test]
    async fn slot_load_failure_is_not_retried() {
        let backend = Arc::new(FakeBackend::failing_load());
        let mut slot = ModelSlot::new("m".to_string(), Device::Cpu, backend.clone());

        let err = slot.load().await.unwrap_err();
        assert!(matches!(err, QllamaError::BackendUnavailable(_)));

        let err = slot.ensure_loaded().await.unwrap_err();
        assert!(matches!(err, QllamaError::BackendUnavailable(ref m) if m.contains("fake backend is down")));
        assert!(slot.load().await.is_err());

        assert!(!slot.is_loaded());
        assert_eq!(slot.endpoint(), None);
        assert_eq!(backend.load_calls(), 1);
    }
}
