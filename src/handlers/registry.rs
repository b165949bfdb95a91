use crate::backend::InferenceBackend;
use crate::backend::openai_compatible::OpenAiCompatibleBackend;
use crate::config::BackendConfig;
use crate::core::error::QllamaError;
use crate::handlers::text::{self, TextHandler};
use crate::handlers::vision::{self, VisionHandler};
use crate::handlers::{Device, HandlerKind, ModelHandler};
use crate::media::{LocalMediaLoader, MediaLoader};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

/// Everything a constructor needs to build a handler.
pub struct HandlerContext<'a> {
    pub backend: &'a BackendConfig,
    pub device: Device,
    /// Backend model id from configuration; the entry's default when `None`.
    pub model_id: Option<String>,
}

type HandlerConstructor = Box<
    dyn Fn(&str, &HandlerContext<'_>) -> Result<Box<dyn ModelHandler>, QllamaError>
        + Send
        + Sync,
>;

pub struct RegistryEntry {
    pub kind: HandlerKind,
    pub default_model_id: &'static str,
    constructor: HandlerConstructor,
}

pub struct HandlerRegistry {
    entries: BTreeMap<&'static str, RegistryEntry>,
}

static REGISTRY: LazyLock<HandlerRegistry> = LazyLock::new(HandlerRegistry::new);

/// The process-wide registry.
pub fn registry() -> &'static HandlerRegistry {
    &REGISTRY
}

/// Lower-cases and strips `-` and `_`.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn build_vision(
    model_id: &str,
    ctx: &HandlerContext<'_>,
) -> Result<Box<dyn ModelHandler>, QllamaError> {
    let backend: Arc<dyn InferenceBackend> = Arc::new(OpenAiCompatibleBackend::new(ctx.backend)?);
    let media: Arc<dyn MediaLoader> = Arc::new(LocalMediaLoader::new()?);
    Ok(Box::new(VisionHandler::new(
        model_id,
        ctx.device.clone(),
        backend,
        media,
    )))
}

fn build_text(
    model_id: &str,
    ctx: &HandlerContext<'_>,
) -> Result<Box<dyn ModelHandler>, QllamaError> {
    let backend: Arc<dyn InferenceBackend> = Arc::new(OpenAiCompatibleBackend::new(ctx.backend)?);
    Ok(Box::new(TextHandler::new(model_id, ctx.device.clone(), backend)))
}

impl HandlerRegistry {
    fn new() -> Self {
        let mut entries = BTreeMap::new();

        entries.insert(
            "smolvlm2",
            RegistryEntry {
                kind: HandlerKind::Vision,
                default_model_id: vision::DEFAULT_MODEL_ID,
                constructor: Box::new(build_vision) as HandlerConstructor,
            },
        );

        entries.insert(
            "mistral",
            RegistryEntry {
                kind: HandlerKind::Text,
                default_model_id: text::DEFAULT_MODEL_ID,
                constructor: Box::new(build_text) as HandlerConstructor,
            },
        );

        Self { entries }
    }

    /// Canonical names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &RegistryEntry)> {
        self.entries.iter().map(|(name, entry)| (*name, entry))
    }

    /// Canonical registry key for a user-supplied model name.
    pub fn canonical_name(&self, name: &str) -> Result<&'static str, QllamaError> {
        let key = normalize(name);
        self.entries
            .get_key_value(key.as_str())
            .map(|(canonical, _)| *canonical)
            .ok_or_else(|| QllamaError::ModelNotFound {
                name: name.to_string(),
                known: self.names().join(", "),
            })
    }

    pub fn resolve(
        &self,
        name: &str,
        ctx: &HandlerContext<'_>,
    ) -> Result<Box<dyn ModelHandler>, QllamaError> {
        let canonical = self.canonical_name(name)?;
        let entry = &self.entries[canonical];
        let model_id = ctx
            .model_id
            .clone()
            .unwrap_or_else(|| entry.default_model_id.to_string());

        (entry.constructor)(&model_id, ctx).map_err(|e| {
            tracing::error!("Failed to load handler for model {}: {}", name, e);
            QllamaError::HandlerUnavailable {
                model: canonical.to_string(),
                reason: e.to_string(),
            }
        })
    }
}
