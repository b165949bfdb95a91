use crate::core::error::QllamaError;
use crate::handlers::registry::normalize;
use crate::handlers::{Device, GenerationOverrides};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Where the inference server lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Per-device endpoints, keyed by device name (`cpu`, `cuda`, `cuda:1`, ...).
    pub device_endpoints: HashMap<String, String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            device_endpoints: HashMap::new(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub device: Device,
    pub generation: GenerationOverrides,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub defaults: Defaults,
    /// Backend model id per registered model name.
    pub models: HashMap<String, String>,
}

/// Values given on the command line; each one beats the file.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub device: Option<Device>,
    pub base_url: Option<String>,
    pub generation: GenerationOverrides,
}

/// Immutable per-session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Canonical registry name.
    pub model: String,
    pub model_id: Option<String>,
    pub device: Device,
    pub generation: GenerationOverrides,
    pub backend: BackendConfig,
}

impl Config {
    fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".qllama")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.yaml")
    }

    pub fn input_history_path() -> PathBuf {
        Self::config_dir().join("input_history.txt")
    }

    pub fn load() -> Result<Config, QllamaError> {
        Self::load_from(&Self::config_path())
    }

    /// Reads `path`, or writes a default file there when it is missing.
    pub fn load_from(path: &Path) -> Result<Config, QllamaError> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            return serde_yml::from_str::<Config>(&contents)
                .map_err(|e| QllamaError::Config(format!("Parse {}: {}", path.display(), e)));
        }

        let config = Config::default();
        if let Err(e) = config.save_to(path) {
            tracing::warn!("Could not write default config to {}: {}", path.display(), e);
        }
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), QllamaError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let yaml_content = serde_yml::to_string(self)?;
        fs::write(path, yaml_content)?;
        Ok(())
    }

    /// Configured backend model id for a canonical model name.
    pub fn model_id_for(&self, canonical: &str) -> Option<String> {
        self.models
            .iter()
            .find(|(name, _)| normalize(name) == canonical)
            .map(|(_, id)| id.clone())
    }

    /// Merges the file with command-line values and validates the result.
    pub fn session(
        &self,
        canonical: &str,
        cli: CliOverrides,
    ) -> Result<SessionConfig, QllamaError> {
        let generation = cli.generation.or(self.defaults.generation);
        generation.validate()?;

        let mut backend = self.backend.clone();
        if let Some(base_url) = cli.base_url {
            backend.base_url = base_url;
        }

        Ok(SessionConfig {
            model: canonical.to_string(),
            model_id: self.model_id_for(canonical),
            device: cli.device.unwrap_or_else(|| self.defaults.device.clone()),
            generation,
            backend,
        })
    }
}
