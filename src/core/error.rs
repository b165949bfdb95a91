use std::io;
use thiserror::Error;

/// Unified error type for qllama
#[derive(Error, Debug)]
pub enum QllamaError {
    /// The requested model name is not registered
    #[error("Unknown model: {name}. Available models: {known}")]
    ModelNotFound { name: String, known: String },

    /// The handler for a known model could not be constructed
    #[error("Handler unavailable for model {model}: {reason}")]
    HandlerUnavailable { model: String, reason: String },

    /// The inference backend cannot be reached or cannot serve the model
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A referenced media file or URL does not exist
    #[error("Media not found: {0}")]
    MediaNotFound(String),

    /// Corrupt or unsupported media
    #[error("Decode error: {0}")]
    Decode(String),

    /// Media decoded to zero frames
    #[error("Empty media: {0}")]
    EmptyMedia(String),

    /// The backend failed while generating
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Generation was interrupted by the user
    #[error("Interrupted")]
    Interrupted,

    /// API-level errors returned by the backend server
    #[error("API error: {0}")]
    Api(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// User input errors
    #[error("Input error: {0}")]
    Input(String),

    /// IO-related errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(String),
}

impl QllamaError {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, QllamaError::Interrupted)
    }
}

impl From<reqwest::Error> for QllamaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            QllamaError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            QllamaError::Network(format!("Connection failed: {}", err))
        } else if err.is_status() {
            QllamaError::Api(format!("Server returned error status: {}", err))
        } else {
            QllamaError::Network(format!("Request failed: {}", err))
        }
    }
}

impl From<serde_json::Error> for QllamaError {
    fn from(err: serde_json::Error) -> Self {
        QllamaError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yml::Error> for QllamaError {
    fn from(err: serde_yml::Error) -> Self {
        QllamaError::Serialization(format!("YAML error: {}", err))
    }
}

impl From<image::ImageError> for QllamaError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) if e.kind() == io::ErrorKind::NotFound => {
                QllamaError::MediaNotFound(e.to_string())
            }
            other => QllamaError::Decode(other.to_string()),
        }
    }
}
