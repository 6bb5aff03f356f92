use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Errors surfaced by the synthesis pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to decode audio from {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("{stage} failed: {source}")]
    Model {
        stage: Stage,
        #[source]
        source: AdapterError,
    },
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the failure was caused by the request rather than the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::NotFound(_) | Error::Decode { .. }
        )
    }
}

/// Pipeline stage an adapter failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Inference,
    Vocoding,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Embedding => "Reference embedding",
            Stage::Inference => "Model inference",
            Stage::Vocoding => "Vocoder",
        };
        f.write_str(name)
    }
}

/// Errors returned by model and vocoder adapters.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to load engine: {0}")]
    Load(String),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Unsupported configuration format '{0}' (expected yaml, yml, json or toml)")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid TOML configuration: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("Failed to serialize TOML configuration: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_keeps_cause() {
        let err = Error::Model {
            stage: Stage::Inference,
            source: AdapterError::InvalidInput("empty token sequence".into()),
        };
        assert_eq!(
            err.to_string(),
            "Model inference failed: invalid input: empty token sequence"
        );
        let source = std::error::Error::source(&err).expect("cause attached");
        assert_eq!(source.to_string(), "invalid input: empty token sequence");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_client_errors() {
        assert!(Error::InvalidInput("x".into()).is_client_error());
        assert!(Error::NotFound(PathBuf::from("a.wav")).is_client_error());
        assert!(!Error::Timeout(Duration::from_secs(1)).is_client_error());
    }
}
