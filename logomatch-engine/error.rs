use std::time::Duration;

use thiserror::Error;

/// Failures reported by a vision provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("vision runtime is not available")]
    Unavailable,

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("runtime bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("{0}")]
    Failed(String),
}

/// Runtime initialization failures. Every caller waiting on the same load
/// observes the same value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitError {
    #[error("vision runtime not ready after {0:?}")]
    Timeout(Duration),

    #[error("vision runtime bootstrap failed: {0}")]
    BootstrapFailed(String),

    #[error("template extraction failed: {0}")]
    TemplateFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("image could not be decoded: {0}")]
    DecodeFailed(String),

    #[error("vision runtime is not ready; call ensure_ready first")]
    RuntimeNotReady,

    #[error("vision provider error: {0}")]
    Provider(ProviderError),

    #[error("inconsistent features: {0}")]
    Inconsistent(#[from] logomatch_core::CoreError),
}

impl From<ProviderError> for ExtractError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Decode(msg) => ExtractError::DecodeFailed(msg),
            ProviderError::Unavailable => ExtractError::RuntimeNotReady,
            other => ExtractError::Provider(other),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("{0} descriptor set is empty")]
    EmptyDescriptorSet(&'static str),

    #[error("matcher failed: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),

    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("embedding shapes differ: {left} vs {right}")]
    ShapeMismatch { left: usize, right: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "serde")]
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[cfg(feature = "serde")]
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("invalid detector configuration: {0}")]
    Detector(#[from] logomatch_fast::FastError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of one comparison item. The orchestrator folds these into
/// fallback results; they never abort a batch.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Call-level failures of the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type EngineResult<T> = Result<T, EngineError>;
