use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FastError {
    #[error("invalid threshold: {0} (must be 1-127)")]
    InvalidThreshold(u8),

    #[error("invalid patch size {0} (must be odd and at least 7)")]
    InvalidPatchSize(usize),

    #[error("invalid scale factor {0} (must be greater than 1)")]
    InvalidScaleFactor(f32),

    #[error("pyramid needs between 1 and {max} levels, got {levels}")]
    InvalidLevelCount { levels: usize, max: usize },

    #[error("max_features must be greater than 0")]
    NoFeatureBudget,

    #[error(transparent)]
    Core(#[from] logomatch_core::CoreError),
}

pub type FastResult<T> = Result<T, FastError>;
