use std::time::Duration;

use logomatch_fast::DetectorConfig;
use crate::error::ConfigError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which statistic `compare_against_all` scores with. One per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ComparisonStrategy {
    /// Good-match ratio of cross-checked ORB descriptors
    #[default]
    Features,
    /// Cosine similarity of image embeddings
    Embedding,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatchingConfig {
    /// A match is good when its Hamming distance is strictly below this
    pub good_match_threshold: u32,
    pub cross_check: bool,
    /// Images match when the score is strictly above this
    pub match_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            good_match_threshold: 50,
            cross_check: true,
            match_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EmbeddingConfig {
    /// Side of the square the image is resized to before embedding
    pub input_size: u32,
    /// Images match when the cosine similarity is strictly above this
    pub match_threshold: f64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            match_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OverlayConfig {
    pub enabled: bool,
    /// Opacity of each blended image
    pub alpha: f32,
    /// Circle the captured image's good-match keypoints
    pub draw_keypoints: bool,
    pub jpeg_quality: u8,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 0.5,
            draw_keypoints: true,
            jpeg_quality: 80,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Bound on waiting for the vision runtime to become ready
    pub load_timeout_ms: u64,
    pub strategy: ComparisonStrategy,
    pub matching: MatchingConfig,
    pub embedding: EmbeddingConfig,
    pub overlay: OverlayConfig,
    pub detector: DetectorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: 15_000,
            strategy: ComparisonStrategy::default(),
            matching: MatchingConfig::default(),
            embedding: EmbeddingConfig::default(),
            overlay: OverlayConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        if self.load_timeout_ms == 0 {
            return Err(ConfigError::Invalid("load_timeout_ms must be greater than 0".into()));
        }
        if !(0.0..=1.0).contains(&self.matching.match_threshold) {
            return Err(ConfigError::Invalid(format!(
                "matching.match_threshold {} outside [0, 1]",
                self.matching.match_threshold
            )));
        }
        if !(-1.0..=1.0).contains(&self.embedding.match_threshold) {
            return Err(ConfigError::Invalid(format!(
                "embedding.match_threshold {} outside [-1, 1]",
                self.embedding.match_threshold
            )));
        }
        if self.embedding.input_size == 0 {
            return Err(ConfigError::Invalid("embedding.input_size must be greater than 0".into()));
        }
        if !(0.0..=1.0).contains(&self.overlay.alpha) {
            return Err(ConfigError::Invalid(format!("overlay.alpha {} outside [0, 1]", self.overlay.alpha)));
        }
        if !(1..=100).contains(&self.overlay.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "overlay.jpeg_quality {} outside 1-100",
                self.overlay.jpeg_quality
            )));
        }
        Ok(())
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "EngineConfig: strategy={:?}, timeout={}ms, good<{}, match>{:.2}, overlay={}; {}",
            self.strategy,
            self.load_timeout_ms,
            self.matching.good_match_threshold,
            self.matching.match_threshold,
            self.overlay.enabled,
            self.detector.summary()
        )
    }

    /// Load configuration from a `.json` or `.toml` file, chosen by extension
    #[cfg(feature = "serde")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Save configuration to a `.json` or `.toml` file, chosen by extension
    #[cfg(feature = "serde")]
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.to_json()?,
            _ => self.to_toml()?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }
}
