use logomatch_core::OrbConfig;
use crate::error::{FastError, FastResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper bound on pyramid depth
pub const MAX_LEVELS: usize = 16;

/// Complete detector configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectorConfig {
    /// Core ORB configuration
    pub core: OrbConfig,
    /// Number of pyramid levels
    pub n_levels: usize,
    /// Downscale ratio between consecutive levels
    pub scale_factor: f32,
    /// Keypoint budget across all levels
    pub max_features: usize,
    /// Minimum distance between retained keypoints of one level; 0 disables
    pub nms_distance: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::balanced_preset()
    }
}

impl DetectorConfig {
    /// Classic ORB parameters: 500 features over 8 levels at 1.2
    pub fn balanced_preset() -> Self {
        Self {
            core: OrbConfig::default(),
            n_levels: 8,
            scale_factor: 1.2,
            max_features: 500,
            nms_distance: 3.0,
        }
    }

    /// Fewer levels and features, higher threshold
    pub fn fast_preset() -> Self {
        Self {
            core: OrbConfig {
                threshold: 30,
                ..OrbConfig::default()
            },
            n_levels: 4,
            scale_factor: 1.3,
            max_features: 300,
            nms_distance: 5.0,
        }
    }

    /// Deeper pyramid and a larger budget
    pub fn precision_preset() -> Self {
        Self {
            core: OrbConfig {
                threshold: 12,
                ..OrbConfig::default()
            },
            n_levels: 10,
            scale_factor: 1.15,
            max_features: 1500,
            nms_distance: 2.0,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> FastResult<()> {
        if self.core.threshold == 0 || self.core.threshold > 127 {
            return Err(FastError::InvalidThreshold(self.core.threshold));
        }
        if self.core.patch_size % 2 == 0 || self.core.patch_size < 7 {
            return Err(FastError::InvalidPatchSize(self.core.patch_size));
        }
        if !(self.scale_factor > 1.0) {
            return Err(FastError::InvalidScaleFactor(self.scale_factor));
        }
        if self.n_levels == 0 || self.n_levels > MAX_LEVELS {
            return Err(FastError::InvalidLevelCount {
                levels: self.n_levels,
                max: MAX_LEVELS,
            });
        }
        if self.max_features == 0 {
            return Err(FastError::NoFeatureBudget);
        }
        Ok(())
    }

    /// Pixels excluded at each level border so the orientation patch fits
    pub fn border(&self) -> usize {
        (self.core.patch_size / 2).max(3) + 1
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "DetectorConfig: threshold={}, patch_size={}, levels={}, scale_factor={:.2}, max_features={}, nms={:.1}",
            self.core.threshold,
            self.core.patch_size,
            self.n_levels,
            self.scale_factor,
            self.max_features,
            self.nms_distance
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for cfg in [
            DetectorConfig::balanced_preset(),
            DetectorConfig::fast_preset(),
            DetectorConfig::precision_preset(),
        ] {
            assert!(cfg.validate().is_ok(), "{}", cfg.summary());
        }
    }

    #[test]
    fn test_invalid_parameters() {
        let mut cfg = DetectorConfig::default();
        cfg.core.threshold = 0;
        assert_eq!(cfg.validate(), Err(FastError::InvalidThreshold(0)));

        let mut cfg = DetectorConfig::default();
        cfg.core.patch_size = 16;
        assert_eq!(cfg.validate(), Err(FastError::InvalidPatchSize(16)));

        let mut cfg = DetectorConfig::default();
        cfg.scale_factor = 1.0;
        assert!(matches!(cfg.validate(), Err(FastError::InvalidScaleFactor(_))));

        let mut cfg = DetectorConfig::default();
        cfg.n_levels = 0;
        assert!(matches!(cfg.validate(), Err(FastError::InvalidLevelCount { .. })));
    }

    #[test]
    fn test_border_covers_patch() {
        let cfg = DetectorConfig::default();
        assert_eq!(cfg.border(), 16);
    }
}
