use logomatch_core::{GrayFrame, Keypoint};
use crate::config::DetectorConfig;
use crate::corner_detection::CornerDetector;
use crate::error::FastResult;
use crate::pyramid::ImagePyramid;
use crate::refinement::KeypointRefinement;
use crate::types::ScaleLevel;
use rayon::prelude::*;

/// Multi-scale FAST detector. Not bound to an image size: every call sizes
/// its own pyramid from the frame it is given.
#[derive(Debug, Clone)]
pub struct FastDetector {
    cfg: DetectorConfig,
}

impl FastDetector {
    /// Creates a new FAST detector with validation
    pub fn new(cfg: DetectorConfig) -> FastResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// Scale levels that fit a frame of the given size
    pub fn scale_levels(&self, width: usize, height: usize) -> Vec<ScaleLevel> {
        ImagePyramid::generate_scale_levels(
            width,
            height,
            self.cfg.n_levels,
            self.cfg.scale_factor,
            2 * self.cfg.border() + 1,
        )
    }

    /// Keypoint budget of each level, proportional to level area
    pub fn level_budgets(&self, n_levels: usize) -> Vec<usize> {
        if n_levels == 0 {
            return Vec::new();
        }

        let inv = 1.0 / self.cfg.scale_factor as f64;
        let total = self.cfg.max_features as f64;
        let first = total * (1.0 - inv) / (1.0 - inv.powi(n_levels as i32));

        let mut budgets = Vec::with_capacity(n_levels);
        let mut assigned = 0usize;
        let mut share = first;
        for _ in 0..n_levels - 1 {
            let n = share.round() as usize;
            budgets.push(n);
            assigned += n;
            share *= inv;
        }
        budgets.push(self.cfg.max_features.saturating_sub(assigned));
        budgets
    }

    /// Detect oriented keypoints across the pyramid. Frames too small for a
    /// single level yield no keypoints.
    pub fn detect_keypoints(&self, frame: &GrayFrame) -> Vec<Keypoint> {
        let levels = self.scale_levels(frame.width(), frame.height());
        if levels.is_empty() {
            return Vec::new();
        }

        let pyramid = ImagePyramid::build(frame, &levels);
        let budgets = self.level_budgets(levels.len());

        let per_level: Vec<Vec<Keypoint>> = levels
            .par_iter()
            .zip(pyramid.par_iter())
            .zip(budgets.par_iter())
            .map(|((level, img), &budget)| self.detect_at_level(img, level, budget))
            .collect();

        per_level.into_iter().flatten().collect()
    }

    /// Detect keypoints on one level image and map them to level 0
    pub fn detect_at_level(&self, img: &GrayFrame, level: &ScaleLevel, budget: usize) -> Vec<Keypoint> {
        if budget == 0 {
            return Vec::new();
        }

        let border = self.cfg.border();
        let corners = CornerDetector::detect(img, self.cfg.core.threshold, border);
        let mut corners = CornerDetector::suppress_non_maxima(&corners, img.width(), img.height());
        KeypointRefinement::sort_by_response(&mut corners);
        let selected = KeypointRefinement::non_maximum_suppression(&corners, self.cfg.nms_distance, budget);

        let half = self.cfg.core.patch_size / 2;
        let size = self.cfg.core.patch_size as f32 * level.scale;
        selected
            .into_iter()
            .map(|c| Keypoint {
                x: c.x as f32 * level.scale,
                y: c.y as f32 * level.scale,
                angle: KeypointRefinement::compute_orientation(img, c.x, c.y, half),
                response: c.response,
                octave: level.level as u8,
                size,
            })
            .collect()
    }

    /// Get detector configuration
    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }
}
