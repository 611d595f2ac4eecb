use logomatch_core::GrayFrame;
use crate::types::ScaleLevel;

/// Image pyramid operations for multi-scale feature detection
pub struct ImagePyramid;

impl ImagePyramid {
    /// Scale levels for a `width`x`height` image. Stops early once a level
    /// would be smaller than `min_dim` on either side.
    pub fn generate_scale_levels(
        width: usize,
        height: usize,
        n_levels: usize,
        scale_factor: f32,
        min_dim: usize,
    ) -> Vec<ScaleLevel> {
        let mut levels = Vec::with_capacity(n_levels);
        let mut current_scale = 1.0f32;

        for level in 0..n_levels {
            let scaled_width = ((width as f32) / current_scale).round() as usize;
            let scaled_height = ((height as f32) / current_scale).round() as usize;

            if scaled_width < min_dim || scaled_height < min_dim {
                break;
            }

            levels.push(ScaleLevel {
                level,
                scale: current_scale,
                width: scaled_width,
                height: scaled_height,
            });

            current_scale *= scale_factor;
        }

        levels
    }

    /// Build one frame per scale level
    pub fn build(frame: &GrayFrame, scale_levels: &[ScaleLevel]) -> Vec<GrayFrame> {
        scale_levels
            .iter()
            .map(|level| {
                if level.level == 0 {
                    frame.clone()
                } else {
                    Self::downsample(frame, level.width, level.height)
                }
            })
            .collect()
    }

    /// Downsample using bilinear interpolation
    fn downsample(frame: &GrayFrame, target_width: usize, target_height: usize) -> GrayFrame {
        let mut data = vec![0u8; target_width * target_height];

        let x_ratio = frame.width() as f32 / target_width as f32;
        let y_ratio = frame.height() as f32 / target_height as f32;

        for y in 0..target_height {
            for x in 0..target_width {
                let src_x = x as f32 * x_ratio;
                let src_y = y as f32 * y_ratio;
                data[y * target_width + x] = Self::bilinear_sample(frame, src_x, src_y).round() as u8;
            }
        }

        // dimensions and length are consistent by construction
        GrayFrame::new(target_width, target_height, data)
            .unwrap_or_else(|_| frame.clone())
    }

    /// Sample at fractional coordinates using bilinear interpolation
    pub fn bilinear_sample(frame: &GrayFrame, x: f32, y: f32) -> f32 {
        let (w, h) = (frame.width(), frame.height());
        let x = x.clamp(0.0, (w - 1) as f32);
        let y = y.clamp(0.0, (h - 1) as f32);
        let x1 = x.floor() as usize;
        let y1 = y.floor() as usize;
        let x2 = (x1 + 1).min(w - 1);
        let y2 = (y1 + 1).min(h - 1);

        let fx = x - x1 as f32;
        let fy = y - y1 as f32;

        let p11 = frame.get(x1, y1) as f32;
        let p12 = frame.get(x2, y1) as f32;
        let p21 = frame.get(x1, y2) as f32;
        let p22 = frame.get(x2, y2) as f32;

        let top = p11 * (1.0 - fx) + p12 * fx;
        let bottom = p21 * (1.0 - fx) + p22 * fx;

        top * (1.0 - fy) + bottom * fy
    }
}
