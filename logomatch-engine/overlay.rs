//! Visual overlay of a comparison: both images blended on one canvas with the
//! captured image's good-match keypoints circled, encoded as JPEG.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageResult, Rgb, RgbImage, RgbaImage};
use imageproc::drawing::draw_hollow_circle_mut;
use logomatch_core::Keypoint;

use crate::config::OverlayConfig;

const HIGHLIGHT: Rgb<u8> = Rgb([255, 0, 0]);

#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    cfg: OverlayConfig,
}

impl OverlayRenderer {
    pub fn new(cfg: OverlayConfig) -> Self {
        Self { cfg }
    }

    /// Blend `reference` then `captured` onto a black canvas sized to fit both
    pub fn compose(&self, reference: &RgbaImage, captured: &RgbaImage, highlights: &[Keypoint]) -> RgbImage {
        let width = reference.width().max(captured.width());
        let height = reference.height().max(captured.height());
        let mut canvas = RgbImage::new(width, height);

        blend(&mut canvas, reference, self.cfg.alpha);
        blend(&mut canvas, captured, self.cfg.alpha);

        if self.cfg.draw_keypoints {
            for kp in highlights {
                let radius = (kp.size / 8.0).round().max(3.0) as i32;
                draw_hollow_circle_mut(&mut canvas, (kp.x.round() as i32, kp.y.round() as i32), radius, HIGHLIGHT);
            }
        }
        canvas
    }

    pub fn render(&self, reference: &RgbaImage, captured: &RgbaImage, highlights: &[Keypoint]) -> ImageResult<Vec<u8>> {
        let canvas = self.compose(reference, captured, highlights);
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.cfg.jpeg_quality).write_image(
            canvas.as_raw(),
            canvas.width(),
            canvas.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(jpeg)
    }
}

/// Source-over with a global alpha, honouring the source's own alpha channel
fn blend(canvas: &mut RgbImage, src: &RgbaImage, alpha: f32) {
    for (x, y, px) in src.enumerate_pixels() {
        let a = alpha * px[3] as f32 / 255.0;
        let dst = canvas.get_pixel_mut(x, y);
        for c in 0..3 {
            dst[c] = (px[c] as f32 * a + dst[c] as f32 * (1.0 - a)).round() as u8;
        }
    }
}
