use logomatch_core::GrayFrame;
use crate::types::{Corner, CornerType};
use crate::utils::{has_contiguous_arc, ARC_LENGTH};
use rayon::prelude::*;

/// FAST-9 segment test and grid non-maximum suppression
pub struct CornerDetector;

impl CornerDetector {
    /// Bresenham circle of radius 3, in circular order
    pub const FAST_OFFSETS: [(i32, i32); 16] = [
        (0, -3), (1, -3), (2, -2), (3, -1),
        (3, 0), (3, 1), (2, 2), (1, 3),
        (0, 3), (-1, 3), (-2, 2), (-3, 1),
        (-3, 0), (-3, -1), (-2, -2), (-1, -3),
    ];

    /// Detect corners inside `border` pixels of the frame edge, rows in parallel
    pub fn detect(frame: &GrayFrame, threshold: u8, border: usize) -> Vec<Corner> {
        let (w, h) = (frame.width(), frame.height());
        let border = border.max(3);
        if w <= 2 * border || h <= 2 * border {
            return Vec::new();
        }

        (border..h - border)
            .into_par_iter()
            .flat_map_iter(|y| {
                let mut row = Vec::new();
                for x in border..w - border {
                    if let Some(response) = Self::segment_test(frame, x, y, threshold) {
                        row.push(Corner { x, y, response });
                    }
                }
                row
            })
            .collect()
    }

    /// Response of the pixel at (x, y) if it passes FAST-9, `None` otherwise.
    /// The caller guarantees a 3-pixel margin.
    pub fn segment_test(frame: &GrayFrame, x: usize, y: usize, threshold: u8) -> Option<f32> {
        let p = frame.get(x, y);
        let bright_limit = p.saturating_add(threshold);
        let dark_limit = p.saturating_sub(threshold);

        let sample = |i: usize| {
            let (dx, dy) = Self::FAST_OFFSETS[i];
            frame.get((x as i32 + dx) as usize, (y as i32 + dy) as usize)
        };

        // Any arc of 9 covers at least two of the four compass pixels
        let compass = [sample(0), sample(4), sample(8), sample(12)];
        let bright_compass = compass.iter().filter(|&&q| q >= bright_limit && p < 255).count();
        let dark_compass = compass.iter().filter(|&&q| q <= dark_limit && p > 0).count();
        if bright_compass < 2 && dark_compass < 2 {
            return None;
        }

        let mut bright_mask = 0u16;
        let mut dark_mask = 0u16;
        let mut bright_sum = 0i32;
        let mut dark_sum = 0i32;
        for i in 0..16 {
            let q = sample(i);
            if p < 255 && q >= bright_limit {
                bright_mask |= 1 << i;
                bright_sum += q as i32 - p as i32;
            } else if p > 0 && q <= dark_limit {
                dark_mask |= 1 << i;
                dark_sum += p as i32 - q as i32;
            }
        }

        let corner_type = if has_contiguous_arc(bright_mask, ARC_LENGTH) {
            CornerType::Bright
        } else if has_contiguous_arc(dark_mask, ARC_LENGTH) {
            CornerType::Dark
        } else {
            CornerType::None
        };

        // Mean intensity difference over the contributing pixels
        match corner_type {
            CornerType::Bright => Some(bright_sum as f32 / bright_mask.count_ones() as f32),
            CornerType::Dark => Some(dark_sum as f32 / dark_mask.count_ones() as f32),
            CornerType::None => None,
        }
    }

    /// Keep corners whose response is maximal in their 3x3 neighbourhood.
    /// Ties go to the corner earlier in raster order.
    pub fn suppress_non_maxima(corners: &[Corner], width: usize, height: usize) -> Vec<Corner> {
        if corners.is_empty() {
            return Vec::new();
        }

        let mut response_map = vec![0f32; width * height];
        for c in corners {
            response_map[c.y * width + c.x] = c.response;
        }

        corners
            .iter()
            .filter(|c| {
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = c.x as i32 + dx;
                        let ny = c.y as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                            continue;
                        }
                        let r = response_map[ny as usize * width + nx as usize];
                        let earlier = dy < 0 || (dy == 0 && dx < 0);
                        if r > c.response || (r == c.response && earlier) {
                            return false;
                        }
                    }
                }
                true
            })
            .copied()
            .collect()
    }
}
