use logomatch_core::GrayFrame;
use crate::types::Corner;

/// Orientation and keypoint selection
pub struct KeypointRefinement;

impl KeypointRefinement {
    /// Orientation by the intensity centroid of the circular patch of radius
    /// `half` around (x, y). Samples outside the frame are clamped.
    pub fn compute_orientation(frame: &GrayFrame, x: usize, y: usize, half: usize) -> f32 {
        let half = half as i32;
        let radius_sq = half * half;
        let (cx, cy) = (x as i32, y as i32);
        let mut m10 = 0i64;
        let mut m01 = 0i64;

        for dy in -half..=half {
            for dx in -half..=half {
                if dx * dx + dy * dy > radius_sq {
                    continue;
                }
                let val = frame.get_clamped(cx + dx, cy + dy) as i64;
                m10 += dx as i64 * val;
                m01 += dy as i64 * val;
            }
        }

        if m10 == 0 && m01 == 0 {
            0.0
        } else {
            (m01 as f32).atan2(m10 as f32)
        }
    }

    /// Strongest corners first, ties broken by raster position so the
    /// ordering is deterministic
    pub fn sort_by_response(corners: &mut [Corner]) {
        corners.sort_by(|a, b| {
            b.response
                .partial_cmp(&a.response)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
    }

    /// Greedy distance suppression over corners sorted by response, stopping
    /// once `limit` corners are accepted
    pub fn non_maximum_suppression(sorted: &[Corner], min_distance: f32, limit: usize) -> Vec<Corner> {
        let mut accepted: Vec<Corner> = Vec::with_capacity(limit.min(sorted.len()));
        let min_distance_sq = min_distance * min_distance;

        for candidate in sorted {
            if accepted.len() >= limit {
                break;
            }

            let too_close = min_distance > 0.0
                && accepted.iter().any(|existing| {
                    let dx = candidate.x as f32 - existing.x as f32;
                    let dy = candidate.y as f32 - existing.y as f32;
                    dx * dx + dy * dy < min_distance_sq
                });

            if !too_close {
                accepted.push(*candidate);
            }
        }

        accepted
    }
}
