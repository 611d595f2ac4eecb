use logomatch_core::{CoreError, Descriptor, DescriptorSet, GrayFrame, Keypoint, DESCRIPTOR_BYTES};
use rayon::prelude::*;

mod matcher;

pub use matcher::{hamming_distance, BruteForceMatcher, MAX_DISTANCE};

/// Number of intensity comparisons per descriptor
pub const DESCRIPTOR_BITS: usize = DESCRIPTOR_BYTES * 8;

/// Smallest patch that leaves room for the sampling pattern
pub const MIN_PATCH_SIZE: usize = 7;

/// Box filter radius applied before sampling
const SMOOTHING_RADIUS: usize = 2;

const PATTERN_SEED: u64 = 0x0b5e_55ed_0f0b_41ef;

/// Rotated BRIEF over a fixed sampling pattern.
#[derive(Debug, Clone)]
pub struct BriefGenerator {
    patch_size: usize,
    pattern: Vec<(f32, f32, f32, f32)>,
}

impl BriefGenerator {
    pub fn new(patch_size: usize) -> Result<Self, CoreError> {
        if patch_size < MIN_PATCH_SIZE {
            return Err(CoreError::PatchTooSmall(patch_size));
        }
        Ok(Self {
            patch_size,
            pattern: Self::sampling_pattern(patch_size),
        })
    }

    pub fn patch_size(&self) -> usize {
        self.patch_size
    }

    /// 256 point pairs drawn from an isotropic Gaussian with sigma = patch/5,
    /// clipped to the patch. The seed is fixed, so every generator built for
    /// the same patch size compares the same pixels.
    fn sampling_pattern(patch_size: usize) -> Vec<(f32, f32, f32, f32)> {
        let limit = (patch_size / 2) as f32 - 2.0;
        let sigma = patch_size as f32 / 5.0;
        let mut state = PATTERN_SEED;

        let mut next_unit = move || {
            // splitmix64
            state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^= z >> 31;
            (z >> 11) as f32 / (1u64 << 53) as f32
        };

        // Irwin-Hall approximation of a standard normal
        let mut gaussian = move || {
            let sum: f32 = (0..12).map(|_| next_unit()).sum();
            ((sum - 6.0) * sigma).clamp(-limit, limit).round()
        };

        (0..DESCRIPTOR_BITS)
            .map(|_| (gaussian(), gaussian(), gaussian(), gaussian()))
            .collect()
    }

    /// One descriptor per keypoint, in keypoint order
    pub fn generate_descriptors(&self, frame: &GrayFrame, kps: &[Keypoint]) -> DescriptorSet {
        let smoothed = smooth(frame);

        let rows: Vec<Descriptor> = kps
            .par_iter()
            .map(|kp| self.describe(&smoothed, kp))
            .collect();

        DescriptorSet::new(rows)
    }

    fn describe(&self, smoothed: &GrayFrame, kp: &Keypoint) -> Descriptor {
        let scale = kp.scale(self.patch_size);
        let (s, c) = kp.angle.sin_cos();
        let (s, c) = (s * scale, c * scale);
        let mut d = [0u8; DESCRIPTOR_BYTES];

        for (i, &(dx1, dy1, dx2, dy2)) in self.pattern.iter().enumerate() {
            let (rx1, ry1) = (kp.x + c * dx1 - s * dy1, kp.y + s * dx1 + c * dy1);
            let (rx2, ry2) = (kp.x + c * dx2 - s * dy2, kp.y + s * dx2 + c * dy2);

            let val1 = bilinear_sample(smoothed, rx1, ry1);
            let val2 = bilinear_sample(smoothed, rx2, ry2);

            let bit = (val1 < val2) as u8;
            d[i / 8] |= bit << (i % 8);
        }
        d
    }
}

/// Box blur via an integral image, borders use the clipped window
pub fn smooth(frame: &GrayFrame) -> GrayFrame {
    let (w, h) = (frame.width(), frame.height());
    let stride = w + 1;
    let mut integral = vec![0u32; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u32;
        for x in 0..w {
            row_sum += frame.get(x, y) as u32;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let r = SMOOTHING_RADIUS;
    let mut out = vec![0u8; w * h];
    for y in 0..h {
        let (y0, y1) = (y.saturating_sub(r), (y + r + 1).min(h));
        for x in 0..w {
            let (x0, x1) = (x.saturating_sub(r), (x + r + 1).min(w));
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let area = ((y1 - y0) * (x1 - x0)) as u32;
            out[y * w + x] = ((sum + area / 2) / area) as u8;
        }
    }

    GrayFrame::new(w, h, out).unwrap_or_else(|_| frame.clone())
}

/// Bilinear interpolation for subpixel sampling, clamped to the frame
fn bilinear_sample(frame: &GrayFrame, x: f32, y: f32) -> f32 {
    let (w, h) = (frame.width(), frame.height());
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);

    let dx = x - x0 as f32;
    let dy = y - y0 as f32;

    let p00 = frame.get(x0, y0) as f32;
    let p10 = frame.get(x1, y0) as f32;
    let p01 = frame.get(x0, y1) as f32;
    let p11 = frame.get(x1, y1) as f32;

    let top = p00 * (1.0 - dx) + p10 * dx;
    let bottom = p01 * (1.0 - dx) + p11 * dx;

    top * (1.0 - dy) + bottom * dy
}
