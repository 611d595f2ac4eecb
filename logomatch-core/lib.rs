//! Shared data model for the logo matching workspace.
//!
//! Everything here is plain owned data: frames, keypoints, descriptors and
//! match candidates. Detection, description and matching live in the sibling
//! crates and only exchange these types.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Row-major 8-bit grayscale pixels
pub type Image = Vec<u8>;

/// Width in bytes of one binary descriptor (256 bits)
pub const DESCRIPTOR_BYTES: usize = 32;

/// 256-bit binary descriptor = 32 bytes
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid frame dimensions: {width}x{height} (must be > 0)")]
    InvalidDimensions { width: usize, height: usize },

    #[error("frame data length mismatch: expected {expected}, got {actual}")]
    DataLength { expected: usize, actual: usize },

    #[error("{keypoints} keypoints but {descriptors} descriptors")]
    LengthMismatch { keypoints: usize, descriptors: usize },

    #[error("patch size {0} is too small for a descriptor (minimum 7)")]
    PatchTooSmall(usize),
}

/// Single-channel intensity image with its dimensions attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    width: usize,
    height: usize,
    data: Image,
}

impl GrayFrame {
    pub fn new(width: usize, height: usize, data: Image) -> Result<Self, CoreError> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidDimensions { width, height });
        }
        let expected = width * height;
        if data.len() != expected {
            return Err(CoreError::DataLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Frame filled with a single intensity
    pub fn filled(width: usize, height: usize, value: u8) -> Result<Self, CoreError> {
        Self::new(width, height, vec![value; width * height])
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Sample with coordinates clamped to the frame
    #[inline]
    pub fn get_clamped(&self, x: i32, y: i32) -> u8 {
        let xx = x.clamp(0, self.width as i32 - 1) as usize;
        let yy = y.clamp(0, self.height as i32 - 1) as usize;
        self.data[yy * self.width + xx]
    }

    pub fn into_pixels(self) -> Image {
        self.data
    }
}

/// Oriented keypoint in level-0 coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Orientation in radians
    pub angle: f32,
    /// Detector response, larger is stronger
    pub response: f32,
    /// Pyramid level the keypoint was found on
    pub octave: u8,
    /// Diameter of the described neighbourhood at level 0
    pub size: f32,
}

impl Keypoint {
    /// Scale of the keypoint's pyramid level relative to level 0
    pub fn scale(&self, patch_size: usize) -> f32 {
        if patch_size == 0 {
            1.0
        } else {
            self.size / patch_size as f32
        }
    }
}

/// Ordered descriptors, index-aligned with a keypoint sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSet {
    rows: Vec<Descriptor>,
}

impl DescriptorSet {
    pub fn new(rows: Vec<Descriptor>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Descriptor> {
        self.rows.get(idx)
    }

    pub fn as_slice(&self) -> &[Descriptor] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Descriptor> {
        self.rows.iter()
    }
}

impl From<Vec<Descriptor>> for DescriptorSet {
    fn from(rows: Vec<Descriptor>) -> Self {
        Self::new(rows)
    }
}

/// Keypoints plus their descriptors, `keypoints.len() == descriptors.len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Features {
    keypoints: Vec<Keypoint>,
    descriptors: DescriptorSet,
}

impl Features {
    pub fn new(keypoints: Vec<Keypoint>, descriptors: DescriptorSet) -> Result<Self, CoreError> {
        if keypoints.len() != descriptors.len() {
            return Err(CoreError::LengthMismatch {
                keypoints: keypoints.len(),
                descriptors: descriptors.len(),
            });
        }
        Ok(Self {
            keypoints,
            descriptors,
        })
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &DescriptorSet {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Keypoint>, DescriptorSet) {
        (self.keypoints, self.descriptors)
    }
}

/// Correspondence between `query[query_idx]` and `train[train_idx]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchCandidate {
    pub query_idx: usize,
    pub train_idx: usize,
    /// Hamming distance in bits
    pub distance: u32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OrbConfig {
    /// FAST intensity threshold
    pub threshold: u8,
    /// Side of the square neighbourhood used for orientation and BRIEF
    pub patch_size: usize,
    pub n_threads: usize,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            patch_size: 31,
            n_threads: num_cpus::get().max(1),
        }
    }
}

/// Build a dedicated Rayon thread pool with the specified number of threads
pub fn build_thread_pool(n_threads: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads.max(1))
        .thread_name(|i| format!("logomatch-{i}"))
        .build()
}
