//! Multi-scale FAST keypoint detection.
//!
//! FAST-9 segment test on every level of a scale pyramid, 3x3 non-maximum
//! suppression, a per-level feature budget and intensity-centroid
//! orientation. Keypoints come back in level-0 coordinates.

pub mod config;
pub mod corner_detection;
pub mod detector;
pub mod error;
pub mod pyramid;
pub mod refinement;
pub mod types;
pub mod utils;

pub use config::{DetectorConfig, MAX_LEVELS};
pub use detector::FastDetector;
pub use error::{FastError, FastResult};
pub use types::{Corner, ScaleLevel};
