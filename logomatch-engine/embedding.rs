//! Whole-image embedding comparison, an alternative to feature matching.
//!
//! Scores are cosine similarities of embedding vectors and are never mixed
//! with feature-match scores.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use ndarray::{Array1, Array3};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::EmbeddingError;

/// Backend producing one embedding vector per image
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Bring the backend up; called once before the first embedding
    fn initialize(&self) -> Result<(), EmbeddingError>;

    fn embed(&self, bytes: &[u8]) -> Result<Array1<f32>, EmbeddingError>;

    fn similarity(&self, a: &Array1<f32>, b: &Array1<f32>) -> Result<f64, EmbeddingError> {
        cosine_similarity(a, b)
    }
}

/// Cosine similarity in [-1, 1]; zero when either vector has no magnitude
pub fn cosine_similarity(a: &Array1<f32>, b: &Array1<f32>) -> Result<f64, EmbeddingError> {
    if a.len() != b.len() {
        return Err(EmbeddingError::ShapeMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let a = a.mapv(f64::from);
    let b = b.mapv(f64::from);
    let norms = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norms == 0.0 {
        return Ok(0.0);
    }
    Ok((a.dot(&b) / norms).clamp(-1.0, 1.0))
}

/// Embeds the raw pixels of the image resized to a fixed square
#[derive(Debug, Clone)]
pub struct PixelEmbedder {
    input_size: u32,
}

impl PixelEmbedder {
    pub fn new(input_size: u32) -> Self {
        Self { input_size }
    }

    /// `input_size x input_size x 3` tensor of the resized image
    pub fn tensor(&self, bytes: &[u8]) -> Result<Array3<f32>, EmbeddingError> {
        let rgb = image::load_from_memory(bytes)
            .map_err(|e| EmbeddingError::Decode(e.to_string()))?
            .to_rgb8();
        let n = self.input_size;
        let resized = imageops::resize(&rgb, n, n, FilterType::Nearest);
        let values = resized.into_raw().into_iter().map(f32::from).collect();
        Array3::from_shape_vec((n as usize, n as usize, 3), values).map_err(|e| EmbeddingError::Decode(e.to_string()))
    }
}

impl EmbeddingProvider for PixelEmbedder {
    fn name(&self) -> &str {
        "pixels"
    }

    fn initialize(&self) -> Result<(), EmbeddingError> {
        if self.input_size == 0 {
            return Err(EmbeddingError::Unavailable("input size must be non-zero".into()));
        }
        Ok(())
    }

    fn embed(&self, bytes: &[u8]) -> Result<Array1<f32>, EmbeddingError> {
        let tensor = self.tensor(bytes)?;
        Ok(Array1::from_iter(tensor.iter().copied()))
    }
}

/// Result of comparing two embeddings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddingSimilarity {
    pub similarity: f64,
    /// `similarity` clamped to [0, 1]
    pub confidence: f64,
    pub is_match: bool,
}

/// Lazily initialized embedding backend plus its match threshold
pub struct EmbeddingComparator {
    provider: Arc<dyn EmbeddingProvider>,
    match_threshold: f64,
    ready: OnceCell<()>,
}

impl EmbeddingComparator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, match_threshold: f64) -> Self {
        Self {
            provider,
            match_threshold,
            ready: OnceCell::new(),
        }
    }

    /// Initialize the backend once; concurrent callers share the attempt and
    /// a failed attempt is retried by the next call.
    pub async fn ensure_ready(&self) -> Result<(), EmbeddingError> {
        self.ready
            .get_or_try_init(|| async {
                debug!(provider = self.provider.name(), "initializing embedding backend");
                self.provider.initialize()
            })
            .await
            .map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    pub fn evaluate(&self, similarity: f64) -> EmbeddingSimilarity {
        EmbeddingSimilarity {
            similarity,
            confidence: similarity.clamp(0.0, 1.0),
            is_match: similarity > self.match_threshold,
        }
    }

    pub async fn compare(&self, a: &[u8], b: &[u8]) -> Result<EmbeddingSimilarity, EmbeddingError> {
        self.ensure_ready().await?;
        let left = self.provider.embed(a)?;
        let right = self.provider.embed(b)?;
        let similarity = self.provider.similarity(&left, &right)?;
        Ok(self.evaluate(similarity))
    }
}

impl std::fmt::Debug for EmbeddingComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingComparator")
            .field("provider", &self.provider.name())
            .field("match_threshold", &self.match_threshold)
            .field("ready", &self.is_ready())
            .finish()
    }
}
