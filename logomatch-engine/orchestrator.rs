//! Batch comparison of one captured image against many references.

use std::fmt;
use std::sync::Arc;

use logomatch_core::Keypoint;
#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ComparisonStrategy, EngineConfig};
use crate::embedding::EmbeddingComparator;
use crate::error::{EngineResult, ItemError};
use crate::extractor::{FeatureExtractor, FeatureView};
use crate::ledger::LedgerScope;
use crate::matcher::DescriptorMatcher;
use crate::overlay::OverlayRenderer;
use crate::scorer::SimilarityScorer;
use crate::source::ImageSource;
use crate::template::Template;

/// Outcome of comparing the captured image with one reference
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ComparisonResult {
    pub source_image: String,
    pub captured_image: String,
    /// JPEG bytes of the blended overlay
    #[cfg_attr(feature = "serde", serde(skip))]
    pub overlay: Option<Vec<u8>>,
    pub similarity_score: f64,
    pub is_match: bool,
    pub good_matches: usize,
    pub summary: String,
}

impl ComparisonResult {
    /// Result standing in for a comparison that could not be carried out
    pub fn fallback(source_image: impl Into<String>, captured_image: impl Into<String>, err: &dyn fmt::Display) -> Self {
        Self {
            source_image: source_image.into(),
            captured_image: captured_image.into(),
            overlay: None,
            similarity_score: 0.0,
            is_match: false,
            good_matches: 0,
            summary: format!("Comparison impossible: {err}"),
        }
    }
}

pub struct ComparisonOrchestrator {
    extractor: FeatureExtractor,
    matcher: DescriptorMatcher,
    scorer: SimilarityScorer,
    overlay: Option<OverlayRenderer>,
    embedding: Arc<EmbeddingComparator>,
    strategy: ComparisonStrategy,
}

impl ComparisonOrchestrator {
    pub fn new(cfg: &EngineConfig, extractor: FeatureExtractor, embedding: Arc<EmbeddingComparator>) -> Self {
        Self {
            extractor,
            matcher: DescriptorMatcher::new(&cfg.matching),
            scorer: SimilarityScorer::new(cfg.matching.match_threshold),
            overlay: cfg.overlay.enabled.then(|| OverlayRenderer::new(cfg.overlay.clone())),
            embedding,
            strategy: cfg.strategy,
        }
    }

    pub fn strategy(&self) -> ComparisonStrategy {
        self.strategy
    }

    /// Compare `captured` against every reference, one result per reference
    /// in input order.
    ///
    /// Per-item failures become fallback results, an unreadable captured
    /// image included; only an unready runtime for the configured strategy
    /// fails the call. The task yields between items.
    pub async fn compare_against_all(
        &self,
        captured: &ImageSource,
        references: &[ImageSource],
    ) -> EngineResult<Vec<ComparisonResult>> {
        match self.strategy {
            ComparisonStrategy::Features => self.extractor.ensure_runtime()?,
            ComparisonStrategy::Embedding => self.embedding.ensure_ready().await?,
        }

        let captured_id = captured.identity();
        info!(
            captured = %captured_id,
            references = references.len(),
            strategy = ?self.strategy,
            "comparing against references"
        );

        let captured_bytes = match read_item(captured, &captured_id).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(captured = %captured_id, error = %err, "captured image unreadable, every reference falls back");
                return Ok(references
                    .iter()
                    .map(|reference| ComparisonResult::fallback(reference.identity(), captured_id.as_str(), &err))
                    .collect());
            }
        };

        let mut results = Vec::with_capacity(references.len());
        for reference in references {
            let source_id = reference.identity();
            let outcome = self.compare_pair(reference, &source_id, &captured_id, &captured_bytes).await;
            let result = match outcome {
                Ok(result) => result,
                Err(err) => {
                    warn!(reference = %source_id, error = %err, "comparison failed, using fallback result");
                    ComparisonResult::fallback(source_id, captured_id.as_str(), &err)
                }
            };
            results.push(result);
            tokio::task::yield_now().await;
        }
        Ok(results)
    }

    /// Compare `captured` against the pre-extracted template
    pub async fn compare_with_template(&self, template: &Template, captured: &ImageSource) -> EngineResult<ComparisonResult> {
        self.extractor.ensure_runtime()?;

        let captured_id = captured.identity();
        let outcome = match read_item(captured, &captured_id).await {
            Ok(bytes) => {
                let scope = self.scope(template.source(), &captured_id);
                let evaluated = match self.extractor.extract_in(&scope, &bytes) {
                    Ok(native) => self.evaluate(&scope, template.source(), template.view(), &captured_id, native.view()),
                    Err(err) => Err(err.into()),
                };
                evaluated
            }
            Err(err) => Err(err),
        };

        Ok(outcome.unwrap_or_else(|err| {
            warn!(template = template.source(), error = %err, "template comparison failed, using fallback result");
            ComparisonResult::fallback(template.source(), captured_id.as_str(), &err)
        }))
    }

    async fn compare_pair(
        &self,
        reference: &ImageSource,
        source_id: &str,
        captured_id: &str,
        captured: &[u8],
    ) -> Result<ComparisonResult, ItemError> {
        let reference_bytes = read_item(reference, source_id).await?;

        match self.strategy {
            ComparisonStrategy::Features => self.compare_features(source_id, &reference_bytes, captured_id, captured),
            ComparisonStrategy::Embedding => {
                self.compare_embeddings(source_id, &reference_bytes, captured_id, captured)
                    .await
            }
        }
    }

    fn compare_features(
        &self,
        source_id: &str,
        reference: &[u8],
        captured_id: &str,
        captured: &[u8],
    ) -> Result<ComparisonResult, ItemError> {
        let scope = self.scope(source_id, captured_id);
        let reference = self.extractor.extract_in(&scope, reference)?;
        let captured = self.extractor.extract_in(&scope, captured)?;
        self.evaluate(&scope, source_id, reference.view(), captured_id, captured.view())
    }

    fn evaluate(
        &self,
        scope: &LedgerScope,
        source_id: &str,
        reference: FeatureView<'_>,
        captured_id: &str,
        captured: FeatureView<'_>,
    ) -> Result<ComparisonResult, ItemError> {
        if reference.keypoints.is_empty() || captured.keypoints.is_empty() {
            debug!(
                reference = reference.keypoints.len(),
                captured = captured.keypoints.len(),
                "no features to match"
            );
            let similarity = self.scorer.evaluate(0, reference.keypoints.len(), captured.keypoints.len());
            return Ok(ComparisonResult {
                source_image: source_id.to_string(),
                captured_image: captured_id.to_string(),
                overlay: self.render(&reference, &captured, &[]),
                similarity_score: similarity.score,
                is_match: similarity.is_match,
                good_matches: 0,
                summary: "Similarity: 0.00% (no features detected)".to_string(),
            });
        }

        let matches = self.matcher.match_in(
            self.extractor.provider().as_ref(),
            scope,
            reference.descriptors,
            captured.descriptors,
        )?;
        let highlights: Vec<Keypoint> = self
            .matcher
            .good_matches(&matches)
            .filter_map(|m| captured.keypoints.get(m.train_idx).copied())
            .collect();
        let good = highlights.len();
        matches.release();

        let similarity = self.scorer.evaluate(good, reference.keypoints.len(), captured.keypoints.len());
        debug!(
            reference = source_id,
            good_matches = good,
            score = similarity.score,
            "features compared"
        );

        Ok(ComparisonResult {
            source_image: source_id.to_string(),
            captured_image: captured_id.to_string(),
            overlay: self.render(&reference, &captured, &highlights),
            similarity_score: similarity.score,
            is_match: similarity.is_match,
            good_matches: good,
            summary: format!("Similarity: {:.2}% ({} matches)", similarity.score * 100.0, good),
        })
    }

    async fn compare_embeddings(
        &self,
        source_id: &str,
        reference: &[u8],
        captured_id: &str,
        captured: &[u8],
    ) -> Result<ComparisonResult, ItemError> {
        let result = self.embedding.compare(reference, captured).await?;
        let verdict = if result.is_match { "match" } else { "no match" };
        Ok(ComparisonResult {
            source_image: source_id.to_string(),
            captured_image: captured_id.to_string(),
            overlay: None,
            similarity_score: result.confidence,
            is_match: result.is_match,
            good_matches: 0,
            summary: format!("Embedding similarity: {:.4} ({verdict})", result.similarity),
        })
    }

    fn render(&self, reference: &FeatureView<'_>, captured: &FeatureView<'_>, highlights: &[Keypoint]) -> Option<Vec<u8>> {
        let renderer = self.overlay.as_ref()?;
        match renderer.render(reference.pixels, captured.pixels, highlights) {
            Ok(jpeg) => Some(jpeg),
            Err(err) => {
                warn!(error = %err, "overlay rendering failed");
                None
            }
        }
    }

    fn scope(&self, source_id: &str, captured_id: &str) -> LedgerScope {
        self.extractor.ledger().scope(format!("{source_id} vs {captured_id}"))
    }
}

async fn read_item(source: &ImageSource, id: &str) -> Result<Arc<[u8]>, ItemError> {
    source.read().await.map_err(|source| ItemError::Read {
        path: id.to_string(),
        source,
    })
}
