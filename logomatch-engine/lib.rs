//! Feature-based logo matching engine.
//!
//! [`MatchEngine`] ties the pieces together: a lazily loaded vision runtime,
//! a template extracted once per load, per-image feature extraction, cross-
//! checked descriptor matching, and a batch orchestrator that turns every
//! reference into a [`ComparisonResult`], falling back instead of failing
//! when a single item cannot be compared.
//!
//! ```no_run
//! use logomatch_engine::{ImageSource, MatchEngine};
//!
//! # async fn run() -> logomatch_engine::EngineResult<()> {
//! let engine = MatchEngine::builder()
//!     .template(ImageSource::path("logo.png"))
//!     .build()?;
//! engine.ensure_ready().await?;
//! let results = engine
//!     .compare_against_all(&ImageSource::path("frame.jpg"), &[ImageSource::path("ref.png")])
//!     .await?;
//! println!("{}", results[0].summary);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod ledger;
pub mod matcher;
pub mod orchestrator;
pub mod overlay;
pub mod provider;
pub mod runtime;
pub mod scorer;
pub mod source;
pub mod template;

use std::sync::Arc;

use logomatch_core::Features;
use tracing::debug;

pub use config::{ComparisonStrategy, EmbeddingConfig, EngineConfig, MatchingConfig, OverlayConfig};
pub use embedding::{EmbeddingComparator, EmbeddingProvider, EmbeddingSimilarity, PixelEmbedder};
pub use error::{
    ConfigError, EmbeddingError, EngineError, EngineResult, ExtractError, InitError, ItemError, MatchError,
    ProviderError,
};
pub use extractor::FeatureExtractor;
pub use ledger::{LedgerStats, ResourceLedger};
pub use orchestrator::{ComparisonOrchestrator, ComparisonResult};
pub use provider::{OrbProvider, RuntimeSignal, VisionProvider};
pub use runtime::{RuntimeLoader, RuntimeState};
pub use scorer::SimilarityScorer;
pub use source::ImageSource;
pub use template::Template;

pub use logomatch_core::{DescriptorSet, Keypoint, MatchCandidate};
pub use logomatch_fast::DetectorConfig;

/// The matching engine
pub struct MatchEngine {
    config: EngineConfig,
    loader: Arc<RuntimeLoader>,
    orchestrator: ComparisonOrchestrator,
    embedding: Arc<EmbeddingComparator>,
    ledger: ResourceLedger,
}

impl MatchEngine {
    pub fn builder() -> MatchEngineBuilder {
        MatchEngineBuilder::default()
    }

    /// Load the vision runtime and the template if not already loaded.
    /// Concurrent callers share a single load.
    pub async fn ensure_ready(&self) -> Result<(), InitError> {
        self.loader.ensure_ready().await
    }

    pub fn state(&self) -> RuntimeState {
        self.loader.state()
    }

    /// Template extracted by the last successful load
    pub fn template(&self) -> Option<Arc<Template>> {
        self.loader.template()
    }

    /// Extract features from one encoded image; requires a ready runtime
    pub fn extract(&self, bytes: &[u8]) -> Result<Features, ExtractError> {
        self.loader.extractor().extract(bytes)
    }

    pub async fn compare_against_all(
        &self,
        captured: &ImageSource,
        references: &[ImageSource],
    ) -> EngineResult<Vec<ComparisonResult>> {
        self.orchestrator.compare_against_all(captured, references).await
    }

    /// Compare a captured image against the loaded template
    pub async fn compare_with_template(&self, captured: &ImageSource) -> EngineResult<ComparisonResult> {
        let template = self.loader.template().ok_or(ExtractError::RuntimeNotReady)?;
        self.orchestrator.compare_with_template(&template, captured).await
    }

    pub fn embedding(&self) -> &EmbeddingComparator {
        &self.embedding
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn bootstrap_attempts(&self) -> usize {
        self.loader.bootstrap_attempts()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for MatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchEngine")
            .field("loader", &self.loader)
            .field("strategy", &self.config.strategy)
            .field("ledger", &self.ledger.stats())
            .finish()
    }
}

/// Builder for [`MatchEngine`]
#[derive(Default)]
pub struct MatchEngineBuilder {
    config: EngineConfig,
    provider: Option<Arc<dyn VisionProvider>>,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    template: Option<ImageSource>,
}

impl MatchEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn strategy(mut self, strategy: ComparisonStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Vision backend; defaults to an [`OrbProvider`] built from the
    /// detector configuration
    pub fn provider(mut self, provider: Arc<dyn VisionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Embedding backend; defaults to a [`PixelEmbedder`]
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding = Some(provider);
        self
    }

    pub fn template(mut self, source: ImageSource) -> Self {
        self.template = Some(source);
        self
    }

    pub fn build(self) -> EngineResult<MatchEngine> {
        let config = self.config;
        config.validate()?;

        let template = self
            .template
            .ok_or_else(|| ConfigError::Invalid("a template image source is required".into()))?;
        let provider: Arc<dyn VisionProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(OrbProvider::new(config.detector.clone()).map_err(ConfigError::from)?),
        };
        let embedding_provider: Arc<dyn EmbeddingProvider> = match self.embedding {
            Some(provider) => provider,
            None => Arc::new(PixelEmbedder::new(config.embedding.input_size)),
        };

        debug!(provider = provider.name(), "{}", config.summary());

        let ledger = ResourceLedger::new();
        let loader = RuntimeLoader::new(provider, template, ledger.clone(), config.load_timeout());
        let embedding = Arc::new(EmbeddingComparator::new(embedding_provider, config.embedding.match_threshold));
        let orchestrator = ComparisonOrchestrator::new(&config, loader.extractor().clone(), Arc::clone(&embedding));

        Ok(MatchEngine {
            config,
            loader,
            orchestrator,
            embedding,
            ledger,
        })
    }
}
