use logomatch_core::Features;
use tracing::debug;

use crate::error::InitError;
use crate::extractor::{FeatureExtractor, FeatureView};
use crate::provider::PixelMatrix;
use crate::source::ImageSource;

/// The reference logo, extracted once per successful runtime load and then
/// shared read-only by every comparison.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    pixels: PixelMatrix,
    features: Features,
}

impl Template {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn view(&self) -> FeatureView<'_> {
        FeatureView {
            pixels: &self.pixels,
            keypoints: self.features.keypoints(),
            descriptors: self.features.descriptors(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateExtractor {
    source: ImageSource,
}

impl TemplateExtractor {
    pub fn new(source: ImageSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    /// Read and extract the template. Runs before the runtime is marked
    /// ready, so it bypasses the extractor's readiness check.
    pub async fn extract(&self, extractor: &FeatureExtractor) -> Result<Template, InitError> {
        let failed = |e: &dyn std::fmt::Display| InitError::TemplateFailed(format!("{}: {e}", self.source));

        let bytes = self.source.read().await.map_err(|e| failed(&e))?;
        let scope = extractor.ledger().scope("template");
        let native = extractor.extract_in(&scope, &bytes).map_err(|e| failed(&e))?;
        let features = native.to_features().map_err(|e| failed(&e))?;

        debug!(template = %self.source, keypoints = features.len(), "template extracted");
        Ok(Template {
            source: self.source.identity(),
            pixels: (*native.pixels).clone(),
            features,
        })
    }
}
