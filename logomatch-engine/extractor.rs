use std::sync::Arc;

use logomatch_core::{CoreError, DescriptorSet, Features, Keypoint};
use tracing::debug;

use crate::error::ExtractError;
use crate::ledger::{LedgerScope, Native, ResourceLedger};
use crate::provider::{KeypointVector, PixelMatrix, VisionProvider};
use crate::runtime::RuntimeStatus;

/// Natives produced while extracting one image, owned by the caller's scope
#[derive(Debug)]
pub struct NativeFeatures<'s> {
    pub pixels: Native<'s, PixelMatrix>,
    pub keypoints: Native<'s, KeypointVector>,
    pub descriptors: Native<'s, DescriptorSet>,
}

impl NativeFeatures<'_> {
    pub fn view(&self) -> FeatureView<'_> {
        FeatureView {
            pixels: &self.pixels,
            keypoints: &self.keypoints,
            descriptors: &self.descriptors,
        }
    }

    /// Copy out of the native handles; the handles stay owned by the scope
    pub fn to_features(&self) -> Result<Features, CoreError> {
        Features::new(self.keypoints.to_vec(), (*self.descriptors).clone())
    }
}

/// Borrowed pixels and features of one side of a comparison
#[derive(Debug, Clone, Copy)]
pub struct FeatureView<'a> {
    pub pixels: &'a PixelMatrix,
    pub keypoints: &'a [Keypoint],
    pub descriptors: &'a DescriptorSet,
}

/// decode -> grayscale -> detect -> describe
#[derive(Clone)]
pub struct FeatureExtractor {
    provider: Arc<dyn VisionProvider>,
    status: RuntimeStatus,
    ledger: ResourceLedger,
}

impl FeatureExtractor {
    pub fn new(provider: Arc<dyn VisionProvider>, status: RuntimeStatus, ledger: ResourceLedger) -> Self {
        Self {
            provider,
            status,
            ledger,
        }
    }

    /// Extract owned features from an encoded image.
    ///
    /// Fails with [`ExtractError::RuntimeNotReady`] unless the runtime has
    /// finished loading. Every intermediate allocation is released before
    /// returning, whatever the outcome.
    pub fn extract(&self, bytes: &[u8]) -> Result<Features, ExtractError> {
        self.ensure_runtime()?;
        self.extract_owned(bytes)
    }

    pub fn ensure_runtime(&self) -> Result<(), ExtractError> {
        if self.status.is_ready() {
            Ok(())
        } else {
            Err(ExtractError::RuntimeNotReady)
        }
    }

    /// Extraction without the readiness check, for the loader itself
    pub(crate) fn extract_owned(&self, bytes: &[u8]) -> Result<Features, ExtractError> {
        let scope = self.ledger.scope("extract");
        let native = self.extract_in(&scope, bytes)?;
        Ok(native.to_features()?)
    }

    /// Extract into natives owned by `scope`. The intensity matrix is
    /// released before this returns.
    pub fn extract_in<'s>(&self, scope: &'s LedgerScope, bytes: &[u8]) -> Result<NativeFeatures<'s>, ExtractError> {
        let pixels = self.provider.decode(scope, bytes)?;
        let gray = self.provider.to_intensity(scope, &pixels)?;
        let keypoints = self.provider.detect(scope, &gray)?;
        let descriptors = self.provider.compute(scope, &gray, &keypoints)?;
        gray.release();

        if keypoints.len() != descriptors.len() {
            return Err(CoreError::LengthMismatch {
                keypoints: keypoints.len(),
                descriptors: descriptors.len(),
            }
            .into());
        }

        debug!(
            scope = scope.label(),
            width = pixels.width(),
            height = pixels.height(),
            keypoints = keypoints.len(),
            "features extracted"
        );
        Ok(NativeFeatures {
            pixels,
            keypoints,
            descriptors,
        })
    }

    pub fn provider(&self) -> &Arc<dyn VisionProvider> {
        &self.provider
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }
}
