//! The capability surface the engine consumes, and its built-in ORB backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use image::RgbaImage;
use logomatch_brief::{BriefGenerator, BruteForceMatcher};
use logomatch_core::{build_thread_pool, DescriptorSet, GrayFrame, Keypoint, MatchCandidate};
use logomatch_fast::{DetectorConfig, FastDetector, FastResult};
use tokio::sync::watch;
use tracing::{debug, error};

use crate::error::ProviderError;
use crate::ledger::{LedgerScope, Native, ResourceKind};

pub type PixelMatrix = RgbaImage;
pub type KeypointVector = Vec<Keypoint>;
pub type MatchVector = Vec<MatchCandidate>;

/// Readiness as announced by the runtime itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeSignal {
    Pending,
    Ready,
    Failed(String),
}

/// Vision primitives behind the engine.
///
/// `bootstrap` only starts initialization; the runtime raises
/// [`RuntimeSignal::Ready`] on the `readiness` channel when it is usable,
/// possibly long after `bootstrap` returned. Every allocating call hands its
/// result to the caller's [`LedgerScope`].
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Runtime already usable, no bootstrap needed
    fn is_available(&self) -> bool;

    fn bootstrap(&self) -> Result<(), ProviderError>;

    fn readiness(&self) -> watch::Receiver<RuntimeSignal>;

    fn decode<'s>(&self, scope: &'s LedgerScope, bytes: &[u8]) -> Result<Native<'s, PixelMatrix>, ProviderError>;

    fn to_intensity<'s>(
        &self,
        scope: &'s LedgerScope,
        pixels: &PixelMatrix,
    ) -> Result<Native<'s, GrayFrame>, ProviderError>;

    fn detect<'s>(&self, scope: &'s LedgerScope, gray: &GrayFrame) -> Result<Native<'s, KeypointVector>, ProviderError>;

    fn compute<'s>(
        &self,
        scope: &'s LedgerScope,
        gray: &GrayFrame,
        keypoints: &[Keypoint],
    ) -> Result<Native<'s, DescriptorSet>, ProviderError>;

    fn matcher<'s>(
        &self,
        scope: &'s LedgerScope,
        cross_check: bool,
    ) -> Result<Native<'s, BruteForceMatcher>, ProviderError>;

    fn match_descriptors<'s>(
        &self,
        scope: &'s LedgerScope,
        matcher: &BruteForceMatcher,
        query: &DescriptorSet,
        train: &DescriptorSet,
    ) -> Result<Native<'s, MatchVector>, ProviderError>;
}

struct OrbRuntime {
    n_threads: usize,
    pool: OnceLock<rayon::ThreadPool>,
    signal: watch::Sender<RuntimeSignal>,
    bootstrapping: AtomicBool,
}

impl OrbRuntime {
    fn install_pool(&self) -> Result<(), ProviderError> {
        let pool = build_thread_pool(self.n_threads).map_err(|e| ProviderError::Bootstrap(e.to_string()))?;
        // a concurrent bootstrap may have won; keep the first pool
        let _ = self.pool.set(pool);
        self.signal.send_replace(RuntimeSignal::Ready);
        Ok(())
    }
}

/// ORB backend: FAST detection, rotated BRIEF, Hamming brute force, all run
/// on a dedicated thread pool that bootstrap creates.
#[derive(Clone)]
pub struct OrbProvider {
    runtime: Arc<OrbRuntime>,
    detector: Arc<FastDetector>,
    brief: Arc<BriefGenerator>,
}

impl OrbProvider {
    /// Provider whose runtime starts on the first `bootstrap`
    pub fn new(cfg: DetectorConfig) -> FastResult<Self> {
        let n_threads = cfg.core.n_threads;
        let patch_size = cfg.core.patch_size;
        let detector = FastDetector::new(cfg)?;
        let brief = BriefGenerator::new(patch_size)?;
        let (signal, _) = watch::channel(RuntimeSignal::Pending);

        Ok(Self {
            runtime: Arc::new(OrbRuntime {
                n_threads,
                pool: OnceLock::new(),
                signal,
                bootstrapping: AtomicBool::new(false),
            }),
            detector: Arc::new(detector),
            brief: Arc::new(brief),
        })
    }

    /// Provider whose runtime is already up, as if loaded by another consumer
    pub fn preloaded(cfg: DetectorConfig) -> Result<Self, crate::error::ConfigError> {
        let provider = Self::new(cfg)?;
        provider
            .runtime
            .install_pool()
            .map_err(|e| crate::error::ConfigError::Invalid(e.to_string()))?;
        Ok(provider)
    }

    pub fn detector_config(&self) -> &DetectorConfig {
        self.detector.config()
    }

    fn pool(&self) -> Result<&rayon::ThreadPool, ProviderError> {
        self.runtime.pool.get().ok_or(ProviderError::Unavailable)
    }
}

impl VisionProvider for OrbProvider {
    fn name(&self) -> &str {
        "orb"
    }

    fn is_available(&self) -> bool {
        self.runtime.pool.get().is_some()
    }

    fn bootstrap(&self) -> Result<(), ProviderError> {
        if self.is_available() || self.runtime.bootstrapping.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.runtime.signal.send_replace(RuntimeSignal::Pending);
        let runtime = Arc::clone(&self.runtime);
        let spawned = std::thread::Builder::new()
            .name("logomatch-bootstrap".into())
            .spawn(move || {
                if let Err(e) = runtime.install_pool() {
                    error!(error = %e, "ORB runtime bootstrap failed");
                    runtime.signal.send_replace(RuntimeSignal::Failed(e.to_string()));
                }
                runtime.bootstrapping.store(false, Ordering::Release);
            });

        match spawned {
            Ok(_) => {
                debug!(threads = self.runtime.n_threads, "ORB runtime bootstrap started");
                Ok(())
            }
            Err(e) => {
                self.runtime.bootstrapping.store(false, Ordering::Release);
                Err(ProviderError::Bootstrap(e.to_string()))
            }
        }
    }

    fn readiness(&self) -> watch::Receiver<RuntimeSignal> {
        self.runtime.signal.subscribe()
    }

    fn decode<'s>(&self, scope: &'s LedgerScope, bytes: &[u8]) -> Result<Native<'s, PixelMatrix>, ProviderError> {
        self.pool()?;
        let pixels = image::load_from_memory(bytes)
            .map_err(|e| ProviderError::Decode(e.to_string()))?
            .to_rgba8();
        Ok(scope.adopt(ResourceKind::PixelMatrix, pixels))
    }

    fn to_intensity<'s>(
        &self,
        scope: &'s LedgerScope,
        pixels: &PixelMatrix,
    ) -> Result<Native<'s, GrayFrame>, ProviderError> {
        self.pool()?;
        let gray = image::imageops::grayscale(pixels);
        let (w, h) = gray.dimensions();
        let frame = GrayFrame::new(w as usize, h as usize, gray.into_raw())
            .map_err(|e| ProviderError::Failed(e.to_string()))?;
        Ok(scope.adopt(ResourceKind::IntensityMatrix, frame))
    }

    fn detect<'s>(
        &self,
        scope: &'s LedgerScope,
        gray: &GrayFrame,
    ) -> Result<Native<'s, KeypointVector>, ProviderError> {
        let keypoints = self.pool()?.install(|| self.detector.detect_keypoints(gray));
        Ok(scope.adopt(ResourceKind::KeypointVector, keypoints))
    }

    fn compute<'s>(
        &self,
        scope: &'s LedgerScope,
        gray: &GrayFrame,
        keypoints: &[Keypoint],
    ) -> Result<Native<'s, DescriptorSet>, ProviderError> {
        let descriptors = self.pool()?.install(|| self.brief.generate_descriptors(gray, keypoints));
        Ok(scope.adopt(ResourceKind::DescriptorMatrix, descriptors))
    }

    fn matcher<'s>(
        &self,
        scope: &'s LedgerScope,
        cross_check: bool,
    ) -> Result<Native<'s, BruteForceMatcher>, ProviderError> {
        self.pool()?;
        Ok(scope.adopt(ResourceKind::Matcher, BruteForceMatcher::new(cross_check)))
    }

    fn match_descriptors<'s>(
        &self,
        scope: &'s LedgerScope,
        matcher: &BruteForceMatcher,
        query: &DescriptorSet,
        train: &DescriptorSet,
    ) -> Result<Native<'s, MatchVector>, ProviderError> {
        let matches = self.pool()?.install(|| matcher.match_sets(query, train));
        Ok(scope.adopt(ResourceKind::MatchVector, matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ResourceLedger;
    use std::time::Duration;

    fn png_bytes(img: &RgbaImage) -> Vec<u8> {
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_primitives_require_runtime() {
        let provider = OrbProvider::new(DetectorConfig::default()).unwrap();
        let ledger = ResourceLedger::new();
        let scope = ledger.scope("cold");
        assert!(!provider.is_available());
        assert_eq!(provider.decode(&scope, &[]).unwrap_err(), ProviderError::Unavailable);
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_raises_readiness() {
        let provider = OrbProvider::new(DetectorConfig::default()).unwrap();
        let mut readiness = provider.readiness();
        provider.bootstrap().unwrap();
        let signal = tokio::time::timeout(Duration::from_secs(5), readiness.wait_for(|s| *s != RuntimeSignal::Pending))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(signal, RuntimeSignal::Ready);
        assert!(provider.is_available());
    }

    #[test]
    fn test_pipeline_allocations_are_tracked() {
        let provider = OrbProvider::preloaded(DetectorConfig::default()).unwrap();
        let ledger = ResourceLedger::new();
        {
            let scope = ledger.scope("pipeline");
            let img = RgbaImage::from_fn(64, 48, |x, y| image::Rgba([(x * 4) as u8, (y * 5) as u8, 0, 255]));
            let pixels = provider.decode(&scope, &png_bytes(&img)).unwrap();
            assert_eq!(pixels.dimensions(), (64, 48));
            let gray = provider.to_intensity(&scope, &pixels).unwrap();
            assert_eq!((gray.width(), gray.height()), (64, 48));
            let kps = provider.detect(&scope, &gray).unwrap();
            let desc = provider.compute(&scope, &gray, &kps).unwrap();
            assert_eq!(kps.len(), desc.len());
            let matcher = provider.matcher(&scope, true).unwrap();
            let _matches = provider.match_descriptors(&scope, &matcher, &desc, &desc).unwrap();
            assert_eq!(scope.stats().allocated, 6);
        }
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn test_decode_failure() {
        let provider = OrbProvider::preloaded(DetectorConfig::default()).unwrap();
        let ledger = ResourceLedger::new();
        let scope = ledger.scope("garbage");
        assert!(matches!(provider.decode(&scope, b"not an image"), Err(ProviderError::Decode(_))));
        assert_eq!(scope.stats().allocated, 0);
    }
}
