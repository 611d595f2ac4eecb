#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};
use logomatch_brief::BruteForceMatcher;
use logomatch_core::{DescriptorSet, GrayFrame, Keypoint};
use logomatch_engine::ledger::{LedgerScope, Native};
use logomatch_engine::provider::{KeypointVector, MatchVector, PixelMatrix};
use logomatch_engine::{
    DetectorConfig, EngineConfig, ImageSource, MatchEngine, OrbProvider, ProviderError, RuntimeSignal,
    VisionProvider,
};
use tokio::sync::watch;

/// Blocky pseudo-random texture; every block edge is a corner candidate
pub fn texture(width: u32, height: u32, seed: u64) -> RgbaImage {
    let mut state = seed | 1;
    let block = 5;
    let cols = width.div_ceil(block);
    let cells: Vec<u8> = (0..cols * height.div_ceil(block))
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 56) as u8
        })
        .collect();
    RgbaImage::from_fn(width, height, |x, y| {
        let v = cells[((y / block) * cols + x / block) as usize];
        Rgba([v, v, v, 255])
    })
}

pub fn solid(width: u32, height: u32, value: u8) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([value, value, value, 255]))
}

pub fn png(img: &RgbaImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

pub fn write_png(dir: &Path, name: &str, img: &RgbaImage) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, png(img)).unwrap();
    path
}

pub fn encoded(name: &str, img: &RgbaImage) -> ImageSource {
    ImageSource::encoded(name, png(img))
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.load_timeout_ms = 2_000;
    config.detector.core.n_threads = 2;
    config
}

/// How a [`GatedProvider`] answers a bootstrap request
#[derive(Debug, Clone)]
pub enum Gate {
    Immediate,
    Delayed(Duration),
    Never,
    Fail(String),
}

/// ORB provider whose availability is controlled by the test
pub struct GatedProvider {
    inner: OrbProvider,
    gate: Gate,
    available: Arc<AtomicBool>,
    signal: Arc<watch::Sender<RuntimeSignal>>,
    bootstraps: AtomicUsize,
}

impl GatedProvider {
    pub fn new(gate: Gate) -> Arc<Self> {
        let mut cfg = DetectorConfig::default();
        cfg.core.n_threads = 2;
        let (signal, _) = watch::channel(RuntimeSignal::Pending);
        Arc::new(Self {
            inner: OrbProvider::preloaded(cfg).unwrap(),
            gate,
            available: Arc::new(AtomicBool::new(false)),
            signal: Arc::new(signal),
            bootstraps: AtomicUsize::new(0),
        })
    }

    /// Runtime brought up by someone else before the engine asked
    pub fn preloaded() -> Arc<Self> {
        let provider = Self::new(Gate::Never);
        provider.available.store(true, Ordering::SeqCst);
        provider.signal.send_replace(RuntimeSignal::Ready);
        provider
    }

    pub fn bootstraps(&self) -> usize {
        self.bootstraps.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Unavailable)
        }
    }
}

impl VisionProvider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn bootstrap(&self) -> Result<(), ProviderError> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        self.signal.send_replace(RuntimeSignal::Pending);
        match &self.gate {
            Gate::Immediate => {
                self.available.store(true, Ordering::SeqCst);
                self.signal.send_replace(RuntimeSignal::Ready);
            }
            Gate::Delayed(delay) => {
                let (delay, available, signal) = (*delay, Arc::clone(&self.available), Arc::clone(&self.signal));
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    available.store(true, Ordering::SeqCst);
                    signal.send_replace(RuntimeSignal::Ready);
                });
            }
            Gate::Never => {}
            Gate::Fail(reason) => {
                self.signal.send_replace(RuntimeSignal::Failed(reason.clone()));
            }
        }
        Ok(())
    }

    fn readiness(&self) -> watch::Receiver<RuntimeSignal> {
        self.signal.subscribe()
    }

    fn decode<'s>(&self, scope: &'s LedgerScope, bytes: &[u8]) -> Result<Native<'s, PixelMatrix>, ProviderError> {
        self.check()?;
        self.inner.decode(scope, bytes)
    }

    fn to_intensity<'s>(
        &self,
        scope: &'s LedgerScope,
        pixels: &PixelMatrix,
    ) -> Result<Native<'s, GrayFrame>, ProviderError> {
        self.check()?;
        self.inner.to_intensity(scope, pixels)
    }

    fn detect<'s>(
        &self,
        scope: &'s LedgerScope,
        gray: &GrayFrame,
    ) -> Result<Native<'s, KeypointVector>, ProviderError> {
        self.check()?;
        self.inner.detect(scope, gray)
    }

    fn compute<'s>(
        &self,
        scope: &'s LedgerScope,
        gray: &GrayFrame,
        keypoints: &[Keypoint],
    ) -> Result<Native<'s, DescriptorSet>, ProviderError> {
        self.check()?;
        self.inner.compute(scope, gray, keypoints)
    }

    fn matcher<'s>(
        &self,
        scope: &'s LedgerScope,
        cross_check: bool,
    ) -> Result<Native<'s, BruteForceMatcher>, ProviderError> {
        self.check()?;
        self.inner.matcher(scope, cross_check)
    }

    fn match_descriptors<'s>(
        &self,
        scope: &'s LedgerScope,
        matcher: &BruteForceMatcher,
        query: &DescriptorSet,
        train: &DescriptorSet,
    ) -> Result<Native<'s, MatchVector>, ProviderError> {
        self.check()?;
        self.inner.match_descriptors(scope, matcher, query, train)
    }
}

/// Engine over `provider` with an in-memory textured template
pub fn engine_with(provider: Arc<GatedProvider>, config: EngineConfig) -> MatchEngine {
    MatchEngine::builder()
        .config(config)
        .provider(provider)
        .template(encoded("template", &texture(160, 160, 7)))
        .build()
        .unwrap()
}
