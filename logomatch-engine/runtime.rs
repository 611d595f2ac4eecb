//! Lifecycle of the vision runtime.
//!
//! The runtime is loaded at most once at a time. The first caller of
//! [`RuntimeLoader::ensure_ready`] moves the state to `Loading` and spawns
//! the load; every caller that arrives while it runs, the first included,
//! joins that attempt and receives its outcome, even if a later caller has
//! already started a retry. A `Failed` state may be retried by a later call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::InitError;
use crate::extractor::FeatureExtractor;
use crate::ledger::ResourceLedger;
use crate::provider::{RuntimeSignal, VisionProvider};
use crate::source::ImageSource;
use crate::template::{Template, TemplateExtractor};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RuntimeState {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Failed(InitError),
}

impl RuntimeState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Terminal for one load attempt
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_))
    }
}

/// Read-only view of the loader's state
#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    rx: watch::Receiver<RuntimeState>,
}

impl RuntimeStatus {
    pub fn current(&self) -> RuntimeState {
        self.rx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_ready()
    }
}

/// Outcome of one load attempt, `None` while it runs
type Attempt = Option<Result<(), InitError>>;

pub struct RuntimeLoader {
    provider: Arc<dyn VisionProvider>,
    extractor: FeatureExtractor,
    templates: TemplateExtractor,
    state: watch::Sender<RuntimeState>,
    // attempt in flight while `state` is `Loading`
    flight: Mutex<Option<watch::Receiver<Attempt>>>,
    template: RwLock<Option<Arc<Template>>>,
    timeout: Duration,
    bootstraps: AtomicUsize,
}

impl RuntimeLoader {
    pub fn new(
        provider: Arc<dyn VisionProvider>,
        template: ImageSource,
        ledger: ResourceLedger,
        timeout: Duration,
    ) -> Arc<Self> {
        let (state, rx) = watch::channel(RuntimeState::Uninitialized);
        let extractor = FeatureExtractor::new(Arc::clone(&provider), RuntimeStatus { rx }, ledger);
        Arc::new(Self {
            provider,
            extractor,
            templates: TemplateExtractor::new(template),
            state,
            flight: Mutex::new(None),
            template: RwLock::new(None),
            timeout,
            bootstraps: AtomicUsize::new(0),
        })
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            rx: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.state.borrow().clone()
    }

    /// Extractor gated on this loader's state
    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// The template of the last successful load
    pub fn template(&self) -> Option<Arc<Template>> {
        self.template.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// How many times the provider has been asked to bootstrap
    pub fn bootstrap_attempts(&self) -> usize {
        self.bootstraps.load(Ordering::Acquire)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Bring the runtime to `Ready`, loading it if nobody else is.
    ///
    /// Dropping the returned future does not cancel a load in progress.
    pub async fn ensure_ready(self: &Arc<Self>) -> Result<(), InitError> {
        let mut attempt = match self.join_or_start() {
            Some(attempt) => attempt,
            None => return Ok(()),
        };

        let outcome = attempt
            .wait_for(Option::is_some)
            .await
            .map_err(|_| InitError::BootstrapFailed("runtime load ended without an outcome".into()))?;

        match &*outcome {
            Some(result) => result.clone(),
            None => Err(InitError::BootstrapFailed("runtime load ended without an outcome".into())),
        }
    }

    /// The attempt to wait on, starting one if none is running; `None` when ready
    fn join_or_start(self: &Arc<Self>) -> Option<watch::Receiver<Attempt>> {
        let mut flight = self.flight.lock().unwrap_or_else(PoisonError::into_inner);
        match &*self.state.borrow() {
            RuntimeState::Ready => return None,
            RuntimeState::Loading => {
                if let Some(attempt) = flight.as_ref() {
                    return Some(attempt.clone());
                }
            }
            RuntimeState::Uninitialized | RuntimeState::Failed(_) => {}
        }

        let (outcome, attempt) = watch::channel(None);
        *flight = Some(attempt.clone());
        self.state.send_replace(RuntimeState::Loading);

        info!(provider = self.provider.name(), timeout = ?self.timeout, "loading vision runtime");
        tokio::spawn(Arc::clone(self).load(outcome));
        Some(attempt)
    }

    async fn load(self: Arc<Self>, outcome: watch::Sender<Attempt>) {
        let result = match self.run_load().await {
            Ok(template) => {
                info!(
                    template = template.source(),
                    keypoints = template.len(),
                    "vision runtime ready"
                );
                *self.template.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(template));
                self.state.send_replace(RuntimeState::Ready);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "vision runtime failed to load");
                self.state.send_replace(RuntimeState::Failed(err.clone()));
                Err(err)
            }
        };
        outcome.send_replace(Some(result));
    }

    async fn run_load(&self) -> Result<Template, InitError> {
        if self.provider.is_available() {
            debug!(provider = self.provider.name(), "runtime already available, skipping bootstrap");
        } else {
            tokio::time::timeout(self.timeout, self.bootstrap_and_wait())
                .await
                .map_err(|_| InitError::Timeout(self.timeout))??;
        }
        self.templates.extract(&self.extractor).await
    }

    async fn bootstrap_and_wait(&self) -> Result<(), InitError> {
        self.bootstraps.fetch_add(1, Ordering::AcqRel);
        debug!(provider = self.provider.name(), "bootstrapping vision runtime");

        let mut readiness = self.provider.readiness();
        self.provider
            .bootstrap()
            .map_err(|e| InitError::BootstrapFailed(e.to_string()))?;

        let signal = readiness
            .wait_for(|s| *s != RuntimeSignal::Pending)
            .await
            .map_err(|_| InitError::BootstrapFailed("readiness signal dropped".into()))?;

        match &*signal {
            RuntimeSignal::Ready => Ok(()),
            RuntimeSignal::Failed(reason) => Err(InitError::BootstrapFailed(reason.clone())),
            RuntimeSignal::Pending => Err(InitError::BootstrapFailed("runtime still pending".into())),
        }
    }
}

impl std::fmt::Debug for RuntimeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeLoader")
            .field("provider", &self.provider.name())
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .finish()
    }
}
