//! Accounting for natively-allocated structures.
//!
//! Every matrix, keypoint vector, matcher or match vector a provider creates
//! is handed out as a [`Native`] guard adopted by a [`LedgerScope`]. The guard
//! owns the value and is not `Clone`, so it is released exactly once, when it
//! is dropped, on every exit path of the comparison that owns it. It also
//! borrows its scope, so no handle can outlive the comparison:
//!
//! ```compile_fail
//! use logomatch_engine::ledger::{ResourceKind, ResourceLedger};
//!
//! let ledger = ResourceLedger::new();
//! let handle = {
//!     let scope = ledger.scope("comparison");
//!     scope.adopt(ResourceKind::Matcher, ())
//! };
//! ```
//!
//! Counters on the scope and on the process-wide [`ResourceLedger`] make the
//! balance observable.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{error, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    PixelMatrix,
    IntensityMatrix,
    KeypointVector,
    DescriptorMatrix,
    Matcher,
    MatchVector,
}

#[derive(Debug, Default)]
struct Counters {
    allocated: AtomicU64,
    released: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LedgerStats {
        // read released first so a concurrent adopt never shows as negative
        let released = self.released.load(Ordering::Acquire);
        let allocated = self.allocated.load(Ordering::Acquire);
        LedgerStats {
            allocated,
            released,
        }
    }
}

/// Allocation/release counters at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub allocated: u64,
    pub released: u64,
}

impl LedgerStats {
    pub fn live(&self) -> u64 {
        self.allocated.saturating_sub(self.released)
    }
}

/// Process-wide ledger shared by every comparison of an engine
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    totals: Arc<Counters>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the scope that will own one comparison's handles
    pub fn scope(&self, label: impl Into<String>) -> LedgerScope {
        LedgerScope {
            label: label.into(),
            totals: Arc::clone(&self.totals),
            local: Counters::default(),
        }
    }

    pub fn stats(&self) -> LedgerStats {
        self.totals.snapshot()
    }

    pub fn live(&self) -> u64 {
        self.stats().live()
    }
}

/// Owner of the handles allocated during a single comparison
pub struct LedgerScope {
    label: String,
    totals: Arc<Counters>,
    local: Counters,
}

impl LedgerScope {
    /// Take ownership of a freshly allocated value
    pub fn adopt<T>(&self, kind: ResourceKind, value: T) -> Native<'_, T> {
        self.local.allocated.fetch_add(1, Ordering::AcqRel);
        self.totals.allocated.fetch_add(1, Ordering::AcqRel);
        trace!(scope = %self.label, ?kind, "native handle allocated");
        Native {
            value,
            kind,
            scope: self,
        }
    }

    fn release(&self) {
        self.local.released.fetch_add(1, Ordering::AcqRel);
        self.totals.released.fetch_add(1, Ordering::AcqRel);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stats(&self) -> LedgerStats {
        self.local.snapshot()
    }
}

impl Drop for LedgerScope {
    fn drop(&mut self) {
        let stats = self.local.snapshot();
        if stats.live() != 0 {
            error!(
                scope = %self.label,
                live = stats.live(),
                allocated = stats.allocated,
                "native handles were never released"
            );
        } else {
            trace!(scope = %self.label, allocated = stats.allocated, "comparison scope closed");
        }
    }
}

impl fmt::Debug for LedgerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerScope")
            .field("label", &self.label)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Guard over one native allocation, released when dropped
pub struct Native<'scope, T> {
    value: T,
    kind: ResourceKind,
    scope: &'scope LedgerScope,
}

impl<T> Native<'_, T> {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Release now instead of at the end of the enclosing block
    pub fn release(self) {
        drop(self)
    }
}

impl<T> Deref for Native<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Drop for Native<'_, T> {
    fn drop(&mut self) {
        self.scope.release();
    }
}

impl<T: fmt::Debug> fmt::Debug for Native<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native")
            .field("kind", &self.kind)
            .field("value", &self.value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallible(scope: &LedgerScope, fail: bool) -> Result<usize, &'static str> {
        let a = scope.adopt(ResourceKind::PixelMatrix, vec![0u8; 16]);
        let b = scope.adopt(ResourceKind::IntensityMatrix, vec![0u8; 4]);
        if fail {
            return Err("decode failed");
        }
        Ok(a.len() + b.len())
    }

    #[test]
    fn test_release_on_success_and_error() {
        let ledger = ResourceLedger::new();
        {
            let scope = ledger.scope("ok");
            assert_eq!(fallible(&scope, false), Ok(20));
            assert_eq!(scope.stats(), LedgerStats { allocated: 2, released: 2 });
        }
        {
            let scope = ledger.scope("err");
            assert!(fallible(&scope, true).is_err());
            assert_eq!(scope.stats().live(), 0);
        }
        assert_eq!(ledger.stats(), LedgerStats { allocated: 4, released: 4 });
    }

    #[test]
    fn test_explicit_release_and_deref() {
        let ledger = ResourceLedger::new();
        let scope = ledger.scope("deref");
        let handle = scope.adopt(ResourceKind::Matcher, String::from("bf-hamming"));
        assert_eq!(handle.kind(), ResourceKind::Matcher);
        assert_eq!(handle.as_str(), "bf-hamming");
        assert_eq!(ledger.live(), 1);
        handle.release();
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn test_scopes_are_accounted_separately() {
        let ledger = ResourceLedger::new();
        let first = ledger.scope("first");
        let second = ledger.scope("second");
        let _a = first.adopt(ResourceKind::KeypointVector, ());
        let _b = second.adopt(ResourceKind::KeypointVector, ());
        let _c = second.adopt(ResourceKind::DescriptorMatrix, ());
        assert_eq!(first.stats().live(), 1);
        assert_eq!(second.stats().live(), 2);
        assert_eq!(ledger.live(), 3);
    }

    #[test]
    fn test_release_when_unwinding() {
        let ledger = ResourceLedger::new();
        let scope = ledger.scope("panic");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _held = scope.adopt(ResourceKind::MatchVector, vec![1, 2, 3]);
            panic!("matcher blew up");
        }));
        assert!(result.is_err());
        assert_eq!(ledger.live(), 0);
    }
}
