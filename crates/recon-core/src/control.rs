//! Cancellation and progress handles for a running comparison
//!
//! Both handles are cheap to clone and are shared between the thread that
//! runs the comparison and whoever drives it.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked by the engine between rows
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the engine stops before its next row
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Phase of a comparison run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunPhase {
    Idle,
    Indexing,
    Counting,
    Probing,
    ReconcilingUnmatchedB,
    Done,
    Cancelled,
}

impl RunPhase {
    /// Done or Cancelled
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Cancelled)
    }

    fn to_u8(self) -> u8 {
        match self {
            RunPhase::Idle => 0,
            RunPhase::Indexing => 1,
            RunPhase::Counting => 2,
            RunPhase::Probing => 3,
            RunPhase::ReconcilingUnmatchedB => 4,
            RunPhase::Done => 5,
            RunPhase::Cancelled => 6,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunPhase::Indexing,
            2 => RunPhase::Counting,
            3 => RunPhase::Probing,
            4 => RunPhase::ReconcilingUnmatchedB,
            5 => RunPhase::Done,
            6 => RunPhase::Cancelled,
            _ => RunPhase::Idle,
        }
    }
}

/// Receives progress notifications from the engine
///
/// Implementations must not block: the engine calls `report` after every
/// probed row.
pub trait ProgressObserver: Send + Sync {
    /// Rows probed since the start offset, and rows to probe in total
    fn report(&self, processed: usize, total: usize);

    /// Phase transition
    fn phase(&self, _phase: RunPhase) {}
}

/// Observer that discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn report(&self, _processed: usize, _total: usize) {}
}

/// Latest-value progress snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub phase: RunPhase,
}

/// Polling handle that keeps only the most recent report
///
/// Reports overwrite each other, so a slow reader never holds up the
/// engine and may skip intermediate values.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    inner: Arc<ProgressState>,
}

#[derive(Debug)]
struct ProgressState {
    processed: AtomicUsize,
    total: AtomicUsize,
    phase: AtomicU8,
}

impl Default for ProgressHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ProgressState {
                processed: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
                phase: AtomicU8::new(RunPhase::Idle.to_u8()),
            }),
        }
    }

    /// Current values
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.inner.processed.load(Ordering::Relaxed),
            total: self.inner.total.load(Ordering::Relaxed),
            phase: RunPhase::from_u8(self.inner.phase.load(Ordering::Acquire)),
        }
    }

    /// True once the run reached Done or Cancelled
    pub fn is_finished(&self) -> bool {
        self.snapshot().phase.is_terminal()
    }
}

impl ProgressObserver for ProgressHandle {
    fn report(&self, processed: usize, total: usize) {
        self.inner.total.store(total, Ordering::Relaxed);
        self.inner.processed.store(processed, Ordering::Relaxed);
    }

    fn phase(&self, phase: RunPhase) {
        self.inner.phase.store(phase.to_u8(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let handle = CancellationHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());

        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_progress_keeps_latest() {
        let handle = ProgressHandle::new();
        let observer: &dyn ProgressObserver = &handle;

        observer.phase(RunPhase::Probing);
        observer.report(1, 10);
        observer.report(7, 10);

        let snap = handle.snapshot();
        assert_eq!(snap.processed, 7);
        assert_eq!(snap.total, 10);
        assert_eq!(snap.phase, RunPhase::Probing);
        assert!(!handle.is_finished());

        observer.phase(RunPhase::Cancelled);
        assert!(handle.clone().is_finished());
    }
}
