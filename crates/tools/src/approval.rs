//! The approval gate.
//!
//! Pending diffs are owned by an external approval collaborator (usually a
//! UI). The executor only asks whether anything is pending and waits for the
//! set to drain before running a dependent tool. Waiting is a notification
//! future, not a poll; the ceiling is applied by [`wait_for_approvals`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::diff::PendingDiff;

/// Read-only view of the pending approval set.
#[async_trait]
pub trait ApprovalState: Send + Sync {
    fn has_pending(&self) -> bool;

    /// Resolve once nothing is pending. Must return immediately when the set
    /// is already empty.
    async fn wait_until_clear(&self);
}

/// Receives every pending diff the executor produces, before its result is
/// returned to the loop.
pub trait DiffSink: Send + Sync {
    fn submit(&self, diff: &PendingDiff);
}

/// Outcome of waiting on the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalWait {
    Clear,
    TimedOut,
    Cancelled,
}

/// Wait until `state` has no pending approvals, the ceiling elapses, or the
/// run is cancelled. Cancellation wins ties.
pub async fn wait_for_approvals(
    state: &dyn ApprovalState,
    ceiling: Duration,
    cancel: &CancellationToken,
) -> ApprovalWait {
    if cancel.is_cancelled() {
        return ApprovalWait::Cancelled;
    }
    if !state.has_pending() {
        return ApprovalWait::Clear;
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => ApprovalWait::Cancelled,
        _ = state.wait_until_clear() => ApprovalWait::Clear,
        _ = tokio::time::sleep(ceiling) => ApprovalWait::TimedOut,
    }
}

/// No approval collaborator: nothing is ever pending.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoApprovals;

#[async_trait]
impl ApprovalState for NoApprovals {
    fn has_pending(&self) -> bool {
        false
    }

    async fn wait_until_clear(&self) {}
}

/// Reference approval collaborator: pending diffs counted per path behind a
/// `watch` channel. Every submitted diff needs its own resolve, so two writes
/// to one path stay pending until both have been reviewed.
pub struct PendingApprovals {
    tx: watch::Sender<BTreeMap<String, usize>>,
}

impl PendingApprovals {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BTreeMap::new());
        Self { tx }
    }

    /// Register one more diff awaiting approval for `path`. Returns the
    /// number of diffs now pending for that path.
    pub fn add(&self, path: impl Into<String>) -> usize {
        let path = path.into();
        let mut pending = 0;
        self.tx.send_modify(|map| {
            let count = map.entry(path).or_insert(0);
            *count += 1;
            pending = *count;
        });
        pending
    }

    /// Accept or reject one pending diff for `path`. Returns false if nothing
    /// was pending for it.
    pub fn resolve(&self, path: &str) -> bool {
        self.tx.send_if_modified(|map| match map.get_mut(path) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                map.remove(path);
                true
            }
            None => false,
        })
    }

    pub fn pending_paths(&self) -> Vec<String> {
        self.tx.borrow().keys().cloned().collect()
    }

    /// Number of unreviewed diffs, counting repeats of the same path.
    pub fn len(&self) -> usize {
        self.tx.borrow().values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }
}

impl Default for PendingApprovals {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalState for PendingApprovals {
    fn has_pending(&self) -> bool {
        !self.is_empty()
    }

    async fn wait_until_clear(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only ends when the set drains.
        let _ = rx.wait_for(|map| map.is_empty()).await;
    }
}

impl DiffSink for PendingApprovals {
    fn submit(&self, diff: &PendingDiff) {
        self.add(diff.path.clone());
    }
}
