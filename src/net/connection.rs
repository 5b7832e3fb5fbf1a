//! In-flight transfer tracking.
//!
//! # Responsibilities
//! - Count file bodies currently streaming (admin status)
//! - Give each transfer an ID for log correlation
//! - Detect bodies dropped before completion (`ConnectionAborted`)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;
use crate::routing::RouteClass;

/// Relaxed ordering is enough; IDs only need to be unique.
static TRANSFER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(u64);

impl TransferId {
    pub fn new() -> Self {
        Self(TRANSFER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "xfer-{}", self.0)
    }
}

/// Counts active transfers.
#[derive(Debug, Clone, Default)]
pub struct TransferTracker {
    active_count: Arc<AtomicU64>,
    aborted_count: Arc<AtomicU64>,
}

impl TransferTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new transfer of `expected` bytes. Dropping the guard ends it.
    pub fn track(&self, class: RouteClass, path: String, expected: u64) -> TransferGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        TransferGuard {
            active_count: Arc::clone(&self.active_count),
            aborted_count: Arc::clone(&self.aborted_count),
            id: TransferId::new(),
            class,
            path,
            expected,
            sent: 0,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    pub fn aborted_count(&self) -> u64 {
        self.aborted_count.load(Ordering::Relaxed)
    }
}

/// Lives inside a streaming body. Decrements the active count when dropped
/// and logs an abort if the body was not sent in full.
#[derive(Debug)]
pub struct TransferGuard {
    active_count: Arc<AtomicU64>,
    aborted_count: Arc<AtomicU64>,
    id: TransferId,
    class: RouteClass,
    path: String,
    expected: u64,
    sent: u64,
}

impl TransferGuard {
    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.sent += bytes as u64;
    }

    pub fn is_complete(&self) -> bool {
        self.sent >= self.expected
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        if self.is_complete() {
            tracing::trace!(transfer_id = %self.id, bytes = self.sent, "Transfer complete");
        } else {
            self.aborted_count.fetch_add(1, Ordering::Relaxed);
            metrics::record_transfer_aborted(self.class.as_str());
            tracing::info!(
                transfer_id = %self.id,
                class = %self.class,
                path = %self.path,
                sent = self.sent,
                expected = self.expected,
                "ConnectionAborted: client left mid-body"
            );
        }
    }
}
