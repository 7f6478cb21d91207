//! Simulation state shared across producer and watcher tasks.

use crate::events::OrderStatusChanged;
use keyfan_core::KeyedDistributor;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Distributor keyed by order id.
pub type OrderDistributor = KeyedDistributor<OrderStatusChanged, Uuid>;

/// State that is shared across all simulation tasks.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct SimState {
    pub distributor: OrderDistributor,
    /// Every order the producers pick from. The first `watched_orders`
    /// entries have watchers.
    pub orders: Arc<[Uuid]>,
    pub stats: Arc<SimStats>,
}

impl SimState {
    /// Create state for `orders` freshly generated order ids.
    pub fn new(orders: usize) -> Self {
        Self {
            distributor: KeyedDistributor::new(OrderStatusChanged::order_id),
            orders: (0..orders).map(|_| Uuid::new_v4()).collect(),
            stats: Arc::new(SimStats::default()),
        }
    }
}

/// Counters updated by the simulation tasks.
#[derive(Default)]
pub struct SimStats {
    pub submitted: AtomicU64,
    pub completed_immediately: AtomicU64,
    pub delivered: AtomicU64,
    pub key_violations: AtomicU64,
    pub completion_timeouts: AtomicU64,
    pub resubscribes: AtomicU64,
}

impl SimStats {
    /// Freeze the counters into a report.
    pub fn snapshot(&self, live_keys_after: usize, elapsed: Duration) -> SimReport {
        SimReport {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed_immediately: self.completed_immediately.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            key_violations: self.key_violations.load(Ordering::Relaxed),
            completion_timeouts: self.completion_timeouts.load(Ordering::Relaxed),
            resubscribes: self.resubscribes.load(Ordering::Relaxed),
            live_keys_after,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimReport {
    pub submitted: u64,
    /// Submissions that took the no-subscriber fast path (no watcher for
    /// the order).
    pub completed_immediately: u64,
    pub delivered: u64,
    pub key_violations: u64,
    pub completion_timeouts: u64,
    pub resubscribes: u64,
    /// Distributor entries still alive after every watcher stopped.
    pub live_keys_after: usize,
    pub elapsed_ms: u64,
}

impl SimReport {
    /// A run is clean when no watcher saw a foreign event and no per-key
    /// channel outlived its watchers.
    pub fn is_clean(&self) -> bool {
        self.key_violations == 0 && self.live_keys_after == 0
    }
}
