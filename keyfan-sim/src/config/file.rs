//! TOML file configuration structures.
//!
//! These structs directly map to the `keyfan-sim.toml` file format. Every
//! field has a default, so an empty file describes a small workload.

use serde::{Deserialize, Serialize};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub watchers: WatcherConfig,
}

/// Workload shape: how many orders exist, how many are watched, and how
/// many updates are pushed through the distributor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Number of distinct orders (keys) updates are spread over.
    #[serde(default = "default_orders")]
    pub orders: usize,
    /// How many of those orders have watchers. The rest exercise the
    /// no-subscriber path.
    #[serde(default = "default_watched_orders")]
    pub watched_orders: usize,
    /// Watchers subscribed to each watched order.
    #[serde(default = "default_watchers_per_order")]
    pub watchers_per_order: usize,
    /// Number of concurrent producer tasks.
    #[serde(default = "default_producers")]
    pub producers: usize,
    /// Updates submitted by each producer.
    #[serde(default = "default_updates_per_producer")]
    pub updates_per_producer: u64,
    /// Whether producers wait for each update to be fully consumed.
    #[serde(default)]
    pub await_completion: bool,
    /// Upper bound on a single completion wait, in milliseconds.
    #[serde(default = "default_completion_timeout_ms")]
    pub completion_timeout_ms: u64,
    /// Seed for order selection.
    #[serde(default)]
    pub seed: u64,
}

/// Watcher behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Resubscribe after consuming this many events. Zero disables churn.
    #[serde(default)]
    pub resubscribe_after: u64,
}

fn default_orders() -> usize {
    64
}

fn default_watched_orders() -> usize {
    16
}

fn default_watchers_per_order() -> usize {
    2
}

fn default_producers() -> usize {
    4
}

fn default_updates_per_producer() -> u64 {
    10_000
}

fn default_completion_timeout_ms() -> u64 {
    1_000
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            orders: default_orders(),
            watched_orders: default_watched_orders(),
            watchers_per_order: default_watchers_per_order(),
            producers: default_producers(),
            updates_per_producer: default_updates_per_producer(),
            await_completion: false,
            completion_timeout_ms: default_completion_timeout_ms(),
            seed: 0,
        }
    }
}
