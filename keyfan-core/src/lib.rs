//! Keyed event fan-out.
//!
//! Producers [`submit`](KeyedDistributor::submit) events; consumers
//! [`subscribe`](KeyedDistributor::subscribe) to a single key and only see
//! events whose derived key matches. Per-key channels exist only while
//! somebody is subscribed to that key.
//!
//! ```
//! use keyfan_core::KeyedDistributor;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct OrderUpdate { order: u64, paid: bool }
//!
//! let updates = KeyedDistributor::new(|u: &OrderUpdate| u.order);
//! let mut watcher = updates.subscribe(7);
//!
//! assert!(updates.submit(OrderUpdate { order: 3, paid: true }).is_ready());
//!
//! let done = updates.submit(OrderUpdate { order: 7, paid: true });
//! assert_eq!(watcher.consume(), Some(OrderUpdate { order: 7, paid: true }));
//! assert!(done.is_ready());
//!
//! watcher.unsubscribe();
//! assert_eq!(updates.active_keys(), 0);
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod distributor;
pub mod keyed;
pub mod refcount_map;
pub mod signal;

pub use distributor::{EventDistributor, Reader};
pub use keyed::{KeyedDistributor, KeyedReader};
pub use refcount_map::{RefCountMap, Release};
pub use signal::Completion;
