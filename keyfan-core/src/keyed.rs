//! Keyed event distribution.
//!
//! [`KeyedDistributor`] routes each submitted event to the readers that
//! subscribed to the event's key, as computed by a key function. Every
//! key with at least one reader gets its own [`EventDistributor`], created
//! by the first [`subscribe`](KeyedDistributor::subscribe) and torn down
//! when the last reader for that key unsubscribes. Submitting an event for
//! a key nobody subscribed to costs one map lookup and no allocation.
//!
//! ```text
//! submit(e) ─► key_fn(&e) ─► registry.load(key) ─┬─ None    ─► Completion::ready()
//!                                                 └─ Some(d) ─► d.submit(e)
//!
//! subscribe(k) ─► registry.get(k) ─► d.subscribe() ─► KeyedReader { release, reader }
//! ```

use crate::distributor::{EventDistributor, Reader};
use crate::refcount_map::{RefCountMap, Release};
use crate::signal::Completion;
use std::hash::Hash;
use std::sync::Arc;
use tracing::trace;

type KeyFn<E, K> = dyn Fn(&E) -> K + Send + Sync;

/// Routes events to per-key subscribers.
///
/// Cloning is cheap; clones share the same subscriptions.
pub struct KeyedDistributor<E, K>
where
    E: Clone,
    K: Eq + Hash + Clone,
{
    registry: RefCountMap<K, EventDistributor<E>>,
    key: Arc<KeyFn<E, K>>,
}

impl<E, K> KeyedDistributor<E, K>
where
    E: Clone + 'static,
    K: Eq + Hash + Clone,
{
    /// Create a distributor that routes events by `key`.
    ///
    /// `key` is called exactly once per submitted event and must be
    /// deterministic.
    pub fn new(key: impl Fn(&E) -> K + Send + Sync + 'static) -> Self {
        Self {
            registry: RefCountMap::new(EventDistributor::new),
            key: Arc::new(key),
        }
    }

    /// Push an event to every reader subscribed to its key.
    ///
    /// The returned [`Completion`] becomes ready once all of those readers
    /// have consumed the event. If nobody is subscribed to the key, the
    /// event is dropped and the completion is ready immediately.
    ///
    /// Safe to call concurrently with any other method.
    pub fn submit(&self, event: E) -> Completion {
        let key = (self.key)(&event);
        match self.registry.load(&key) {
            Some(distributor) => distributor.submit(event),
            None => {
                trace!("no subscribers for key, event dropped");
                Completion::ready()
            }
        }
    }

    /// Start receiving events whose key equals `key`.
    ///
    /// Unsubscribe as soon as the reader is no longer needed: while it is
    /// alive, events for its key keep being buffered for it.
    ///
    /// Safe to call concurrently with any other method.
    pub fn subscribe(&self, key: K) -> KeyedReader<E, K> {
        let (distributor, release, _) = self.registry.get(key.clone());
        let reader = distributor.subscribe();
        KeyedReader {
            release,
            reader,
            key,
        }
    }

    /// Number of keys that currently have at least one reader.
    pub fn active_keys(&self) -> usize {
        self.registry.len()
    }

    /// Number of readers currently subscribed to `key`.
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.registry.ref_count(key)
    }
}

impl<E, K> Clone for KeyedDistributor<E, K>
where
    E: Clone,
    K: Eq + Hash + Clone,
{
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            key: Arc::clone(&self.key),
        }
    }
}

/// A subscription to one key of a [`KeyedDistributor`].
///
/// Check [`is_ready`](KeyedReader::is_ready) (or await
/// [`ready`](KeyedReader::ready)) before calling
/// [`consume`](KeyedReader::consume), or use [`recv`](KeyedReader::recv)
/// to do both.
///
/// Dropping the reader unsubscribes it. A reader that is leaked instead
/// (for example via `std::mem::forget`) keeps its key's channel alive and
/// buffering for the rest of the process.
pub struct KeyedReader<E, K>
where
    E: Clone,
    K: Eq + Hash,
{
    // Field order is drop order: the registry reference is released before
    // the reader detaches from its channel.
    release: Release<K, EventDistributor<E>>,
    reader: Reader<E>,
    key: K,
}

impl<E, K> KeyedReader<E, K>
where
    E: Clone,
    K: Eq + Hash,
{
    /// The key this reader is subscribed to.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns `true` if an event is ready to consume.
    pub fn is_ready(&self) -> bool {
        self.reader.is_ready()
    }

    /// Wait until an event is ready to consume.
    pub async fn ready(&self) {
        self.reader.ready().await;
    }

    /// Take the oldest event queued for this reader, if any.
    pub fn consume(&mut self) -> Option<E> {
        self.reader.consume()
    }

    /// Wait for the next event and take it.
    pub async fn recv(&mut self) -> E {
        self.reader.recv().await
    }

    /// Release the key reference and detach from the key's channel.
    ///
    /// Events still queued for this reader are discarded and count as
    /// consumed for their submissions.
    pub fn unsubscribe(self) {
        let Self { release, reader, .. } = self;
        release.release();
        reader.unsubscribe();
    }
}
