//! Lazily populated, reference-counted map.
//!
//! [`RefCountMap::get`] creates the value for a key on first reference and
//! hands out a [`Release`] guard per reference. The entry is removed when
//! the last guard is released. [`RefCountMap::load`] looks a key up without
//! touching its count.
//!
//! Creation and removal happen inside the same critical section as the
//! count transition, and values are handed out as `Arc<V>`, so a value
//! obtained from either lookup stays valid for as long as the caller holds
//! it, regardless of concurrent releases.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

/// A map from `K` to shared `V`, alive only while referenced.
pub struct RefCountMap<K, V> {
    inner: Arc<Inner<K, V>>,
}

struct Inner<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    factory: Box<dyn Fn() -> V + Send + Sync>,
}

struct Entry<V> {
    value: Arc<V>,
    refs: usize,
}

// -- RefCountMap --------------------------------------------------------

impl<K, V> RefCountMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty map that builds values with `factory`.
    pub fn new(factory: impl Fn() -> V + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                factory: Box::new(factory),
            }),
        }
    }

    /// Take a reference to the value for `key`, creating it if needed.
    ///
    /// Returns the shared value, the guard that gives the reference back,
    /// and whether this call created the entry.
    pub fn get(&self, key: K) -> (Arc<V>, Release<K, V>, bool) {
        let mut entries = self.inner.entries.lock();
        let (value, created) = match entries.get_mut(&key) {
            Some(entry) => {
                entry.refs += 1;
                (Arc::clone(&entry.value), false)
            }
            None => {
                let value = Arc::new((self.inner.factory)());
                entries.insert(
                    key.clone(),
                    Entry {
                        value: Arc::clone(&value),
                        refs: 1,
                    },
                );
                debug!(live = entries.len(), "refcount map entry created");
                (value, true)
            }
        };
        drop(entries);

        let release = Release {
            inner: Arc::clone(&self.inner),
            key: Some(key),
        };
        (value, release, created)
    }

    /// Look up `key` without creating an entry or changing its count.
    pub fn load(&self, key: &K) -> Option<Arc<V>> {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Number of live references held for `key`.
    pub fn ref_count(&self, key: &K) -> usize {
        self.inner
            .entries
            .lock()
            .get(key)
            .map_or(0, |entry| entry.refs)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Clone for RefCountMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// -- Release ------------------------------------------------------------

/// Gives one reference back to a [`RefCountMap`].
///
/// The reference is released exactly once: either by
/// [`release()`](Release::release) or when the guard is dropped. Leaking
/// the guard (e.g. with `std::mem::forget`) keeps the entry alive for the
/// lifetime of the map.
#[must_use = "dropping the guard releases the reference immediately"]
pub struct Release<K, V>
where
    K: Eq + Hash,
{
    inner: Arc<Inner<K, V>>,
    key: Option<K>,
}

impl<K, V> Release<K, V>
where
    K: Eq + Hash,
{
    /// Release the reference now.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };

        let mut entries = self.inner.entries.lock();
        let remove = match entries.get_mut(&key) {
            Some(entry) => {
                entry.refs -= 1;
                entry.refs == 0
            }
            None => false,
        };
        if remove {
            // Only the map's own handle goes away here; callers still
            // holding the `Arc<V>` keep it alive until they are done.
            let removed = entries.remove(&key);
            debug!(live = entries.len(), "refcount map entry removed");
            drop(entries);
            drop(removed);
        }
    }
}

impl<K, V> Drop for Release<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_map() -> (RefCountMap<u32, usize>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let map = RefCountMap::new(move || counter.fetch_add(1, Ordering::SeqCst));
        (map, created)
    }

    #[test]
    fn test_get_creates_once_and_shares() {
        let (map, created) = counting_map();

        let (a, release_a, created_a) = map.get(7);
        let (b, release_b, created_b) = map.get(7);

        assert!(created_a);
        assert!(!created_b);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(map.ref_count(&7), 2);

        release_a.release();
        assert_eq!(map.ref_count(&7), 1);
        drop(release_b);
        assert_eq!(map.ref_count(&7), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn test_load_does_not_create_or_count() {
        let (map, created) = counting_map();

        assert!(map.load(&1).is_none());
        assert!(map.is_empty());
        assert_eq!(created.load(Ordering::SeqCst), 0);

        let (_value, release, _) = map.get(1);
        assert!(map.load(&1).is_some());
        assert_eq!(map.ref_count(&1), 1);

        drop(release);
        assert!(map.load(&1).is_none());
    }

    #[test]
    fn test_value_outlives_entry_removal() {
        let map: RefCountMap<&'static str, Vec<u8>> = RefCountMap::new(|| vec![1, 2, 3]);

        let (_, release, _) = map.get("k");
        let loaded = map.load(&"k");
        release.release();

        assert!(map.is_empty());
        assert_eq!(loaded.as_deref(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn test_recreated_after_last_release() {
        let (map, created) = counting_map();

        let (first, release, _) = map.get(3);
        drop(release);
        let (second, _release, was_created) = map.get(3);

        assert!(was_created);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_first_references_create_once() {
        let (map, created) = counting_map();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let map = map.clone();
                std::thread::spawn(move || {
                    let (value, release, _) = map.get(42);
                    (value, release)
                })
            })
            .collect();

        let held: Vec<_> = handles.into_iter().filter_map(|h| h.join().ok()).collect();
        assert_eq!(held.len(), 16);
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(map.ref_count(&42), 16);
        assert!(held.windows(2).all(|w| Arc::ptr_eq(&w[0].0, &w[1].0)));

        drop(held);
        assert!(map.is_empty());
    }
}
