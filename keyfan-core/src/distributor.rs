//! Single-key event fan-out.
//!
//! An [`EventDistributor`] copies every submitted event into the queue of
//! each [`Reader`] subscribed at submission time. The [`Completion`]
//! returned by [`submit`](EventDistributor::submit) becomes ready once all
//! of those readers have consumed the event, or dropped it by
//! unsubscribing.
//!
//! # Reader protocol
//!
//! ```text
//! submit(e) ──► [reader 1 queue] ──► is_ready()/ready() ──► consume()
//!           └─► [reader 2 queue] ──► ...
//!
//! completion ready  <=>  every queued copy consumed or discarded
//! ```

use crate::signal::Completion;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::trace;

/// Fan-out of events to every current subscriber.
pub struct EventDistributor<E> {
    state: Mutex<State<E>>,
}

struct State<E> {
    next_reader: u64,
    readers: HashMap<u64, ReaderQueue<E>>,
}

struct ReaderQueue<E> {
    pending: VecDeque<Pending<E>>,
    notify: Arc<Notify>,
}

struct Pending<E> {
    event: E,
    delivery: Arc<Delivery>,
}

/// Bookkeeping shared by every queued copy of one submission.
struct Delivery {
    remaining: AtomicUsize,
    completion: Completion,
}

impl Delivery {
    fn settle(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.completion.complete();
        }
    }
}

// -- EventDistributor ---------------------------------------------------

impl<E: Clone> EventDistributor<E> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_reader: 0,
                readers: HashMap::new(),
            }),
        }
    }

    /// Queue `event` for every current reader.
    ///
    /// Never blocks. With no readers the shared ready [`Completion`] is
    /// returned.
    pub fn submit(&self, event: E) -> Completion {
        let mut state = self.state.lock();
        if state.readers.is_empty() {
            return Completion::ready();
        }

        let delivery = Arc::new(Delivery {
            remaining: AtomicUsize::new(state.readers.len()),
            completion: Completion::pending(),
        });
        for queue in state.readers.values_mut() {
            queue.pending.push_back(Pending {
                event: event.clone(),
                delivery: Arc::clone(&delivery),
            });
            queue.notify.notify_one();
        }
        trace!(readers = state.readers.len(), "event queued");

        delivery.completion.clone()
    }

    /// Attach a new reader. It only sees events submitted from now on.
    pub fn subscribe(self: &Arc<Self>) -> Reader<E> {
        let notify = Arc::new(Notify::new());
        let mut state = self.state.lock();
        let id = state.next_reader;
        state.next_reader += 1;
        state.readers.insert(
            id,
            ReaderQueue {
                pending: VecDeque::new(),
                notify: Arc::clone(&notify),
            },
        );
        drop(state);

        Reader {
            distributor: Arc::clone(self),
            id,
            notify,
        }
    }

    /// Number of attached readers.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().readers.len()
    }

    fn pop(&self, id: u64) -> Option<E> {
        let mut state = self.state.lock();
        let pending = state.readers.get_mut(&id)?.pending.pop_front()?;
        drop(state);

        pending.delivery.settle();
        Some(pending.event)
    }

    fn has_pending(&self, id: u64) -> bool {
        self.state
            .lock()
            .readers
            .get(&id)
            .is_some_and(|queue| !queue.pending.is_empty())
    }

    fn detach(&self, id: u64) {
        let removed = self.state.lock().readers.remove(&id);
        let Some(queue) = removed else {
            return;
        };
        let discarded = queue.pending.len();
        for pending in queue.pending {
            pending.delivery.settle();
        }
        if discarded > 0 {
            trace!(discarded, "reader detached with unconsumed events");
        }
    }
}

impl<E: Clone> Default for EventDistributor<E> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Reader -------------------------------------------------------------

/// Consumer side of an [`EventDistributor`].
///
/// Dropping the reader unsubscribes it; events still queued for it are
/// discarded and count as consumed for their submissions.
pub struct Reader<E: Clone> {
    distributor: Arc<EventDistributor<E>>,
    id: u64,
    notify: Arc<Notify>,
}

impl<E: Clone> Reader<E> {
    /// Returns `true` if [`consume`](Reader::consume) would yield an event.
    pub fn is_ready(&self) -> bool {
        self.distributor.has_pending(self.id)
    }

    /// Wait until an event is ready to consume.
    pub async fn ready(&self) {
        // `notify_one` leaves a permit behind when nobody is waiting, so a
        // submit between the check and the await is not lost.
        while !self.is_ready() {
            self.notify.notified().await;
        }
    }

    /// Take the oldest queued event, if any.
    pub fn consume(&mut self) -> Option<E> {
        self.distributor.pop(self.id)
    }

    /// Wait for the next event and take it.
    pub async fn recv(&mut self) -> E {
        loop {
            if let Some(event) = self.consume() {
                return event;
            }
            self.notify.notified().await;
        }
    }

    /// Detach from the distributor.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<E: Clone> Drop for Reader<E> {
    fn drop(&mut self) {
        self.distributor.detach(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn distributor() -> Arc<EventDistributor<u32>> {
        Arc::new(EventDistributor::new())
    }

    #[test]
    fn test_submit_without_readers_is_ready() {
        let d = distributor();
        let completion = d.submit(1);
        assert!(completion.is_ready());
        assert!(completion.same_signal(&Completion::ready()));
    }

    #[test]
    fn test_completion_waits_for_every_reader() {
        let d = distributor();
        let mut a = d.subscribe();
        let mut b = d.subscribe();

        let completion = d.submit(10);
        assert!(a.is_ready());
        assert!(b.is_ready());
        assert!(!completion.is_ready());

        assert_eq!(a.consume(), Some(10));
        assert!(!completion.is_ready());
        assert_eq!(b.consume(), Some(10));
        assert!(completion.is_ready());

        assert!(!a.is_ready());
        assert_eq!(a.consume(), None);
    }

    #[test]
    fn test_events_arrive_in_submission_order() {
        let d = distributor();
        let mut r = d.subscribe();

        let first = d.submit(1);
        let second = d.submit(2);

        assert_eq!(r.consume(), Some(1));
        assert!(first.is_ready());
        assert!(!second.is_ready());
        assert_eq!(r.consume(), Some(2));
        assert!(second.is_ready());
    }

    #[test]
    fn test_unsubscribe_discards_pending() {
        let d = distributor();
        let mut a = d.subscribe();
        let b = d.subscribe();

        let completion = d.submit(5);
        assert_eq!(a.consume(), Some(5));
        assert!(!completion.is_ready());

        b.unsubscribe();
        assert!(completion.is_ready());
        assert_eq!(d.subscriber_count(), 1);
    }

    #[test]
    fn test_late_reader_misses_earlier_events() {
        let d = distributor();
        let mut early = d.subscribe();
        let completion = d.submit(1);

        let mut late = d.subscribe();
        assert!(!late.is_ready());
        assert!(!completion.is_ready());

        // Only readers attached at submission time hold the completion.
        assert_eq!(early.consume(), Some(1));
        assert!(completion.is_ready());
        assert_eq!(late.consume(), None);
    }

    #[tokio::test]
    async fn test_recv_waits_for_submit() {
        let d = distributor();
        let mut r = d.subscribe();

        let producer = {
            let d = Arc::clone(&d);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                d.submit(99)
            })
        };

        let received = tokio::time::timeout(Duration::from_secs(1), r.recv()).await;
        assert_eq!(received.ok(), Some(99));

        let completion = producer.await.ok();
        assert!(completion.is_some_and(|c| c.is_ready()));
    }

    #[tokio::test]
    async fn test_ready_resolves_after_submit() {
        let d = distributor();
        let r = d.subscribe();

        d.submit(3);
        let waited = tokio::time::timeout(Duration::from_millis(100), r.ready()).await;
        assert!(waited.is_ok());
        assert!(r.is_ready());
    }
}
