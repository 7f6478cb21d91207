//! One-shot completion signals.
//!
//! A [`Completion`] is handed back for every submitted event. It becomes
//! ready once every reader the event was routed to has consumed it (or
//! dropped it by unsubscribing). Events routed to nobody get the shared
//! [`Completion::ready()`] instance, which is ready from the start.

use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

static READY: LazyLock<Completion> = LazyLock::new(|| {
    let completion = Completion::pending();
    completion.complete();
    completion
});

/// Producer-side view of a single submission.
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Clone)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

struct CompletionInner {
    done: AtomicBool,
    notify: Notify,
}

impl Completion {
    /// The process-wide, permanently ready signal.
    ///
    /// Returned for submissions nobody was listening to. This never
    /// allocates after first use.
    pub fn ready() -> Self {
        READY.clone()
    }

    pub(crate) fn pending() -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                done: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Mark the signal ready and wake every waiter. Idempotent.
    pub(crate) fn complete(&self) {
        if !self.inner.done.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns `true` once the submission has been fully consumed.
    pub fn is_ready(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }

    /// Wait until the submission has been fully consumed.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent `complete` between
            // the check and the await is not missed.
            notified.as_mut().enable();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }

    /// Returns `true` if both handles refer to the same submission.
    pub fn same_signal(&self, other: &Completion) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ready_is_shared() {
        let a = Completion::ready();
        let b = Completion::ready();
        assert!(a.is_ready());
        assert!(a.same_signal(&b));
    }

    #[test]
    fn test_complete_is_idempotent() {
        let c = Completion::pending();
        assert!(!c.is_ready());
        c.complete();
        c.complete();
        assert!(c.is_ready());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_complete() {
        let c = Completion::pending();
        let waiter = {
            let c = c.clone();
            tokio::spawn(async move { c.wait().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        c.complete();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_wait_on_ready_returns_immediately() {
        let waited = tokio::time::timeout(Duration::from_millis(50), Completion::ready().wait()).await;
        assert!(waited.is_ok());
    }
}
