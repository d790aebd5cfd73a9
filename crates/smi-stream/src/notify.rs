//! Broadcast wakeups for blocked readers, writers and pollers.
//!
//! One `Notifier` serves every predicate: the completion handler calls
//! [`Notifier::notify_all`] whenever RX gains data or TX gains space, and each
//! waiter re-evaluates its own condition. Waiters snapshot the generation
//! *before* checking their predicate, so a notification between the check and
//! the wait is never lost.

use core::cell::RefCell;
use core::future::poll_fn;
use core::sync::atomic::{AtomicU32, Ordering};
use core::task::Poll;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::waitqueue::MultiWakerRegistration;

/// Waker slots. When more tasks wait at once, registering an extra one wakes
/// everybody early; they re-check and re-register.
pub const MAX_WAITERS: usize = 8;

/// Generation-counted broadcast condition.
pub struct Notifier {
    generation: AtomicU32,
    wakers: BlockingMutex<CriticalSectionRawMutex, RefCell<MultiWakerRegistration<MAX_WAITERS>>>,
}

impl Notifier {
    /// Create a notifier with no waiters.
    pub const fn new() -> Self {
        Self {
            generation: AtomicU32::new(0),
            wakers: BlockingMutex::new(RefCell::new(MultiWakerRegistration::new())),
        }
    }

    /// Current generation. Take this before testing a predicate.
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Wake every waiter. Never blocks; safe from the completion context.
    pub fn notify_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.wakers.lock(|w| w.borrow_mut().wake());
    }

    /// Resolve once the generation differs from `seen`.
    pub async fn changed_since(&self, seen: u32) {
        poll_fn(|cx| {
            if self.generation() != seen {
                return Poll::Ready(());
            }
            self.wakers.lock(|w| w.borrow_mut().register(cx.waker()));
            // re-check: a notify may have landed before registration
            if self.generation() == seen {
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await;
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_bumps_generation() {
        let n = Notifier::new();
        let g = n.generation();
        n.notify_all();
        assert_ne!(n.generation(), g);
    }

    #[test]
    fn test_changed_since_ready_after_earlier_notify() {
        let n = Notifier::new();
        let seen = n.generation();
        n.notify_all();
        embassy_futures::block_on(n.changed_since(seen));
    }

    #[tokio::test]
    async fn test_waiter_woken_by_notify() {
        let n = Notifier::new();
        let seen = n.generation();
        let notify = async {
            tokio::task::yield_now().await;
            n.notify_all();
        };
        tokio::join!(n.changed_since(seen), notify);
    }
}
