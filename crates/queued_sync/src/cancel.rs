//! Cooperative cancellation of blocking waits.
//!
//! Rust threads have no interrupt flag, so every wait which may be abandoned takes a [CancelToken] instead.  Cancelling
//! a token sets its flag and wakes the thread which most recently started waiting with it.  From there, what happens
//! depends on the wait:
//!
//! - Interruptible waits consume the flag and fail with [crate::Error::is_interrupted].
//! - Uninterruptible waits which were handed a token consume the flag, keep waiting, and set it again once they are
//!   done, so the caller still finds out.
//! - Timed waits are interruptible waits with a deadline.
//!
//! Parking always checks the flag first.  Without that, a cancellation which lands after the waiter last looked but
//! before it parks would only be noticed at the next unrelated wakeup.
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::sync::{current, AtomicBool, Ordering, Thread};

/// A cancellation flag which can be shared between the thread that waits and the threads that want it to stop waiting.
///
/// Clones share the same flag.  Use one token for at most one waiting thread at a time: [CancelToken::cancel] only wakes
/// the thread which registered most recently, and the wait it stops consumes the flag, so any other thread waiting on
/// the same token keeps waiting.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    cancelled: AtomicBool,

    /// The thread to wake on cancellation.
    waiter: ArcSwapOption<Thread>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                waiter: ArcSwapOption::empty(),
            }),
        }
    }

    /// Cancel any wait using this token, or the next one if nobody is waiting yet.
    pub fn cancel(&self) {
        // Must be ordered before reading the waiter: the waiter registers itself before checking the flag, so one of
        // the two sides always sees the other.
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Some(thread) = self.inner.waiter.load_full() {
            crate::park::unpark(&thread);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.inner.cancelled.swap(false, Ordering::SeqCst)
    }

    /// Set the flag again after an uninterruptible wait swallowed it.  Doesn't wake anyone: the thread doing this is the
    /// one that would be woken.
    pub(crate) fn restore(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// Make the calling thread the one [CancelToken::cancel] wakes.
    pub(crate) fn register_current(&self) {
        let me = current();
        let already = self
            .inner
            .waiter
            .load_full()
            .is_some_and(|t| t.id() == me.id());
        if !already {
            self.inner.waiter.store(Some(Arc::new(me)));
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
