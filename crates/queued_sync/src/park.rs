//! Suspending and resuming threads.
//!
//! This is a thin layer over the standard library's thread parking, which already has the semantics the queue relies on:
//! each thread has one permit, unparking a thread which isn't parked makes its next park return immediately, permits do
//! not accumulate, and parks may return spuriously.  Every caller loops and re-checks its condition after waking.
//!
//! On Linux, Android and other futex platforms this is a futex, on Windows `WaitOnAddress`, and on Apple platforms a
//! dispatch semaphore.  None of these allocate when parking or unparking.
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::sync::Thread;

/// Park the calling thread, unless `token` is already cancelled.
///
/// `blocker` names what the thread is waiting on, for logging.  With a timeout, the thread parks for at most that long.
pub(crate) fn park_unless_cancelled(
    blocker: &'static str,
    token: Option<&CancelToken>,
    timeout: Option<Duration>,
) {
    if token.is_some_and(CancelToken::is_cancelled) {
        return;
    }

    log::trace!("Parking on {blocker} (timeout {timeout:?})");
    match timeout {
        Some(t) => crate::sync::park_timeout(t),
        None => crate::sync::park(),
    }
}

pub(crate) fn unpark(thread: &Thread) {
    log::trace!("Unparking {:?}", thread.id());
    thread.unpark();
}

/// The deadline `timeout` from now, or `None` if that isn't representable, in which case callers wait without one.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Time left until `deadline`; `None` means there is no deadline.  Saturates at zero once it has passed.
pub(crate) fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn cancelled_token_skips_parking() {
        let token = CancelToken::new();
        token.cancel();
        // Would hang forever if it parked.
        park_unless_cancelled("test", Some(&token), None);
        assert!(token.is_cancelled());
    }

    #[test]
    fn unpark_before_park_is_not_lost() {
        unpark(&crate::sync::current());
        // The permit is already there, so this returns.
        park_unless_cancelled("test", None, None);
    }

    #[test]
    fn timed_park_returns() {
        let start = Instant::now();
        park_unless_cancelled("test", None, Some(Duration::from_millis(10)));
        // Spurious returns are allowed, so only bound the wait from above.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn deadlines() {
        assert!(deadline_after(Duration::MAX).is_none());
        assert_eq!(remaining(None), None);

        let past = Instant::now();
        assert_eq!(remaining(Some(past)), Some(Duration::ZERO));

        let future = deadline_after(Duration::from_secs(60)).unwrap();
        assert!(remaining(Some(future)).unwrap() > Duration::from_secs(30));
    }
}
