use crate::sync::{AtomicI64, Ordering};

/// One word of synchronizer state.
///
/// What the value means belongs to the synchronizer: a lock might use 0 for free and a hold count otherwise, a latch the
/// remaining count, a semaphore the available permits.  Every access is sequentially consistent, because the wait queue
/// relies on a write here being ordered against a later read of a node's status (and the other way around) to avoid
/// missed wakeups.
///
/// There is no retry logic here.  Read-modify-write callers loop over [StateCell::compare_and_set] themselves.
#[derive(Debug)]
pub struct StateCell {
    value: AtomicI64,
}

impl StateCell {
    #[cfg(not(loom))]
    pub const fn new(initial: i64) -> StateCell {
        StateCell {
            value: AtomicI64::new(initial),
        }
    }

    #[cfg(loom)]
    pub fn new(initial: i64) -> StateCell {
        StateCell {
            value: AtomicI64::new(initial),
        }
    }

    #[inline(always)]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Overwrite the state.
    ///
    /// This is only valid when nothing can write concurrently, e.g. the exclusive owner of a lock dropping its hold.
    /// Anything else must use [StateCell::compare_and_set].
    #[inline(always)]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst)
    }

    /// Set the state to `update` if it is currently `expect`.  Returns whether the swap happened.
    #[inline(always)]
    pub fn compare_and_set(&self, expect: i64, update: i64) -> bool {
        self.value
            .compare_exchange(expect, update, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        StateCell::new(0)
    }
}
