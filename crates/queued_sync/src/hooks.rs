use crate::error::{Error, Result};
use crate::sync_core::SyncCore;

/// The outcome of a shared acquire attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, derive_more::IsVariant)]
pub enum SharedAcquire {
    /// The caller did not acquire and should queue.
    Failed,

    /// The caller acquired, but later shared acquirers would not succeed.
    Acquired,

    /// The caller acquired, and later shared acquirers might succeed too, so queued ones should be woken.
    Propagate,
}

impl SharedAcquire {
    /// Classify a count of what remains after acquiring: negative is failure, zero is success with nothing left over,
    /// positive is success with more available.
    pub fn from_remaining(remaining: i64) -> SharedAcquire {
        match remaining {
            r if r < 0 => SharedAcquire::Failed,
            0 => SharedAcquire::Acquired,
            _ => SharedAcquire::Propagate,
        }
    }

    pub fn acquired(&self) -> bool {
        !self.is_failed()
    }
}

/// The policy of a synchronizer: what it means to acquire and release it.
///
/// Implementations only ever inspect and update the state through the [SyncCore] they are handed, usually with
/// [SyncCore::compare_and_set_state].  None of these may block, and all of them may be called concurrently from many
/// threads.  The queueing, parking, timeouts, cancellation and conditions are all handled by
/// [crate::QueuedSync], which calls these whenever a thread wants to try again.
///
/// A synchronizer supports the modes it implements.  Every hook fails with [Error::is_unsupported] unless overridden;
/// exclusive-only synchronizers leave the shared hooks alone and vice versa.  [Synchronizer::is_held_exclusively] is only
/// needed for conditions.
///
/// An error from a hook is passed through to whoever called the operation that invoked it.  If the calling thread was
/// queued, it is removed from the queue first.
pub trait Synchronizer: Send + Sync {
    /// Try to acquire exclusively.  Must return `Ok(true)` only if the acquisition happened.
    fn try_acquire(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        let _ = (core, arg);
        Err(Error::unsupported("try_acquire"))
    }

    /// Try to release an exclusive hold.  Returns whether the synchronizer is now fully released, so that a queued
    /// thread may be able to acquire.
    ///
    /// Releasing something the caller doesn't hold is usually an [Error::is_illegal_monitor_state] error.
    fn try_release(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        let _ = (core, arg);
        Err(Error::unsupported("try_release"))
    }

    /// Try to acquire in shared mode.
    fn try_acquire_shared(&self, core: &SyncCore, arg: i64) -> Result<SharedAcquire> {
        let _ = (core, arg);
        Err(Error::unsupported("try_acquire_shared"))
    }

    /// Try to release in shared mode.  Returns whether a waiting acquirer, in either mode, may now succeed.
    fn try_release_shared(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        let _ = (core, arg);
        Err(Error::unsupported("try_release_shared"))
    }

    /// Is the synchronizer held exclusively by the calling thread?
    fn is_held_exclusively(&self, core: &SyncCore) -> Result<bool> {
        let _ = core;
        Err(Error::unsupported("is_held_exclusively"))
    }
}

impl<T: Synchronizer + ?Sized> Synchronizer for &T {
    fn try_acquire(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        (**self).try_acquire(core, arg)
    }

    fn try_release(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        (**self).try_release(core, arg)
    }

    fn try_acquire_shared(&self, core: &SyncCore, arg: i64) -> Result<SharedAcquire> {
        (**self).try_acquire_shared(core, arg)
    }

    fn try_release_shared(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        (**self).try_release_shared(core, arg)
    }

    fn is_held_exclusively(&self, core: &SyncCore) -> Result<bool> {
        (**self).is_held_exclusively(core)
    }
}
