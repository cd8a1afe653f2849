use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::condition::Condition;
use crate::config::SPIN_FOR_TIMEOUT_THRESHOLD;
use crate::error::{Error, Result};
use crate::hooks::Synchronizer;
use crate::node::{Mode, NodeRef, CANCELLED};
use crate::park;
use crate::queue::SyncQueue;
use crate::sync::Thread;
use crate::sync_core::SyncCore;

/// A blocking synchronizer: a [Synchronizer]'s hooks plus the queue that makes threads wait for them.
///
/// Acquisition first calls the hook directly, so a thread which arrives while the synchronizer is free gets it without
/// queueing, even if others are already queued (barging).  Otherwise the thread joins the wait queue, and retries the
/// hook each time it is first in line and woken, parking in between.  Releases call the hook and then wake the first
/// queued thread.  Synchronizers that want FIFO fairness check [SyncCore::has_queued_predecessors] in their hooks.
///
/// Most operations come in several flavours which differ only in how a wait may end early:
///
/// - Plain operations wait until they succeed.
/// - `_uninterruptibly` operations also wait until they succeed, but observe a [CancelToken] while doing so.  A
///   cancellation doesn't stop them; it is set on the token again once they return.
/// - `_interruptibly` operations fail with [Error::is_interrupted] if their token is cancelled before or during the wait.
/// - Timed operations are interruptible, and give up with `Ok(false)` once their deadline passes.
///
/// Dereferences to [SyncCore] for state and queue inspection.
pub struct QueuedSync<S> {
    core: SyncCore,
    hooks: S,
}

/// How a queued thread may stop waiting.
enum Wait<'a> {
    Uninterruptible(Option<&'a CancelToken>),
    Interruptible(&'a CancelToken),
    Timed {
        token: &'a CancelToken,
        deadline: Option<Instant>,
    },
}

impl<'a> Wait<'a> {
    fn token(&self) -> Option<&'a CancelToken> {
        match *self {
            Wait::Uninterruptible(t) => t,
            Wait::Interruptible(t) => Some(t),
            Wait::Timed { token, .. } => Some(token),
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Acquired {
        /// A cancellation was swallowed by an uninterruptible wait and must be restored.
        interrupted: bool,
    },
    Interrupted,
    TimedOut,
}

impl Outcome {
    /// Convert to what timed and interruptible operations return.
    fn finish(self, token: Option<&CancelToken>) -> Result<bool> {
        match self {
            Outcome::Acquired { interrupted } => {
                if interrupted {
                    if let Some(t) = token {
                        t.restore();
                    }
                }
                Ok(true)
            }
            Outcome::TimedOut => Ok(false),
            Outcome::Interrupted => Err(Error::interrupted()),
        }
    }
}

impl<S: Synchronizer> QueuedSync<S> {
    pub fn new(hooks: S) -> QueuedSync<S> {
        QueuedSync::with_state(hooks, 0)
    }

    pub fn with_state(hooks: S, initial: i64) -> QueuedSync<S> {
        QueuedSync {
            core: SyncCore::new(initial),
            hooks,
        }
    }

    pub fn hooks(&self) -> &S {
        &self.hooks
    }

    pub fn core(&self) -> &SyncCore {
        &self.core
    }

    /// What parked threads are waiting on, for logging.
    pub(crate) fn blocker(&self) -> &'static str {
        std::any::type_name::<S>()
    }

    fn queue(&self) -> &SyncQueue {
        &self.core.queue
    }

    /// Log and clean up after a queued thread gives up.
    fn abandon(&self, node: &NodeRef, outcome: Outcome) -> Outcome {
        log::debug!("Abandoning queued acquisition of {}: {:?}", self.blocker(), outcome);
        self.queue().cancel_acquire(node);
        outcome
    }

    /// One round of waiting for a queued node, after it failed to acquire.
    ///
    /// Returns `Some` if the wait is over without acquiring, in which case the node has already been cancelled.
    fn wait_for_turn(
        &self,
        pred: &NodeRef,
        node: &NodeRef,
        wait: &Wait,
        interrupted: &mut bool,
    ) -> Option<Outcome> {
        let mut timeout = None;
        if let Wait::Timed { deadline, .. } = wait {
            timeout = park::remaining(*deadline);
            if timeout == Some(Duration::ZERO) {
                return Some(self.abandon(node, Outcome::TimedOut));
            }
        }

        if !SyncQueue::should_park_after_failed_acquire(pred, node) {
            return None;
        }

        // Close to the deadline, spinning is more accurate than a timed park.
        if timeout.is_some_and(|t| t <= SPIN_FOR_TIMEOUT_THRESHOLD) {
            return None;
        }

        park::park_unless_cancelled(self.blocker(), wait.token(), timeout);

        match wait {
            Wait::Uninterruptible(None) => {}
            Wait::Uninterruptible(Some(token)) => {
                if token.take() {
                    *interrupted = true;
                }
            }
            Wait::Interruptible(token) | Wait::Timed { token, .. } => {
                if token.take() {
                    return Some(self.abandon(node, Outcome::Interrupted));
                }
            }
        }

        None
    }

    /// The exclusive acquire loop for a node which is already queued.
    fn acquire_queued(&self, node: &NodeRef, arg: i64, wait: Wait) -> Result<Outcome> {
        let mut interrupted = false;

        loop {
            let pred = node.predecessor();
            if self.queue().is_head(&pred) {
                match self.hooks.try_acquire(&self.core, arg) {
                    Ok(true) => {
                        self.queue().set_head(node);
                        pred.next.store(None);
                        return Ok(Outcome::Acquired { interrupted });
                    }
                    Ok(false) => {}
                    Err(e) => {
                        self.queue().cancel_acquire(node);
                        return Err(e);
                    }
                }
            }

            if let Some(outcome) = self.wait_for_turn(&pred, node, &wait, &mut interrupted) {
                return Ok(outcome);
            }
        }
    }

    fn acquire_with(&self, arg: i64, wait: Wait) -> Result<Outcome> {
        if self.hooks.try_acquire(&self.core, arg)? {
            return Ok(Outcome::Acquired { interrupted: false });
        }

        if let Wait::Timed { deadline, .. } = wait {
            if park::remaining(deadline) == Some(Duration::ZERO) {
                return Ok(Outcome::TimedOut);
            }
        }

        let node = self.queue().add_waiter(Mode::Exclusive);
        self.acquire_queued(&node, arg, wait)
    }

    /// Acquire exclusively, waiting as long as it takes.
    ///
    /// Errors only come from the hooks.
    pub fn acquire(&self, arg: i64) -> Result<()> {
        self.acquire_with(arg, Wait::Uninterruptible(None))?;
        Ok(())
    }

    /// Acquire exclusively, waiting as long as it takes.  If `token` is cancelled meanwhile, it is cancelled again on
    /// return.
    pub fn acquire_uninterruptibly(&self, arg: i64, token: &CancelToken) -> Result<()> {
        token.register_current();
        let outcome = self.acquire_with(arg, Wait::Uninterruptible(Some(token)))?;
        outcome.finish(Some(token))?;
        Ok(())
    }

    /// Acquire exclusively, unless `token` is cancelled first.
    pub fn acquire_interruptibly(&self, arg: i64, token: &CancelToken) -> Result<()> {
        token.register_current();
        if token.take() {
            return Err(Error::interrupted());
        }

        self.acquire_with(arg, Wait::Interruptible(token))?
            .finish(Some(token))?;
        Ok(())
    }

    fn try_acquire_deadline(
        &self,
        arg: i64,
        deadline: Option<Instant>,
        token: &CancelToken,
    ) -> Result<bool> {
        token.register_current();
        if token.take() {
            return Err(Error::interrupted());
        }

        self.acquire_with(arg, Wait::Timed { token, deadline })?
            .finish(Some(token))
    }

    /// Acquire exclusively, giving up after `timeout`.  Returns whether the synchronizer was acquired.
    ///
    /// A zero timeout still tries once.
    pub fn try_acquire_timeout(
        &self,
        arg: i64,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<bool> {
        self.try_acquire_deadline(arg, park::deadline_after(timeout), token)
    }

    pub fn try_acquire_until(
        &self,
        arg: i64,
        deadline: Instant,
        token: &CancelToken,
    ) -> Result<bool> {
        self.try_acquire_deadline(arg, Some(deadline), token)
    }

    /// Release an exclusive hold.  Returns what the hook returned: whether the synchronizer is now free.
    pub fn release(&self, arg: i64) -> Result<bool> {
        if !self.hooks.try_release(&self.core, arg)? {
            return Ok(false);
        }

        if let Some(head) = self.queue().head() {
            if head.status() != 0 {
                self.queue().unpark_successor(&head);
            }
        }
        Ok(true)
    }

    /// The shared acquire loop for a node which is already queued.
    fn acquire_shared_queued(&self, node: &NodeRef, arg: i64, wait: Wait) -> Result<Outcome> {
        let mut interrupted = false;

        loop {
            let pred = node.predecessor();
            if self.queue().is_head(&pred) {
                match self.hooks.try_acquire_shared(&self.core, arg) {
                    Ok(r) if r.acquired() => {
                        self.queue().set_head_and_propagate(node, r.is_propagate());
                        pred.next.store(None);
                        return Ok(Outcome::Acquired { interrupted });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.queue().cancel_acquire(node);
                        return Err(e);
                    }
                }
            }

            if let Some(outcome) = self.wait_for_turn(&pred, node, &wait, &mut interrupted) {
                return Ok(outcome);
            }
        }
    }

    fn acquire_shared_with(&self, arg: i64, wait: Wait) -> Result<Outcome> {
        if self.hooks.try_acquire_shared(&self.core, arg)?.acquired() {
            return Ok(Outcome::Acquired { interrupted: false });
        }

        if let Wait::Timed { deadline, .. } = wait {
            if park::remaining(deadline) == Some(Duration::ZERO) {
                return Ok(Outcome::TimedOut);
            }
        }

        let node = self.queue().add_waiter(Mode::Shared);
        self.acquire_shared_queued(&node, arg, wait)
    }

    /// Acquire in shared mode, waiting as long as it takes.
    pub fn acquire_shared(&self, arg: i64) -> Result<()> {
        self.acquire_shared_with(arg, Wait::Uninterruptible(None))?;
        Ok(())
    }

    /// Acquire in shared mode, waiting as long as it takes.  If `token` is cancelled meanwhile, it is cancelled again on
    /// return.
    pub fn acquire_shared_uninterruptibly(&self, arg: i64, token: &CancelToken) -> Result<()> {
        token.register_current();
        self.acquire_shared_with(arg, Wait::Uninterruptible(Some(token)))?
            .finish(Some(token))?;
        Ok(())
    }

    pub fn acquire_shared_interruptibly(&self, arg: i64, token: &CancelToken) -> Result<()> {
        token.register_current();
        if token.take() {
            return Err(Error::interrupted());
        }

        self.acquire_shared_with(arg, Wait::Interruptible(token))?
            .finish(Some(token))?;
        Ok(())
    }

    fn try_acquire_shared_deadline(
        &self,
        arg: i64,
        deadline: Option<Instant>,
        token: &CancelToken,
    ) -> Result<bool> {
        token.register_current();
        if token.take() {
            return Err(Error::interrupted());
        }

        self.acquire_shared_with(arg, Wait::Timed { token, deadline })?
            .finish(Some(token))
    }

    pub fn try_acquire_shared_timeout(
        &self,
        arg: i64,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<bool> {
        self.try_acquire_shared_deadline(arg, park::deadline_after(timeout), token)
    }

    pub fn try_acquire_shared_until(
        &self,
        arg: i64,
        deadline: Instant,
        token: &CancelToken,
    ) -> Result<bool> {
        self.try_acquire_shared_deadline(arg, Some(deadline), token)
    }

    /// Release in shared mode.  If the hook says waiters may now proceed, wakes them.
    pub fn release_shared(&self, arg: i64) -> Result<bool> {
        if !self.hooks.try_release_shared(&self.core, arg)? {
            return Ok(false);
        }

        self.queue().release_shared();
        Ok(true)
    }

    pub fn is_held_exclusively(&self) -> Result<bool> {
        self.hooks.is_held_exclusively(&self.core)
    }

    /// Create a condition bound to this synchronizer.  It may only be used while holding this synchronizer exclusively.
    pub fn new_condition(&self) -> Condition {
        Condition::new(self.core.id())
    }

    /// Was `condition` created by this synchronizer?
    pub fn owns(&self, condition: &Condition) -> bool {
        condition.is_owned_by(self)
    }

    /// Are any threads waiting on `condition`?  Requires holding this synchronizer exclusively.
    pub fn has_waiters(&self, condition: &Condition) -> Result<bool> {
        condition.has_waiters(self)
    }

    pub fn wait_queue_length(&self, condition: &Condition) -> Result<usize> {
        condition.wait_queue_length(self)
    }

    pub fn waiting_threads(&self, condition: &Condition) -> Result<Vec<Thread>> {
        condition.waiting_threads(self)
    }

    /// Release everything the calling thread holds, returning the state to later reacquire with.
    ///
    /// On failure, `node` is cancelled so that the condition queue drops it.
    pub(crate) fn fully_release(&self, node: &NodeRef) -> Result<i64> {
        let saved = self.core.get_state();
        match self.release(saved) {
            Ok(true) => Ok(saved),
            Ok(false) => {
                node.set_status(CANCELLED);
                Err(Error::illegal_monitor_state(
                    "releasing the saved state did not free the synchronizer",
                ))
            }
            Err(e) => {
                node.set_status(CANCELLED);
                Err(e)
            }
        }
    }

    /// Reacquire with a node which a condition has moved onto the sync queue.  Returns whether a cancellation of `token`
    /// was swallowed while waiting.
    pub(crate) fn reacquire(
        &self,
        node: &NodeRef,
        saved: i64,
        token: Option<&CancelToken>,
    ) -> Result<bool> {
        match self.acquire_queued(node, saved, Wait::Uninterruptible(token))? {
            Outcome::Acquired { interrupted } => Ok(interrupted),
            Outcome::Interrupted | Outcome::TimedOut => {
                unreachable!("Uninterruptible waits without deadlines always acquire")
            }
        }
    }
}

impl<S> std::ops::Deref for QueuedSync<S> {
    type Target = SyncCore;

    fn deref(&self) -> &SyncCore {
        &self.core
    }
}

impl<S: Default + Synchronizer> Default for QueuedSync<S> {
    fn default() -> Self {
        QueuedSync::new(S::default())
    }
}

impl<S> std::fmt::Display for QueuedSync<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.core, f)
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for QueuedSync<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedSync")
            .field("core", &self.core)
            .field("hooks", &self.hooks)
            .finish()
    }
}
