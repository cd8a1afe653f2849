//! Condition variables over an exclusively held synchronizer.
//!
//! A waiting thread puts a node on the condition's own queue, fully releases the synchronizer, and parks until its node
//! shows up on the synchronizer's sync queue.  Signalling moves nodes from the condition queue to the sync queue, after
//! which the waiter competes for the synchronizer like any other queued thread and returns once it holds it again, with
//! the same state it released.
//!
//! The condition queue is only touched while the synchronizer is held exclusively, so it needs no CAS.  The hand-off
//! between the two queues does: a node's status goes from [CONDITION] to something else exactly once, and whoever does
//! that (a signaller, or the waiter itself on cancellation or timeout) is the one which moves it.
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;

use crate::cancel::CancelToken;
use crate::config::SPIN_FOR_TIMEOUT_THRESHOLD;
use crate::error::{Error, Result};
use crate::hooks::Synchronizer;
use crate::node::{Mode, Node, NodeRef, CONDITION};
use crate::park;
use crate::queued::QueuedSync;
use crate::sync::Thread;
use crate::unique_id::SyncId;

/// A condition variable, created with [QueuedSync::new_condition].
///
/// Every method takes the synchronizer which created the condition, and fails with [Error::is_foreign_condition] when
/// given another one.  Waiting and signalling require holding it exclusively, as its
/// [Synchronizer::is_held_exclusively] hook reports.
///
/// Wakeups are never spurious: a wait returns because it was signalled, was cancelled, or timed out.
pub struct Condition {
    owner: SyncId,
    first_waiter: ArcSwapOption<Node>,
    last_waiter: ArcSwapOption<Node>,
}

/// What to do about a cancellation once a wait has reacquired.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum InterruptMode {
    None,

    /// Cancelled after being signalled: return normally, but cancel the token again.
    Reinterrupt,

    /// Cancelled before being signalled: fail.
    Throw,
}

impl InterruptMode {
    fn report(self, token: &CancelToken) -> Result<()> {
        match self {
            InterruptMode::None => Ok(()),
            InterruptMode::Reinterrupt => {
                token.restore();
                Ok(())
            }
            InterruptMode::Throw => Err(Error::interrupted()),
        }
    }
}

impl Condition {
    pub(crate) fn new(owner: SyncId) -> Condition {
        Condition {
            owner,
            first_waiter: ArcSwapOption::empty(),
            last_waiter: ArcSwapOption::empty(),
        }
    }

    pub(crate) fn is_owned_by<S: Synchronizer>(&self, sync: &QueuedSync<S>) -> bool {
        self.owner == sync.core().id()
    }

    fn check_owner<S: Synchronizer>(&self, sync: &QueuedSync<S>) -> Result<()> {
        if self.is_owned_by(sync) {
            Ok(())
        } else {
            Err(Error::foreign_condition())
        }
    }

    fn check_held<S: Synchronizer>(&self, sync: &QueuedSync<S>) -> Result<()> {
        self.check_owner(sync)?;
        if sync.is_held_exclusively()? {
            Ok(())
        } else {
            Err(Error::illegal_monitor_state(
                "the synchronizer is not held exclusively by the calling thread",
            ))
        }
    }

    fn waiters(&self) -> impl Iterator<Item = NodeRef> {
        std::iter::successors(self.first_waiter.load_full(), |n| {
            n.next_waiter.load_full()
        })
    }

    /// Put a node for the calling thread at the end of the condition queue.
    fn add_waiter<S: Synchronizer>(&self, sync: &QueuedSync<S>) -> Result<NodeRef> {
        self.check_held(sync)?;

        let mut last = self.last_waiter.load_full();
        if last.as_ref().is_some_and(|l| l.status() != CONDITION) {
            self.unlink_cancelled_waiters();
            last = self.last_waiter.load_full();
        }

        let node = Node::for_current(Mode::Exclusive, CONDITION);
        match last {
            None => self.first_waiter.store(Some(node.clone())),
            Some(l) => l.next_waiter.store(Some(node.clone())),
        }
        self.last_waiter.store(Some(node.clone()));
        Ok(node)
    }

    /// Drop nodes which already left for the sync queue through cancellation or a timeout.
    fn unlink_cancelled_waiters(&self) {
        let mut trail: Option<NodeRef> = None;
        let mut cursor = self.first_waiter.load_full();

        while let Some(node) = cursor {
            let next = node.next_waiter.load_full();
            if node.status() != CONDITION {
                node.next_waiter.store(None);
                match &trail {
                    None => self.first_waiter.store(next.clone()),
                    Some(t) => t.next_waiter.store(next.clone()),
                }
                if next.is_none() {
                    self.last_waiter.store(trail.clone());
                }
            } else {
                trail = Some(node);
            }
            cursor = next;
        }
    }

    fn do_signal<S: Synchronizer>(&self, sync: &QueuedSync<S>, first: NodeRef) {
        let mut first = first;
        loop {
            let next = first.next_waiter.load_full();
            self.first_waiter.store(next.clone());
            if next.is_none() {
                self.last_waiter.store(None);
            }
            first.next_waiter.store(None);

            if sync.queue.transfer_for_signal(&first) {
                return;
            }

            // Lost to a cancellation; that waiter is already on its way.  Signal the next one instead.
            match next {
                Some(n) => first = n,
                None => return,
            }
        }
    }

    fn do_signal_all<S: Synchronizer>(&self, sync: &QueuedSync<S>, first: NodeRef) {
        self.first_waiter.store(None);
        self.last_waiter.store(None);

        let mut cursor = Some(first);
        while let Some(node) = cursor {
            cursor = node.next_waiter.swap(None);
            sync.queue.transfer_for_signal(&node);
        }
    }

    /// Move the longest-waiting thread, if any, to the synchronizer's queue.
    pub fn signal<S: Synchronizer>(&self, sync: &QueuedSync<S>) -> Result<()> {
        self.check_held(sync)?;
        if let Some(first) = self.first_waiter.load_full() {
            self.do_signal(sync, first);
        }
        Ok(())
    }

    /// Move every waiting thread to the synchronizer's queue.
    pub fn signal_all<S: Synchronizer>(&self, sync: &QueuedSync<S>) -> Result<()> {
        self.check_held(sync)?;
        if let Some(first) = self.first_waiter.load_full() {
            self.do_signal_all(sync, first);
        }
        Ok(())
    }

    /// After a cancellation, work out whether a signal got there first.
    fn check_interrupt_while_waiting<S: Synchronizer>(
        &self,
        sync: &QueuedSync<S>,
        node: &NodeRef,
        token: &CancelToken,
    ) -> InterruptMode {
        if !token.take() {
            return InterruptMode::None;
        }

        if sync.queue.transfer_after_cancelled_wait(node) {
            InterruptMode::Throw
        } else {
            InterruptMode::Reinterrupt
        }
    }

    /// Reacquire after leaving the condition queue, then settle cancellation.
    fn finish_wait<S: Synchronizer>(
        &self,
        sync: &QueuedSync<S>,
        node: &NodeRef,
        saved: i64,
        token: &CancelToken,
        mut mode: InterruptMode,
    ) -> Result<()> {
        if sync.reacquire(node, saved, Some(token))? && mode != InterruptMode::Throw {
            mode = InterruptMode::Reinterrupt;
        }

        // Still linked means it left through cancellation rather than a signal.
        if node.next_waiter.load().is_some() {
            self.unlink_cancelled_waiters();
        }

        if mode == InterruptMode::Throw {
            log::debug!("Condition wait on {} cancelled", sync.blocker());
        }
        mode.report(token)
    }

    /// Release the synchronizer and wait until signalled, then reacquire it.
    ///
    /// If `token` is cancelled before this is signalled, fails with [Error::is_interrupted], after reacquiring.  If it is
    /// cancelled after, returns normally with the token cancelled.
    pub fn wait<S: Synchronizer>(&self, sync: &QueuedSync<S>, token: &CancelToken) -> Result<()> {
        self.check_owner(sync)?;
        token.register_current();
        if token.take() {
            return Err(Error::interrupted());
        }

        let node = self.add_waiter(sync)?;
        let saved = sync.fully_release(&node)?;

        let mut mode = InterruptMode::None;
        while !sync.queue.is_on_sync_queue(&node) {
            park::park_unless_cancelled(sync.blocker(), Some(token), None);
            mode = self.check_interrupt_while_waiting(sync, &node, token);
            if mode != InterruptMode::None {
                break;
            }
        }

        self.finish_wait(sync, &node, saved, token, mode)
    }

    /// Release the synchronizer and wait until signalled, then reacquire it.  Cancellation of `token` doesn't end the
    /// wait; the token is cancelled again on return.
    pub fn wait_uninterruptibly<S: Synchronizer>(
        &self,
        sync: &QueuedSync<S>,
        token: Option<&CancelToken>,
    ) -> Result<()> {
        self.check_owner(sync)?;
        if let Some(t) = token {
            t.register_current();
        }

        let node = self.add_waiter(sync)?;
        let saved = sync.fully_release(&node)?;

        let mut interrupted = false;
        while !sync.queue.is_on_sync_queue(&node) {
            park::park_unless_cancelled(sync.blocker(), token, None);
            if token.is_some_and(CancelToken::take) {
                interrupted = true;
            }
        }

        if sync.reacquire(&node, saved, token)? || interrupted {
            if let Some(t) = token {
                t.restore();
            }
        }
        Ok(())
    }

    /// The timed wait.  Returns whether the deadline passed before a signal.
    fn wait_deadline<S: Synchronizer>(
        &self,
        sync: &QueuedSync<S>,
        deadline: Option<Instant>,
        token: &CancelToken,
    ) -> Result<bool> {
        self.check_owner(sync)?;
        token.register_current();
        if token.take() {
            return Err(Error::interrupted());
        }

        let node = self.add_waiter(sync)?;
        let saved = sync.fully_release(&node)?;

        let mut timed_out = false;
        let mut mode = InterruptMode::None;
        while !sync.queue.is_on_sync_queue(&node) {
            let remaining = park::remaining(deadline);
            if remaining == Some(Duration::ZERO) {
                timed_out = sync.queue.transfer_after_cancelled_wait(&node);
                break;
            }

            if remaining.map_or(true, |r| r > SPIN_FOR_TIMEOUT_THRESHOLD) {
                park::park_unless_cancelled(sync.blocker(), Some(token), remaining);
            }

            mode = self.check_interrupt_while_waiting(sync, &node, token);
            if mode != InterruptMode::None {
                break;
            }
        }

        if timed_out {
            log::debug!("Condition wait on {} timed out", sync.blocker());
        }
        self.finish_wait(sync, &node, saved, token, mode)?;
        Ok(timed_out)
    }

    /// Wait for at most `timeout`.  Returns the time that was left, or `None` if the wait timed out.
    ///
    /// Reacquiring the synchronizer can take a while after a signal, so the time left may be zero even though the wait
    /// was signalled; that is reported as `None` as well.
    pub fn wait_timeout<S: Synchronizer>(
        &self,
        sync: &QueuedSync<S>,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<Option<Duration>> {
        let start = Instant::now();
        let timed_out = self.wait_deadline(sync, park::deadline_after(timeout), token)?;
        let left = timeout.saturating_sub(start.elapsed());

        if timed_out || left.is_zero() {
            Ok(None)
        } else {
            Ok(Some(left))
        }
    }

    /// Wait until `deadline`.  Returns false if the deadline passed first.
    pub fn wait_until<S: Synchronizer>(
        &self,
        sync: &QueuedSync<S>,
        deadline: Instant,
        token: &CancelToken,
    ) -> Result<bool> {
        Ok(!self.wait_deadline(sync, Some(deadline), token)?)
    }

    /// Wait for at most `timeout`.  Returns false if it elapsed first.
    pub fn wait_for<S: Synchronizer>(
        &self,
        sync: &QueuedSync<S>,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<bool> {
        Ok(!self.wait_deadline(sync, park::deadline_after(timeout), token)?)
    }

    /// Are any threads waiting?  Requires holding the synchronizer.
    pub fn has_waiters<S: Synchronizer>(&self, sync: &QueuedSync<S>) -> Result<bool> {
        self.check_held(sync)?;
        Ok(self.waiters().any(|n| n.status() == CONDITION))
    }

    pub fn wait_queue_length<S: Synchronizer>(&self, sync: &QueuedSync<S>) -> Result<usize> {
        self.check_held(sync)?;
        Ok(self.waiters().filter(|n| n.status() == CONDITION).count())
    }

    /// The waiting threads, longest waiting first.
    pub fn waiting_threads<S: Synchronizer>(&self, sync: &QueuedSync<S>) -> Result<Vec<Thread>> {
        self.check_held(sync)?;
        Ok(self
            .waiters()
            .filter(|n| n.status() == CONDITION)
            .filter_map(|n| n.thread())
            .map(|t| (*t).clone())
            .collect())
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("owner", &self.owner)
            .field("waiters", &self.waiters().count())
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    use crate::sync_core::SyncCore;

    /// A non-reentrant lock which tracks its owner.
    #[derive(Debug, Default)]
    struct Lock;

    impl Synchronizer for Lock {
        fn try_acquire(&self, core: &SyncCore, arg: i64) -> Result<bool> {
            if core.compare_and_set_state(0, arg) {
                core.owner().set_current();
                return Ok(true);
            }
            Ok(false)
        }

        fn try_release(&self, core: &SyncCore, _arg: i64) -> Result<bool> {
            if !core.owner().is_current() {
                return Err(Error::illegal_monitor_state("lock not held"));
            }
            core.owner().clear();
            core.set_state(0);
            Ok(true)
        }

        fn is_held_exclusively(&self, core: &SyncCore) -> Result<bool> {
            Ok(core.owner().is_current())
        }
    }

    #[test]
    fn waiting_requires_the_lock() {
        let sync = QueuedSync::new(Lock);
        let cond = sync.new_condition();
        let token = CancelToken::new();

        let err = cond.wait(&sync, &token).unwrap_err();
        assert!(err.is_illegal_monitor_state());
        assert!(cond.signal(&sync).unwrap_err().is_illegal_monitor_state());
        assert!(sync.has_waiters(&cond).unwrap_err().is_illegal_monitor_state());
    }

    #[test]
    fn conditions_belong_to_one_synchronizer() {
        let a = QueuedSync::new(Lock);
        let b = QueuedSync::new(Lock);
        let cond = a.new_condition();
        assert!(a.owns(&cond));
        assert!(!b.owns(&cond));

        b.acquire(1).unwrap();
        assert!(cond.signal(&b).unwrap_err().is_foreign_condition());
        assert!(b.wait_queue_length(&cond).unwrap_err().is_foreign_condition());
    }

    #[test]
    fn timed_wait_reacquires_with_saved_state() {
        let sync = QueuedSync::new(Lock);
        let cond = sync.new_condition();
        let token = CancelToken::new();

        sync.acquire(7).unwrap();
        let left = cond
            .wait_timeout(&sync, Duration::from_millis(10), &token)
            .unwrap();
        assert_eq!(left, None);
        assert_eq!(sync.get_state(), 7);
        assert!(sync.is_held_exclusively().unwrap());
        assert!(!cond.has_waiters(&sync).unwrap());
        assert_eq!(cond.wait_queue_length(&sync).unwrap(), 0);
    }

    #[test]
    fn cancelled_wait_fails_immediately() {
        let sync = QueuedSync::new(Lock);
        let cond = sync.new_condition();
        let token = CancelToken::new();

        sync.acquire(1).unwrap();
        token.cancel();
        assert!(cond.wait(&sync, &token).unwrap_err().is_interrupted());
        // Still held; the wait never released.
        assert!(sync.is_held_exclusively().unwrap());
        assert!(!cond.has_waiters(&sync).unwrap());
    }

    #[test]
    fn timed_out_waiters_are_unlinked() {
        let sync = QueuedSync::new(Lock);
        let cond = sync.new_condition();
        let token = CancelToken::new();

        sync.acquire(1).unwrap();
        for _ in 0..3 {
            assert!(!cond
                .wait_for(&sync, Duration::from_millis(1), &token)
                .unwrap());
        }
        // Each new wait unlinks the previous one; only the last lingers until the next wait or signal.
        assert_eq!(cond.waiters().count(), 1);
        assert_eq!(cond.wait_queue_length(&sync).unwrap(), 0);
        cond.signal(&sync).unwrap();
        assert!(cond.first_waiter.load().is_none());
        assert!(cond.last_waiter.load().is_none());
    }
}
