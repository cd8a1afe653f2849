//! The sync queue: a lock-free FIFO of threads waiting to acquire.
//!
//! This is a variant of a CLH queue.  Nodes are appended at the tail with a CAS, and the node after the head is the one
//! allowed to retry acquisition.  Each node's status is used by its *successor* to ask for a wakeup: a thread sets its
//! predecessor to [SIGNAL] and then retries once more before parking, and a releasing thread which sees [SIGNAL] on the
//! head unparks the head's successor.  Because both sides do "write one word, then read the other" with sequentially
//! consistent operations, either the waiter sees the release or the releaser sees the request, and no wakeup is lost.
//!
//! Nodes leave the queue in two ways:
//!
//! - The first node acquires and becomes the head.  Only that thread ever moves the head.
//! - A node is cancelled.  It is marked [CANCELLED] and unlinked opportunistically; whoever next walks past it (a
//!   successor looking for a live predecessor, or a release looking for a live successor) skips it.
//!
//! `prev` links are authoritative and `next` links are a hint: the tail is published before the old tail's `next` is
//! set, so forward traversal falls back to walking `prev` from the tail.
//!
//! This module also contains the primitives conditions use to move nodes onto this queue.
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam::utils::{Backoff, CachePadded};

use crate::node::*;
use crate::sync::Thread;

pub(crate) struct SyncQueue {
    /// Lazily initialized.  Never cancelled.  The head's thread, if any, is the one which currently holds (or last held)
    /// the synchronizer.
    head: CachePadded<ArcSwapOption<Node>>,

    tail: CachePadded<ArcSwapOption<Node>>,
}

impl SyncQueue {
    pub(crate) fn new() -> SyncQueue {
        SyncQueue {
            head: CachePadded::new(ArcSwapOption::empty()),
            tail: CachePadded::new(ArcSwapOption::empty()),
        }
    }

    pub(crate) fn head(&self) -> Option<NodeRef> {
        self.head.load_full()
    }

    pub(crate) fn is_head(&self, node: &NodeRef) -> bool {
        same(&self.head.load_full(), &Some(node.clone()))
    }

    fn is_tail(&self, node: &NodeRef) -> bool {
        same(&self.tail.load_full(), &Some(node.clone()))
    }

    /// Append `node` at the tail, initializing the queue if needed.  Returns the node's predecessor.
    ///
    /// The successful tail CAS is the point at which the node is on the queue.
    pub(crate) fn enqueue(&self, node: &NodeRef) -> NodeRef {
        loop {
            match self.tail.load_full() {
                None => {
                    let dummy = Node::dummy();
                    if cas_link(&self.head, &None, Some(dummy.clone())) {
                        self.tail.store(Some(dummy));
                    }
                }
                Some(t) => {
                    node.prev.store(Some(t.clone()));
                    if cas_link(&self.tail, &Some(t.clone()), Some(node.clone())) {
                        t.next.store(Some(node.clone()));
                        return t;
                    }
                }
            }
        }
    }

    /// Enqueue a node for the calling thread.
    pub(crate) fn add_waiter(&self, mode: Mode) -> NodeRef {
        let node = Node::for_current(mode, INITIAL);
        self.enqueue(&node);
        node
    }

    /// Make `node` the head.  Only called by `node`'s thread, right after it acquired.
    ///
    /// The caller must also clear the old head's `next`, which breaks the last link to it.
    pub(crate) fn set_head(&self, node: &NodeRef) {
        self.head.store(Some(node.clone()));
        node.clear_thread();
        node.prev.store(None);
    }

    /// Wake the first live successor of `node`, if there is one.
    pub(crate) fn unpark_successor(&self, node: &NodeRef) {
        // If this fails because the successor is concurrently asking for a signal again, it will retry before parking
        // anyway.
        let ws = node.status();
        if ws < 0 {
            node.cas_status(ws, INITIAL);
        }

        let mut successor = node.next.load_full().filter(|s| !s.is_cancelled());
        if successor.is_none() {
            // Either the successor was cancelled or its `next` link isn't written yet.  Walk back from the tail and keep
            // the earliest live node.
            let mut cursor = self.tail.load_full();
            while let Some(t) = cursor {
                if Arc::ptr_eq(&t, node) {
                    break;
                }
                if t.status() <= 0 {
                    successor = Some(t.clone());
                }
                cursor = t.prev.load_full();
            }
        }

        if let Some(s) = successor {
            s.unpark();
        }
    }

    /// Called after a failed acquire attempt by a queued node.  Returns whether it is safe to park.
    ///
    /// Parking is only safe once the predecessor has promised to signal.  If it hasn't yet, ask it to and return false,
    /// so that the caller retries acquisition once more before parking: a release which happened between the failed
    /// attempt and the request would otherwise go unnoticed.  Cancelled predecessors are skipped and unlinked.
    pub(crate) fn should_park_after_failed_acquire(pred: &NodeRef, node: &NodeRef) -> bool {
        let ws = pred.status();
        if ws == SIGNAL {
            return true;
        }

        if ws > 0 {
            let mut pred = pred.clone();
            loop {
                pred = pred.predecessor();
                node.prev.store(Some(pred.clone()));
                if !pred.is_cancelled() {
                    break;
                }
            }
            pred.next.store(Some(node.clone()));
        } else {
            // INITIAL or PROPAGATE.
            pred.cas_status(ws, SIGNAL);
        }

        false
    }

    /// Give up on an acquisition: mark `node` cancelled and unlink it as far as is safe.
    ///
    /// Only ever called by the node's own thread.  Calling it again on a node which is already cancelled does nothing.
    pub(crate) fn cancel_acquire(&self, node: &NodeRef) {
        if node.status() == CANCELLED {
            return;
        }

        node.clear_thread();

        let mut pred = node.predecessor();
        while pred.is_cancelled() {
            pred = pred.predecessor();
            node.prev.store(Some(pred.clone()));
        }

        // If this is stale, the CASes below fail, which means some other cancel or signal got there first and nothing
        // further is needed.
        let pred_next = pred.next.load_full();

        // After this, other threads may skip past us.
        node.set_status(CANCELLED);

        if cas_link(&self.tail, &Some(node.clone()), Some(pred.clone())) {
            // We were the tail; just drop off the end.
            cas_link(&pred.next, &pred_next, None);
            return;
        }

        // There is a successor.  If the predecessor will signal it, link past ourselves; otherwise wake it so that it
        // can find a live predecessor on its own.
        let pred_will_signal = !self.is_head(&pred)
            && {
                let ws = pred.status();
                ws == SIGNAL || (ws <= 0 && pred.cas_status(ws, SIGNAL))
            }
            && pred.has_thread();

        if pred_will_signal {
            if let Some(next) = node.next.load_full() {
                if next.status() <= 0 {
                    cas_link(&pred.next, &pred_next, Some(next));
                }
            }
        } else {
            self.unpark_successor(node);
        }

        node.next.store(None);
    }

    /// The shared-mode release: signal the successor and make sure propagation continues.
    ///
    /// A head which is [SIGNAL] has a parked successor; reset it and unpark.  A head which is [INITIAL] gets
    /// [PROPAGATE], so a shared acquirer which is about to become head knows that a release happened and keeps the
    /// cascade going.  Loops while the head changes underneath, since new heads may need the same treatment.
    pub(crate) fn release_shared(&self) {
        loop {
            let h = self.head.load_full();
            if let Some(head) = &h {
                if !self.is_tail(head) {
                    let ws = head.status();
                    if ws == SIGNAL {
                        if !head.cas_status(SIGNAL, INITIAL) {
                            continue;
                        }
                        self.unpark_successor(head);
                    } else if ws == INITIAL && !head.cas_status(INITIAL, PROPAGATE) {
                        continue;
                    }
                }
            }

            if same(&h, &self.head.load_full()) {
                break;
            }
        }
    }

    /// Make `node` the head after a successful shared acquire, and wake the next node if it may be able to acquire too.
    ///
    /// This is deliberately conservative: it propagates if the hook said so, or if either the old or new head shows a
    /// pending signal or propagation.  That can wake threads which then fail and park again, but tightening it risks
    /// missing a release that raced with this acquisition.
    pub(crate) fn set_head_and_propagate(&self, node: &NodeRef, propagate: bool) {
        let old_head = self.head.load_full();
        self.set_head(node);

        let should_propagate = propagate
            || old_head.map_or(true, |h| h.status() < 0)
            || self.head.load_full().map_or(true, |h| h.status() < 0);

        if should_propagate {
            match node.next.load_full() {
                None => self.release_shared(),
                Some(s) if s.is_shared() => self.release_shared(),
                Some(_) => {}
            }
        }
    }

    /// Is `node`, which started on a condition queue, now on the sync queue?
    pub(crate) fn is_on_sync_queue(&self, node: &NodeRef) -> bool {
        if node.status() == CONDITION || node.prev.load().is_none() {
            return false;
        }

        // Only queued nodes have successors.
        if node.next.load().is_some() {
            return true;
        }

        // `prev` is set before the tail CAS, which can fail, so a set `prev` isn't proof either.
        self.find_node_from_tail(node)
    }

    fn find_node_from_tail(&self, node: &NodeRef) -> bool {
        let mut cursor = self.tail.load_full();
        while let Some(t) = cursor {
            if Arc::ptr_eq(&t, node) {
                return true;
            }
            cursor = t.prev.load_full();
        }
        false
    }

    /// Move a node from a condition queue to this queue because it was signalled.
    ///
    /// Returns false if the node was cancelled first, in which case the signal should go to another node.
    pub(crate) fn transfer_for_signal(&self, node: &NodeRef) -> bool {
        if !node.cas_status(CONDITION, INITIAL) {
            return false;
        }

        // Ask the predecessor to signal.  If it is cancelled or won't take the request, wake the thread now so it can
        // resynchronize; a spurious wakeup here is harmless.
        let pred = self.enqueue(node);
        let ws = pred.status();
        if ws > 0 || !pred.cas_status(ws, SIGNAL) {
            node.unpark();
        }

        true
    }

    /// Move a node from a condition queue to this queue because its wait was cancelled or timed out.
    ///
    /// Returns true if this happened before any signal, false if a signal won the race.  In the latter case, waits until
    /// the signaller has finished enqueuing the node, since the caller is about to reacquire through this queue.
    pub(crate) fn transfer_after_cancelled_wait(&self, node: &NodeRef) -> bool {
        if node.cas_status(CONDITION, INITIAL) {
            self.enqueue(node);
            return true;
        }

        let backoff = Backoff::new();
        while !self.is_on_sync_queue(node) {
            backoff.snooze();
        }
        false
    }

    /// Iterate from the tail towards the head, following `prev`.
    fn iter_from_tail(&self) -> impl Iterator<Item = NodeRef> {
        std::iter::successors(self.tail.load_full(), |n| n.prev.load_full())
    }

    /// Are any threads queued, or in the middle of queueing?
    pub(crate) fn has_queued_threads(&self) -> bool {
        !same(&self.head.load_full(), &self.tail.load_full())
    }

    /// Has any thread ever had to queue?
    pub(crate) fn has_contended(&self) -> bool {
        self.head.load().is_some()
    }

    /// The thread which has been queued longest, if any.
    pub(crate) fn first_queued_thread(&self) -> Option<Thread> {
        if !self.has_queued_threads() {
            return None;
        }

        // Fast path: the head's successor, if its links are settled.  Tried twice, since the head may move between
        // reading it and reading its successor.
        for _ in 0..2 {
            let Some(h) = self.head.load_full() else {
                break;
            };
            let Some(s) = h.next.load_full() else {
                continue;
            };
            if !same(&s.prev.load_full(), &self.head.load_full()) {
                continue;
            }
            if let Some(t) = s.thread() {
                return Some((*t).clone());
            }
        }

        // The head's successor was cancelled or is mid-update, or the fast path lost a race.  Fall back to walking from
        // the tail and keeping the earliest thread seen.
        let head = self.head.load_full();
        let mut first = None;
        for node in self.iter_from_tail() {
            if same(&Some(node.clone()), &head) {
                break;
            }
            if let Some(t) = node.thread() {
                first = Some((*t).clone());
            }
        }
        first
    }

    pub(crate) fn is_queued(&self, thread: &Thread) -> bool {
        self.iter_from_tail()
            .any(|n| n.thread().is_some_and(|t| t.id() == thread.id()))
    }

    /// Is there a thread which has been waiting longer than the calling thread?
    ///
    /// Fair synchronizers call this from `try_acquire` and fail if it returns true.  A false positive is possible if the
    /// queued thread is concurrently cancelling; a false negative is possible if another thread is concurrently
    /// enqueueing, which then means that thread arrived after the caller anyway.
    pub(crate) fn has_queued_predecessors(&self) -> bool {
        // Read the tail first: if the tail is set, the head is too.
        let t = self.tail.load_full();
        let h = self.head.load_full();
        if same(&h, &t) {
            return false;
        }

        match h.and_then(|h| h.next.load_full()) {
            None => true,
            Some(s) => !s.is_current_thread(),
        }
    }

    /// Is the first queued thread, if any, waiting in exclusive mode?
    pub(crate) fn apparently_first_queued_is_exclusive(&self) -> bool {
        self.head
            .load_full()
            .and_then(|h| h.next.load_full())
            .is_some_and(|s| !s.is_shared() && s.has_thread())
    }

    /// Estimated number of queued threads.
    pub(crate) fn length(&self) -> usize {
        self.iter_from_tail().filter(|n| n.has_thread()).count()
    }

    /// Threads currently queued, optionally only those in one mode, most recently queued first.
    pub(crate) fn threads(&self, mode: Option<Mode>) -> Vec<Thread> {
        self.iter_from_tail()
            .filter(|n| mode.map_or(true, |m| n.mode() == m))
            .filter_map(|n| n.thread())
            .map(|t| (*t).clone())
            .collect()
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        // Nobody can be waiting any more, since waiters borrow the synchronizer.  Break the neighbour cycles so that the
        // remaining nodes are freed.
        let mut cursor = self.tail.swap(None);
        while let Some(node) = cursor {
            node.next.store(None);
            cursor = node.prev.swap(None);
        }

        if let Some(h) = self.head.swap(None) {
            h.next.store(None);
        }
    }
}
