use crossbeam::utils::CachePadded;

use crate::node::Mode;
use crate::owner::{OwnerCell, OwnerId};
use crate::queue::SyncQueue;
use crate::state::StateCell;
use crate::sync::Thread;
use crate::unique_id::SyncId;

/// Everything a synchronizer's hooks are allowed to see: its state, its owner, and read-only views of its wait queue.
///
/// This is handed to every [crate::Synchronizer] hook, and is also reachable from [crate::QueuedSync] by deref for
/// code that wants to inspect a synchronizer from outside.
///
/// The queue views are snapshots.  Threads may enqueue, cancel, or acquire while they are being computed, so they are for
/// monitoring and for heuristics such as fairness, not for making decisions that need to be exact.
pub struct SyncCore {
    id: SyncId,

    state: CachePadded<StateCell>,

    owner: OwnerCell,

    pub(crate) queue: SyncQueue,
}

impl SyncCore {
    pub(crate) fn new(initial: i64) -> SyncCore {
        SyncCore {
            id: SyncId::new(),
            state: CachePadded::new(StateCell::new(initial)),
            owner: OwnerCell::new(),
            queue: SyncQueue::new(),
        }
    }

    pub(crate) fn id(&self) -> SyncId {
        self.id
    }

    pub fn state(&self) -> &StateCell {
        &self.state
    }

    pub fn get_state(&self) -> i64 {
        self.state.get()
    }

    pub fn set_state(&self, value: i64) {
        self.state.set(value)
    }

    pub fn compare_and_set_state(&self, expect: i64, update: i64) -> bool {
        self.state.compare_and_set(expect, update)
    }

    /// The cell in which exclusive synchronizers record their owner.  The framework never reads or writes it.
    pub fn owner(&self) -> &OwnerCell {
        &self.owner
    }

    pub fn exclusive_owner(&self) -> Option<OwnerId> {
        self.owner.get()
    }

    /// Has any thread been waiting longer than the calling thread?
    ///
    /// A fair synchronizer's `try_acquire` should fail when this is true, unless the acquisition is reentrant.
    pub fn has_queued_predecessors(&self) -> bool {
        self.queue.has_queued_predecessors()
    }

    /// Is the first queued thread waiting in exclusive mode?
    ///
    /// Shared acquirers of reader/writer synchronizers can check this to avoid starving a waiting writer.
    pub fn apparently_first_queued_is_exclusive(&self) -> bool {
        self.queue.apparently_first_queued_is_exclusive()
    }

    pub fn has_queued_threads(&self) -> bool {
        self.queue.has_queued_threads()
    }

    /// Has any thread ever had to wait?
    pub fn has_contended(&self) -> bool {
        self.queue.has_contended()
    }

    /// The thread which has been waiting the longest.
    pub fn first_queued_thread(&self) -> Option<Thread> {
        self.queue.first_queued_thread()
    }

    pub fn is_queued(&self, thread: &Thread) -> bool {
        self.queue.is_queued(thread)
    }

    pub fn queue_length(&self) -> usize {
        self.queue.length()
    }

    /// Threads waiting in either mode, most recently queued first.
    pub fn queued_threads(&self) -> Vec<Thread> {
        self.queue.threads(None)
    }

    pub fn exclusive_queued_threads(&self) -> Vec<Thread> {
        self.queue.threads(Some(Mode::Exclusive))
    }

    pub fn shared_queued_threads(&self) -> Vec<Thread> {
        self.queue.threads(Some(Mode::Shared))
    }
}

impl std::fmt::Display for SyncCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = if self.has_queued_threads() {
            "nonempty"
        } else {
            "empty"
        };
        write!(f, "[State = {}, {} queue]", self.get_state(), queue)
    }
}

impl std::fmt::Debug for SyncCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCore")
            .field("state", &self.get_state())
            .field("owner", &self.exclusive_owner())
            .field("queue_length", &self.queue_length())
            .finish()
    }
}
