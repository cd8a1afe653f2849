//! Queue nodes: one per thread that is waiting on a synchronizer.
//!
//! Nodes are reference counted and linked through [ArcSwapOption], so any thread holding a node (a neighbour walking
//! the queue, the node's own thread, a signaller) keeps it alive, and it is freed once the last of those lets go.  This
//! is what makes it safe to CAS links while other threads are concurrently cancelling and unlinking.  The price is that
//! a prev/next pair between neighbours is a reference cycle; the queue breaks those as nodes leave it.
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::sync::{current, AtomicI32, Ordering, Thread};

/// Freshly created, or a head with no successor to signal.
pub(crate) const INITIAL: i32 = 0;

/// The node's thread gave up because of a timeout, a cancellation, or a hook error.  Never changes again.
pub(crate) const CANCELLED: i32 = 1;

/// The successor is (or is about to be) parked, so whoever releases this node must unpark it.
pub(crate) const SIGNAL: i32 = -1;

/// The node is on a condition queue rather than the sync queue.
pub(crate) const CONDITION: i32 = -2;

/// Only set on the head: a shared release happened while nobody needed a signal, so the next shared acquirer must keep
/// propagating.
pub(crate) const PROPAGATE: i32 = -3;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Mode {
    Exclusive,
    Shared,
}

pub(crate) type NodeRef = Arc<Node>;

pub(crate) struct Node {
    status: AtomicI32,

    pub(crate) prev: ArcSwapOption<Node>,

    /// May lag behind `prev`: a node is linked to its predecessor before the predecessor is linked forward to it.
    /// `None` therefore doesn't mean there is no successor, only that one has to be found from the tail.
    pub(crate) next: ArcSwapOption<Node>,

    /// The thread to unpark.  Cleared once the node becomes head or is cancelled, so that the queue doesn't keep the
    /// handle alive.
    thread: ArcSwapOption<Thread>,

    /// The next node on a condition queue.  Only touched while the synchronizer is held exclusively.
    pub(crate) next_waiter: ArcSwapOption<Node>,

    mode: Mode,
}

impl Node {
    /// The placeholder head installed when the queue is first used.
    pub(crate) fn dummy() -> NodeRef {
        Arc::new(Node {
            status: AtomicI32::new(INITIAL),
            prev: ArcSwapOption::empty(),
            next: ArcSwapOption::empty(),
            thread: ArcSwapOption::empty(),
            next_waiter: ArcSwapOption::empty(),
            mode: Mode::Exclusive,
        })
    }

    /// A node for the calling thread.
    pub(crate) fn for_current(mode: Mode, status: i32) -> NodeRef {
        Arc::new(Node {
            status: AtomicI32::new(status),
            prev: ArcSwapOption::empty(),
            next: ArcSwapOption::empty(),
            thread: ArcSwapOption::new(Some(Arc::new(current()))),
            next_waiter: ArcSwapOption::empty(),
            mode,
        })
    }

    #[inline(always)]
    pub(crate) fn status(&self) -> i32 {
        self.status.load(Ordering::SeqCst)
    }

    #[inline(always)]
    pub(crate) fn set_status(&self, status: i32) {
        self.status.store(status, Ordering::SeqCst)
    }

    #[inline(always)]
    pub(crate) fn cas_status(&self, expect: i32, update: i32) -> bool {
        self.status
            .compare_exchange(expect, update, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.status() > 0
    }

    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) fn is_shared(&self) -> bool {
        self.mode == Mode::Shared
    }

    pub(crate) fn thread(&self) -> Option<Arc<Thread>> {
        self.thread.load_full()
    }

    pub(crate) fn has_thread(&self) -> bool {
        self.thread.load().is_some()
    }

    pub(crate) fn clear_thread(&self) {
        self.thread.store(None);
    }

    /// Does this node belong to the calling thread?  False once the thread has been cleared.
    pub(crate) fn is_current_thread(&self) -> bool {
        self.thread().is_some_and(|t| t.id() == current().id())
    }

    pub(crate) fn unpark(&self) {
        if let Some(thread) = self.thread() {
            crate::park::unpark(&thread);
        }
    }

    /// The predecessor of a node which is on the sync queue and isn't the head.
    ///
    /// Such nodes always have one: `prev` is set before the node is published as the tail and is only cleared by the
    /// node's own thread when it becomes the head.
    pub(crate) fn predecessor(&self) -> NodeRef {
        self.prev
            .load_full()
            .expect("Queued nodes which are not the head always have a predecessor")
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("status", &self.status())
            .field("mode", &self.mode)
            .field("has_thread", &self.has_thread())
            .finish()
    }
}

/// Raw identity of an optional node, for pointer comparisons.
fn addr(node: &Option<NodeRef>) -> *const Node {
    node.as_ref().map_or(std::ptr::null(), Arc::as_ptr)
}

/// Are these the same node (or both absent)?
pub(crate) fn same(a: &Option<NodeRef>, b: &Option<NodeRef>) -> bool {
    std::ptr::eq(addr(a), addr(b))
}

/// CAS a link from `current` to `new`, comparing by identity.  Returns whether the swap happened.
pub(crate) fn cas_link(
    cell: &ArcSwapOption<Node>,
    current: &Option<NodeRef>,
    new: Option<NodeRef>,
) -> bool {
    let previous = cell.compare_and_swap(current, new);
    same(&previous, current)
}
