//! Which thread holds a synchronizer exclusively.
//!
//! Exclusive synchronizers usually want to remember their owner: reentrant locks compare against it to allow nested
//! acquisition, and releases check it to reject threads which never acquired.  `std::thread::ThreadId` cannot be stored
//! in an atomic on stable Rust, so this module hands out its own ids:
//!
//! - Ids come from a global counter read once per thread, so getting the current id is a thread-local read.
//! - Ids start at 1 and are never reused (save after `u64::MAX` threads), leaving 0 free to mean "no owner".
//! - With `--cfg loom`, the counter and thread-local are loom's, so each model execution sees fresh ids.
use std::num::NonZeroU64;

use crate::sync::{AtomicU64, Ordering};

/// Identity of a thread, small enough to keep in an atomic.
///
/// Don't expose these outside the process or across versions of this crate; they are only meaningful relative to each
/// other.
#[derive(Copy, Clone, Eq, Ord, PartialEq, PartialOrd, Debug, Hash)]
pub struct OwnerId(NonZeroU64);

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OwnerId {
    #[inline]
    pub fn current() -> OwnerId {
        #[cfg(not(loom))]
        static NEXT: AtomicU64 = AtomicU64::new(1);

        #[cfg(loom)]
        loom::lazy_static! {
            static ref NEXT: AtomicU64 = AtomicU64::new(1);
        }

        #[cfg(loom)]
        loom::thread_local! {
            static LOCAL_ID: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
        };

        #[cfg(not(loom))]
        std::thread_local! {
            static LOCAL_ID: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
        };

        LOCAL_ID.with(|x| OwnerId(NonZeroU64::new(*x).expect("Thread ids start at 1")))
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }

    fn from_raw(raw: u64) -> Option<OwnerId> {
        NonZeroU64::new(raw).map(OwnerId)
    }
}

/// The exclusive owner of a synchronizer, if any.
///
/// Reads and writes are relaxed.  A synchronizer sets its owner only after winning the state and clears it before giving
/// the state back, so the state cell's ordering carries the owner along with it.  A thread which reads its own id here
/// is therefore always right about being the owner; other threads only get a snapshot.
#[derive(Debug)]
pub struct OwnerCell {
    /// 0 is no owner.
    inner: AtomicU64,
}

impl OwnerCell {
    pub fn new() -> OwnerCell {
        OwnerCell {
            inner: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> Option<OwnerId> {
        OwnerId::from_raw(self.inner.load(Ordering::Relaxed))
    }

    pub fn set(&self, owner: Option<OwnerId>) {
        self.inner
            .store(owner.map(|o| o.as_u64()).unwrap_or(0), Ordering::Relaxed);
    }

    /// Record the calling thread as the owner.
    pub fn set_current(&self) {
        self.set(Some(OwnerId::current()));
    }

    pub fn clear(&self) {
        self.set(None);
    }

    /// Is the calling thread the owner?
    pub fn is_current(&self) -> bool {
        self.get() == Some(OwnerId::current())
    }
}

impl Default for OwnerCell {
    fn default() -> Self {
        OwnerCell::new()
    }
}
