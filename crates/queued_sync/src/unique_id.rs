use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// A process-wide unique identity for a synchronizer.
///
/// Conditions remember the id of the synchronizer which created them, and every condition operation checks it.  This is
/// not visible through loom; it never orders anything, it only has to be unique.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub(crate) struct SyncId(NonZeroU64);

impl SyncId {
    pub(crate) fn new() -> SyncId {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let got = COUNTER.fetch_add(1, Ordering::Relaxed);
        SyncId(NonZeroU64::new(got + 1).expect("u64 ids do not wrap in practice"))
    }
}
