//! A framework for building blocking synchronizers.
//!
//! Locks, semaphores, latches, barriers and the like all share the same hard part: a queue of threads waiting for some
//! condition on shared state, with the threads parked while they wait and woken, in order, when the state changes.  This
//! crate implements that part once.  A synchronizer supplies only its policy, as a [Synchronizer] implementation which
//! says when acquiring and releasing succeed in terms of one `i64` word of state.  Wrapping it in a [QueuedSync] gives it
//! blocking acquisition in exclusive and shared modes, timeouts, cancellation through [CancelToken], and [Condition]
//! variables.
//!
//! The wait queue is lock-free: threads join it with a CAS on the tail, leave it by cancelling themselves, and are
//! handed the synchronizer by the releasing thread unparking the first in line.  Nodes are reference counted, so
//! cancellation and concurrent traversal never touch freed memory.
//!
//! For example, a mutex:
//!
//! ```
//! use queued_sync::{QueuedSync, Result, SyncCore, Synchronizer};
//!
//! struct Mutex;
//!
//! impl Synchronizer for Mutex {
//!     fn try_acquire(&self, core: &SyncCore, _arg: i64) -> Result<bool> {
//!         if core.compare_and_set_state(0, 1) {
//!             core.owner().set_current();
//!             return Ok(true);
//!         }
//!         Ok(false)
//!     }
//!
//!     fn try_release(&self, core: &SyncCore, _arg: i64) -> Result<bool> {
//!         if !core.owner().is_current() {
//!             return Err(queued_sync::Error::illegal_monitor_state("not locked by this thread"));
//!         }
//!         core.owner().clear();
//!         core.set_state(0);
//!         Ok(true)
//!     }
//!
//!     fn is_held_exclusively(&self, core: &SyncCore) -> Result<bool> {
//!         Ok(core.owner().is_current())
//!     }
//! }
//!
//! let mutex = QueuedSync::new(Mutex);
//! mutex.acquire(1)?;
//! assert!(mutex.is_held_exclusively()?);
//! mutex.release(1)?;
//! # Ok::<(), queued_sync::Error>(())
//! ```
//!
//! Nothing here logs above the debug level.  Parking and unparking are logged at trace, and abandoned waits at debug,
//! through the `log` facade.

mod cancel;
mod condition;
pub mod config;
mod error;
mod hooks;
mod node;
mod owner;
mod park;
mod queue;
mod queued;
mod state;
mod sync;
mod sync_core;
mod unique_id;

pub use cancel::CancelToken;
pub use condition::Condition;
pub use error::{Error, Result};
pub use hooks::{SharedAcquire, Synchronizer};
pub use owner::{OwnerCell, OwnerId};
pub use queued::QueuedSync;
pub use state::StateCell;
pub use sync_core::SyncCore;
