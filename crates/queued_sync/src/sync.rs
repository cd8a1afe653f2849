//! Indirection over `std` and `loom`.
//!
//! Everything in this crate which touches atomics, parking, or thread identity goes through here so that `--cfg loom`
//! can swap in loom's versions.  Queue links are the exception: they are `arc_swap` cells over `std::sync::Arc`, which
//! loom cannot see through, so tests of the queue itself only run without loom.
#[cfg(not(loom))]
mod not_loom {
    pub use std::sync::atomic::*;
    pub use std::thread::{current, park, park_timeout, Thread};

    #[cfg(test)]
    pub use std::sync::Arc;
    #[cfg(test)]
    pub use std::thread::{spawn, JoinHandle};

    #[cfg(test)]
    pub fn wrap_test(what: impl Fn() + Sync + Send + 'static) {
        what()
    }
}

#[cfg(not(loom))]
pub(crate) use not_loom::*;

#[cfg(loom)]
mod with_loom {
    pub use loom::sync::atomic::*;
    pub use loom::thread::{current, park, yield_now, Thread};

    #[cfg(test)]
    pub use loom::sync::Arc;
    #[cfg(test)]
    pub use loom::thread::{spawn, JoinHandle};

    /// Loom has no timed parking.  Parking is always allowed to return early, so yield instead.
    pub fn park_timeout(_timeout: std::time::Duration) {
        yield_now();
    }

    #[cfg(test)]
    pub fn wrap_test(what: impl Fn() + Sync + Send + 'static) {
        loom::model(what)
    }
}

#[cfg(loom)]
pub(crate) use with_loom::*;
