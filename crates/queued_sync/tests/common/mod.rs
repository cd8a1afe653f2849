//! Synchronizers built on the framework, for the integration tests.
#![allow(dead_code)]

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use queued_sync::{Error, QueuedSync, Result, SharedAcquire, SyncCore, Synchronizer};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Spin until `n` threads are queued on `sync`.  Queue length is a snapshot, so this only proves that the threads got
/// that far, not that they are parked.
pub fn wait_until_queued(sync: &SyncCore, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while sync.queue_length() < n {
        assert!(
            Instant::now() < deadline,
            "Timed out waiting for {n} queued threads: {sync}"
        );
        std::thread::yield_now();
    }
}

/// Spin until the thread behind `handle` is queued on `sync`, or has already finished.
pub fn wait_until_thread_queued<T>(sync: &SyncCore, handle: &JoinHandle<T>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !sync.is_queued(handle.thread()) && !handle.is_finished() {
        assert!(
            Instant::now() < deadline,
            "Timed out waiting for {:?} to queue: {sync}",
            handle.thread().id()
        );
        std::thread::yield_now();
    }
}

/// Give threads which are about to park a moment to do so.
pub fn settle() {
    std::thread::sleep(Duration::from_millis(20));
}

/// A non-reentrant lock: 0 is free, 1 is held.
#[derive(Debug, Default)]
pub struct Mutex;

impl Synchronizer for Mutex {
    fn try_acquire(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        assert_eq!(arg, 1);
        if core.compare_and_set_state(0, 1) {
            core.owner().set_current();
            return Ok(true);
        }
        Ok(false)
    }

    fn try_release(&self, core: &SyncCore, _arg: i64) -> Result<bool> {
        if !core.owner().is_current() {
            return Err(Error::illegal_monitor_state("mutex not held"));
        }
        core.owner().clear();
        core.set_state(0);
        Ok(true)
    }

    fn is_held_exclusively(&self, core: &SyncCore) -> Result<bool> {
        Ok(core.owner().is_current())
    }
}

/// A mutex which never lets a thread acquire ahead of one that is already queued.
#[derive(Debug, Default)]
pub struct FairMutex;

impl Synchronizer for FairMutex {
    fn try_acquire(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        if core.has_queued_predecessors() {
            return Ok(false);
        }
        Mutex.try_acquire(core, arg)
    }

    fn try_release(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        Mutex.try_release(core, arg)
    }

    fn is_held_exclusively(&self, core: &SyncCore) -> Result<bool> {
        Mutex.is_held_exclusively(core)
    }
}

/// A reentrant lock whose state is the hold count.
#[derive(Debug)]
pub struct ReentrantMutex {
    pub max_holds: i64,
}

impl Synchronizer for ReentrantMutex {
    fn try_acquire(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        let holds = core.get_state();
        if holds == 0 {
            if core.compare_and_set_state(0, arg) {
                core.owner().set_current();
                return Ok(true);
            }
            return Ok(false);
        }

        if !core.owner().is_current() {
            return Ok(false);
        }

        match holds.checked_add(arg) {
            Some(next) if next <= self.max_holds => {
                core.set_state(next);
                Ok(true)
            }
            _ => Err(Error::overflow("maximum hold count exceeded")),
        }
    }

    fn try_release(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        if !core.owner().is_current() {
            return Err(Error::illegal_monitor_state("reentrant mutex not held"));
        }

        let next = core.get_state() - arg;
        if next == 0 {
            core.owner().clear();
        }
        core.set_state(next);
        Ok(next == 0)
    }

    fn is_held_exclusively(&self, core: &SyncCore) -> Result<bool> {
        Ok(core.owner().is_current())
    }
}

/// A counting semaphore whose state is the number of available permits.
#[derive(Debug, Default)]
pub struct Permits;

impl Synchronizer for Permits {
    fn try_acquire_shared(&self, core: &SyncCore, arg: i64) -> Result<SharedAcquire> {
        loop {
            let available = core.get_state();
            let remaining = available - arg;
            if remaining < 0 || core.compare_and_set_state(available, remaining) {
                return Ok(SharedAcquire::from_remaining(remaining));
            }
        }
    }

    fn try_release_shared(&self, core: &SyncCore, arg: i64) -> Result<bool> {
        loop {
            let current = core.get_state();
            let next = current
                .checked_add(arg)
                .ok_or_else(|| Error::overflow("permit count"))?;
            if core.compare_and_set_state(current, next) {
                return Ok(true);
            }
        }
    }
}

/// A one-shot latch whose state counts down to open.
#[derive(Debug, Default)]
pub struct Latch;

impl Synchronizer for Latch {
    fn try_acquire_shared(&self, core: &SyncCore, _arg: i64) -> Result<SharedAcquire> {
        Ok(if core.get_state() == 0 {
            SharedAcquire::Propagate
        } else {
            SharedAcquire::Failed
        })
    }

    fn try_release_shared(&self, core: &SyncCore, _arg: i64) -> Result<bool> {
        loop {
            let count = core.get_state();
            if count == 0 {
                return Ok(false);
            }
            if core.compare_and_set_state(count, count - 1) {
                return Ok(count == 1);
            }
        }
    }
}

pub fn mutex() -> QueuedSync<Mutex> {
    init_logging();
    QueuedSync::new(Mutex)
}

pub fn fair_mutex() -> QueuedSync<FairMutex> {
    init_logging();
    QueuedSync::new(FairMutex)
}

pub fn permits(count: i64) -> QueuedSync<Permits> {
    init_logging();
    QueuedSync::with_state(Permits, count)
}

pub fn latch(count: i64) -> QueuedSync<Latch> {
    init_logging();
    QueuedSync::with_state(Latch, count)
}
