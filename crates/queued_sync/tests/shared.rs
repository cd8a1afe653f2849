mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use queued_sync::CancelToken;

use common::*;

#[test]
fn capacity_bounds_concurrent_holders() {
    const CAPACITY: i64 = 3;
    const THREADS: usize = 8;
    const ITERATIONS: usize = 500;

    let sync = permits(CAPACITY);
    let inside = AtomicUsize::new(0);
    let most = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ITERATIONS {
                    sync.acquire_shared(1).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    most.fetch_max(now, Ordering::SeqCst);
                    inside.fetch_sub(1, Ordering::SeqCst);
                    sync.release_shared(1).unwrap();
                }
            });
        }
    });

    assert!(most.load(Ordering::SeqCst) <= CAPACITY as usize);
    assert_eq!(sync.get_state(), CAPACITY);
    assert_eq!(sync.queue_length(), 0);
}

#[test]
fn holders_up_to_capacity_do_not_queue() {
    let sync = Arc::new(permits(2));

    std::thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| sync.acquire_shared(1).unwrap());
        }
    });

    assert_eq!(sync.get_state(), 0);
    assert!(!sync.has_contended());
}

/// T1 and T2 take both permits, T3 blocks, and T1's release must let T3 through while T2 still holds.
#[test]
fn release_admits_the_next_shared_waiter() {
    let sync = Arc::new(permits(2));
    sync.acquire_shared(1).unwrap();

    let s2 = sync.clone();
    let (t2_release, t2_wait) = std::sync::mpsc::channel::<()>();
    let t2 = std::thread::spawn(move || {
        s2.acquire_shared(1).unwrap();
        t2_wait.recv().unwrap();
        s2.release_shared(1).unwrap();
    });

    while sync.get_state() != 0 {
        std::thread::yield_now();
    }

    let s3 = sync.clone();
    let t3 = std::thread::spawn(move || {
        s3.acquire_shared(1).unwrap();
        s3.release_shared(1).unwrap();
    });
    wait_until_queued(&sync, 1);
    assert_eq!(sync.shared_queued_threads().len(), 1);
    assert!(sync.exclusive_queued_threads().is_empty());

    sync.release_shared(1).unwrap();
    t3.join().unwrap();
    assert!(!t2.is_finished());

    t2_release.send(()).unwrap();
    t2.join().unwrap();
    assert_eq!(sync.get_state(), 2);
}

#[test]
fn latch_release_wakes_every_waiter() {
    const WAITERS: usize = 6;

    let sync = Arc::new(latch(2));
    let passed = Arc::new(AtomicUsize::new(0));

    let waiters = (0..WAITERS)
        .map(|_| {
            let sync = sync.clone();
            let passed = passed.clone();
            std::thread::spawn(move || {
                sync.acquire_shared(1).unwrap();
                passed.fetch_add(1, Ordering::Relaxed);
            })
        })
        .collect::<Vec<_>>();

    wait_until_queued(&sync, WAITERS);
    assert!(!sync.release_shared(1).unwrap());
    settle();
    assert_eq!(passed.load(Ordering::Relaxed), 0);

    assert!(sync.release_shared(1).unwrap());
    for w in waiters {
        w.join().unwrap();
    }
    assert_eq!(passed.load(Ordering::Relaxed), WAITERS);
    assert_eq!(sync.queue_length(), 0);

    // Open for good.
    sync.acquire_shared(1).unwrap();
    assert!(!sync.release_shared(1).unwrap());
}

#[test]
fn timed_shared_acquire() {
    let sync = Arc::new(latch(1));
    let token = CancelToken::new();

    assert!(!sync
        .try_acquire_shared_timeout(1, Duration::from_millis(20), &token)
        .unwrap());
    assert_eq!(sync.queue_length(), 0);

    let s2 = sync.clone();
    let waiter = std::thread::spawn(move || {
        let token = CancelToken::new();
        s2.try_acquire_shared_timeout(1, Duration::from_secs(30), &token)
            .unwrap()
    });
    wait_until_queued(&sync, 1);
    sync.release_shared(1).unwrap();
    assert!(waiter.join().unwrap());
}

#[test]
fn cancelled_shared_waiters_leave_the_others_queued() {
    let sync = Arc::new(latch(1));

    let tokens = (0..4).map(|_| CancelToken::new()).collect::<Vec<_>>();
    let waiters = tokens
        .iter()
        .cloned()
        .map(|token| {
            let sync = sync.clone();
            std::thread::spawn(move || sync.acquire_shared_interruptibly(1, &token))
        })
        .collect::<Vec<_>>();
    wait_until_queued(&sync, 4);

    tokens[1].cancel();
    tokens[2].cancel();
    wait_until_cancelled(&sync, 2);

    sync.release_shared(1).unwrap();

    let results = waiters
        .into_iter()
        .map(|w| w.join().unwrap().map_err(|e| e.is_interrupted()))
        .collect::<Vec<_>>();
    assert_eq!(results, vec![Ok(()), Err(true), Err(true), Ok(())]);
    assert_eq!(sync.queue_length(), 0);
}

/// Wait for the queue to shrink to `remaining` threads.
fn wait_until_cancelled(sync: &queued_sync::SyncCore, remaining: usize) {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while sync.queue_length() > remaining {
        assert!(std::time::Instant::now() < deadline);
        std::thread::yield_now();
    }
}

#[test]
fn uninterruptible_shared_acquire_restores_cancellation() {
    let sync = Arc::new(latch(1));
    let token = CancelToken::new();

    let s2 = sync.clone();
    let t2 = token.clone();
    let waiter = std::thread::spawn(move || {
        s2.acquire_shared_uninterruptibly(1, &t2).unwrap();
    });
    wait_until_queued(&sync, 1);

    token.cancel();
    settle();
    assert!(!waiter.is_finished());

    sync.release_shared(1).unwrap();
    waiter.join().unwrap();
    assert!(token.is_cancelled());
}

#[test]
fn exclusive_hooks_are_unsupported_on_shared_synchronizers() {
    let sync = permits(1);
    assert!(sync.acquire(1).unwrap_err().is_unsupported());
    assert!(sync.release(1).unwrap_err().is_unsupported());
    assert!(sync.is_held_exclusively().unwrap_err().is_unsupported());

    let cond = sync.new_condition();
    assert!(sync.has_waiters(&cond).unwrap_err().is_unsupported());
}

#[test]
fn permit_overflow_is_reported() {
    let sync = permits(i64::MAX);
    assert!(sync.release_shared(1).unwrap_err().is_overflow());
    assert_eq!(sync.get_state(), i64::MAX);
}
