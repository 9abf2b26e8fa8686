//! Integration test: the version-tag lock word under thread contention.
//!
//! Run: cargo test -p pactum-core --test xct_id_lock_test

use std::sync::atomic::{AtomicBool, Ordering, fence};
use std::time::Duration;

use pactum_core::xct::xct_id::{AtomicXctId, XctId, lock_marker};

const THREADS: usize = 10;

fn keys(count: usize) -> Vec<AtomicXctId> {
    (0..count).map(|_| AtomicXctId::default()).collect()
}

fn sleep_enough() {
    std::thread::sleep(Duration::from_millis(30));
}

// ---------------------------------------------------------------------------
// 1. NoConflict: disjoint records, every lock succeeds immediately
// ---------------------------------------------------------------------------

#[test]
fn no_conflict() {
    let keys = keys(THREADS);
    for key in &keys {
        let id = key.load_acquire();
        assert!(!id.is_valid());
        assert!(!id.is_deleted());
        assert!(!id.is_locked());
        assert!(!id.is_latest());
        assert!(!id.is_rangelocked());
    }

    std::thread::scope(|scope| {
        for (i, key) in keys.iter().enumerate() {
            scope.spawn(move || key.lock_unconditional(lock_marker(i as u32)));
        }
    });

    fence(Ordering::Acquire);
    for key in &keys {
        let id = key.load_acquire();
        assert!(!id.is_valid());
        assert!(!id.is_deleted());
        assert!(id.is_locked());
        assert!(!id.is_latest());
        assert!(!id.is_rangelocked());
    }
    for key in &keys {
        key.release(XctId::default());
    }
    for key in &keys {
        assert_eq!(key.load_acquire().raw(), 0);
    }
}

// ---------------------------------------------------------------------------
// 2. Conflict: pairs of threads target the same record
// ---------------------------------------------------------------------------

#[test]
fn conflict() {
    let keys = keys(THREADS / 2);
    let done: Vec<AtomicBool> = (0..THREADS).map(|_| AtomicBool::new(false)).collect();

    std::thread::scope(|scope| {
        for i in 0..THREADS {
            let key = &keys[i / 2];
            let flag = &done[i];
            scope.spawn(move || {
                key.lock_unconditional(lock_marker(i as u32));
                flag.store(true, Ordering::Release);
            });
            // Stagger the spawns so the even-indexed thread of each pair
            // reliably wins the first acquisition.
            sleep_enough();
        }

        fence(Ordering::Acquire);
        for i in 0..THREADS {
            let id = keys[i / 2].load_acquire();
            assert!(!id.is_valid());
            assert!(!id.is_deleted());
            assert!(id.is_locked());
            assert!(!id.is_latest());
            assert!(!id.is_rangelocked());
            if i % 2 == 0 {
                assert!(done[i].load(Ordering::Acquire), "thread {i} should hold its lock");
            } else {
                assert!(!done[i].load(Ordering::Acquire), "thread {i} should still block");
            }
        }

        // First release unblocks the partner thread of each pair.
        for key in &keys {
            key.release(XctId::default());
        }
        sleep_enough();
        for i in 0..THREADS {
            assert!(keys[i / 2].load_acquire().is_locked());
            assert!(done[i].load(Ordering::Acquire), "thread {i} should have acquired by now");
        }
    });

    for key in &keys {
        key.release(XctId::default());
        assert_eq!(key.load_acquire().raw(), 0);
    }
}

// ---------------------------------------------------------------------------
// 3. try_lock never blocks and never double-acquires
// ---------------------------------------------------------------------------

#[test]
fn try_lock_is_exclusive() {
    let key = AtomicXctId::default();
    let winners: Vec<bool> = std::thread::scope(|scope| {
        let key = &key;
        let handles: Vec<_> = (0..THREADS)
            .map(|i| scope.spawn(move || key.try_lock(lock_marker(i as u32))))
            .collect();
        handles.into_iter().map(|h| h.join().expect("join")).collect()
    });

    let winner_count = winners.iter().filter(|&&won| won).count();
    assert_eq!(winner_count, 1, "exactly one try_lock may succeed");
    assert!(key.load_acquire().is_locked());
    key.release(XctId::default());
    assert_eq!(key.load_acquire().raw(), 0);
}
