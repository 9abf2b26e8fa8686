//! Lock-word microbenchmarks: uncontended CAS, lock/release cycles,
//! and predicate snapshots.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use pactum_core::epoch::Epoch;
use pactum_core::xct::xct_id::{AtomicXctId, XctId, lock_marker};

fn bench_try_lock_release(c: &mut Criterion) {
    let word = AtomicXctId::default();
    let marker = lock_marker(0);
    c.bench_function("xct_id/try_lock_release", |b| {
        b.iter(|| {
            assert!(word.try_lock(black_box(marker)));
            word.release(XctId::default());
        });
    });
}

fn bench_lock_unconditional(c: &mut Criterion) {
    let word = AtomicXctId::default();
    let marker = lock_marker(1);
    c.bench_function("xct_id/lock_unconditional_uncontended", |b| {
        b.iter(|| {
            word.lock_unconditional(black_box(marker));
            word.release(XctId::default());
        });
    });
}

fn bench_snapshot_predicates(c: &mut Criterion) {
    let mut id = XctId::default();
    id.set_epoch_ordinal(Epoch::new(42), 7);
    id.set_valid(true);
    let word = AtomicXctId::new(id);
    c.bench_function("xct_id/load_and_predicates", |b| {
        b.iter(|| {
            let snapshot = word.load_acquire();
            black_box(
                snapshot.is_valid() as u32
                    + snapshot.is_deleted() as u32
                    + snapshot.is_locked() as u32
                    + snapshot.ordinal(),
            )
        });
    });
}

criterion_group!(
    benches,
    bench_try_lock_release,
    bench_lock_unconditional,
    bench_snapshot_predicates
);
criterion_main!(benches);
