//! Commit-path benchmarks: single-record overwrite commits and
//! read-only verification against a null log device.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use pactum_bench::bench_engine;
use pactum_core::xct::manager::{array_overwrite, array_read};
use pactum_core::xct::xct::IsolationLevel;

fn bench_single_overwrite_commit(c: &mut Criterion) {
    let engine = bench_engine(1);
    let (_, storage) = engine.create_array_storage("bench", 64, 8).expect("create");
    let manager = Arc::clone(engine.xct_manager());
    let mut ctx = engine.attach_worker(0).expect("attach");

    c.bench_function("commit/single_overwrite", |b| {
        let array = storage.as_array().unwrap();
        let mut round = 0u64;
        b.iter(|| {
            manager.begin_xct(&mut ctx, IsolationLevel::Serializable).expect("begin");
            array_overwrite(&mut ctx, array, round % 64, 0, &round.to_le_bytes())
                .expect("write");
            round += 1;
            black_box(manager.precommit_xct(&mut ctx).expect("commit"))
        });
    });
    engine.shutdown().expect("shutdown");
}

fn bench_read_only_commit(c: &mut Criterion) {
    let engine = bench_engine(1);
    let (_, storage) = engine.create_array_storage("bench", 64, 8).expect("create");
    let manager = Arc::clone(engine.xct_manager());
    let mut ctx = engine.attach_worker(0).expect("attach");

    c.bench_function("commit/read_only_16_records", |b| {
        let array = storage.as_array().unwrap();
        let mut out = [0u8; 8];
        b.iter(|| {
            manager.begin_xct(&mut ctx, IsolationLevel::Serializable).expect("begin");
            for offset in 0..16 {
                array_read(&mut ctx, array, offset, &mut out).expect("read");
            }
            black_box(manager.precommit_xct(&mut ctx).expect("commit"))
        });
    });
    engine.shutdown().expect("shutdown");
}

criterion_group!(benches, bench_single_overwrite_commit, bench_read_only_commit);
criterion_main!(benches);
