//! Benchmark helpers for the pactum transactional core.

use pactum_core::engine::Engine;
use pactum_core::options::{EngineOptions, LogOptions, ThreadOptions, XctOptions};

/// Engine tuned for throughput measurement: null log device, no
/// pinning, small epoch interval.
#[must_use]
pub fn bench_engine(worker_count: u16) -> Engine {
    Engine::initialize(EngineOptions {
        xct: XctOptions {
            epoch_advance_interval_ms: 10,
            ..XctOptions::default()
        },
        log: LogOptions {
            log_buffer_kb: 1024,
            null_log_device: true,
            log_folder: String::new(),
        },
        thread: ThreadOptions {
            worker_count,
            pin_workers: false,
        },
    })
    .expect("bench engine")
}
