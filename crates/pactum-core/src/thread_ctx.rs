//! Per-worker execution context.
//!
//! One context per OS worker thread: the transaction context, the
//! worker's logger handle, and the in-epoch ordinal counter that makes
//! commit tags dense per `(worker, epoch)`. Optionally pins the thread
//! to a core so a NUMA-aware deployment keeps workers next to their
//! memory.

use std::sync::Arc;

use crate::epoch::Epoch;
use crate::log::logger::Logger;
use crate::options::XctOptions;
use crate::xct::xct::Xct;
use crate::xct::xct_id::{MAX_ORDINAL, lock_marker};

/// One worker's context. Not shared: each worker thread owns its own.
pub struct ThreadCtx {
    worker_id: usize,
    xct: Xct,
    logger: Arc<Logger>,
    /// Epoch the ordinal counter is dense within.
    ordinal_epoch: Epoch,
    in_epoch_ordinal: u32,
}

impl std::fmt::Debug for ThreadCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadCtx")
            .field("worker_id", &self.worker_id)
            .field("ordinal_epoch", &self.ordinal_epoch)
            .field("in_epoch_ordinal", &self.in_epoch_ordinal)
            .finish_non_exhaustive()
    }
}

impl ThreadCtx {
    #[must_use]
    pub fn new(worker_id: usize, options: &XctOptions, logger: Arc<Logger>) -> Self {
        debug_assert_eq!(logger.worker_id(), worker_id);
        Self {
            worker_id,
            xct: Xct::new(options),
            logger,
            ordinal_epoch: Epoch::INVALID,
            in_epoch_ordinal: 0,
        }
    }

    #[must_use]
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// The lock-field marker this worker stamps into held tag locks.
    #[must_use]
    pub fn lock_marker(&self) -> u64 {
        lock_marker(self.worker_id as u32)
    }

    #[must_use]
    pub fn xct(&self) -> &Xct {
        &self.xct
    }

    #[must_use]
    pub fn xct_mut(&mut self) -> &mut Xct {
        &mut self.xct
    }

    #[must_use]
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Hand out the next in-epoch ordinal for a commit in
    /// `commit_epoch`. Dense per worker per epoch; resets when the
    /// epoch moves on.
    pub fn next_ordinal(&mut self, commit_epoch: Epoch) -> u32 {
        if self.ordinal_epoch != commit_epoch {
            self.ordinal_epoch = commit_epoch;
            self.in_epoch_ordinal = 0;
        }
        let ordinal = self.in_epoch_ordinal;
        debug_assert!(ordinal < MAX_ORDINAL, "in-epoch ordinal exhausted");
        self.in_epoch_ordinal += 1;
        ordinal
    }

    /// Pin the calling thread to a CPU. No-op off Linux.
    pub fn pin_to_cpu(&self, cpu: usize) {
        pin_current_thread(cpu);
    }
}

/// Pin the calling OS thread to `cpu` (modulo the cpuset size is the
/// caller's concern). Best-effort: failures are ignored, a worker that
/// floats is slower, not wrong.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(cpu: usize) {
    // SAFETY: CPU_ZERO/CPU_SET write only into the local cpu_set_t and
    // sched_setaffinity reads it; no memory is retained by the kernel.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu % libc::CPU_SETSIZE as usize, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(_cpu: usize) {}
