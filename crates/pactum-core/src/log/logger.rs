//! Per-worker logger: an SPSC byte ring between the worker's commit
//! path and a flusher thread.
//!
//! The producer (the commit coordinator running on the owning worker)
//! appends raw log-entry bytes and publishes them with a release-store
//! of the tail position. The flusher copies full ranges to the backing
//! file, fills end-of-buffer tail gaps with `Filler` records, and
//! advertises the largest fully-flushed epoch as this logger's durable
//! epoch. There is no cross-worker coordination on the hot path.
//!
//! An idle logger still has to let the durable epoch advance. The
//! in-commit epoch guard makes that safe: the coordinator publishes its
//! commit epoch before reading the global epoch and clears it after the
//! log handoff, so once the ring is drained the flusher may advance its
//! watermark to `min(grace, in_commit - 1)` knowing no entry with a
//! smaller epoch can still arrive.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::epoch::{Epoch, EpochInt};
use crate::epoch_manager::{DurableWatermark, EpochManager};
use crate::error::{CoreResult, ErrorCode};
use crate::log::types::{EPOCH_MARKER_LENGTH, populate_epoch_marker, populate_filler};
use crate::options::LogOptions;

/// Backing device of one logger.
enum LogDevice {
    /// Discard everything; durable advances with no I/O.
    Null,
    File(Mutex<File>),
}

/// One worker's logger.
pub struct Logger {
    worker_id: usize,
    capacity: u64,
    buf: Box<[AtomicU8]>,
    /// Byte position flushed so far (monotonic, not wrapped).
    head: AtomicU64,
    /// Byte position published so far (monotonic, not wrapped).
    tail: AtomicU64,
    /// `(end_position, epoch)` marks pushed by the producer after each
    /// commit handoff; the flusher pops marks whose end it has flushed.
    epoch_marks: Mutex<VecDeque<(u64, EpochInt)>>,
    /// Last epoch the producer logged; an epoch switch emits a marker.
    last_epoch: AtomicU32,
    /// Epoch of the commit currently between fence and handoff, 0 if
    /// none.
    in_commit_epoch: AtomicU32,
    watermark: DurableWatermark,
    device: LogDevice,
    epoch_manager: Arc<EpochManager>,
    stop: Mutex<bool>,
    wake: Condvar,
    flusher: Mutex<Option<JoinHandle<()>>>,
    io_failed: AtomicBool,
}

impl Logger {
    /// Build a logger for `worker_id`, registering its durable
    /// watermark with the epoch manager.
    pub fn new(
        worker_id: usize,
        options: &LogOptions,
        epoch_manager: Arc<EpochManager>,
    ) -> CoreResult<Self> {
        let capacity = (options.log_buffer_kb as u64) << 10;
        debug_assert!(capacity >= 64 && capacity % 8 == 0);
        let mut buf = Vec::new();
        buf.resize_with(capacity as usize, || AtomicU8::new(0));

        let device = if options.null_log_device {
            LogDevice::Null
        } else {
            let folder = Path::new(&options.log_folder);
            std::fs::create_dir_all(folder).map_err(|_| ErrorCode::LogIoError)?;
            let file = File::create(folder.join(format!("worker_{worker_id}.log")))
                .map_err(|_| ErrorCode::LogIoError)?;
            LogDevice::File(Mutex::new(file))
        };

        let watermark = epoch_manager.register_logger();
        Ok(Self {
            worker_id,
            capacity,
            buf: buf.into_boxed_slice(),
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
            epoch_marks: Mutex::new(VecDeque::new()),
            last_epoch: AtomicU32::new(Epoch::INVALID.value()),
            in_commit_epoch: AtomicU32::new(Epoch::INVALID.value()),
            watermark,
            device,
            epoch_manager,
            stop: Mutex::new(false),
            wake: Condvar::new(),
            flusher: Mutex::new(None),
            io_failed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// This logger's durable epoch.
    #[must_use]
    pub fn durable_epoch(&self) -> Epoch {
        Epoch::new(self.watermark.load(Ordering::Acquire))
    }

    /// Publish the epoch of an in-flight commit. Must happen before the
    /// commit reads the global epoch it will stamp.
    pub fn enter_commit(&self, epoch: Epoch) {
        self.in_commit_epoch.store(epoch.value(), Ordering::Release);
    }

    /// Clear the in-commit guard after the log handoff (or an abort).
    pub fn leave_commit(&self) {
        self.in_commit_epoch.store(Epoch::INVALID.value(), Ordering::Release);
    }

    /// Append one committed transaction's log entries, all stamped with
    /// `epoch`. Single producer: only the owning worker calls this.
    pub fn append_commit<'a>(
        &self,
        epoch: Epoch,
        entries: impl IntoIterator<Item = &'a [u8]>,
    ) -> CoreResult<()> {
        if self.io_failed.load(Ordering::Acquire) {
            return Err(ErrorCode::LogIoError);
        }
        let last = self.last_epoch.load(Ordering::Relaxed);
        if last != epoch.value() {
            let mut marker = [0u8; EPOCH_MARKER_LENGTH];
            populate_epoch_marker(&mut marker, Epoch::new(last), epoch);
            self.append_entry(&marker);
            self.last_epoch.store(epoch.value(), Ordering::Relaxed);
        }
        for entry in entries {
            debug_assert!(entry.len() % 8 == 0 && !entry.is_empty());
            self.append_entry(entry);
        }
        self.epoch_marks
            .lock()
            .push_back((self.tail.load(Ordering::Relaxed), epoch.value()));
        self.wake.notify_all();
        Ok(())
    }

    /// Copy one record into the ring, padding past the buffer end with
    /// a filler when the record would not fit contiguously.
    fn append_entry(&self, entry: &[u8]) {
        let len = entry.len() as u64;
        debug_assert!(len <= self.capacity, "log entry larger than the ring");
        let mut tail = self.tail.load(Ordering::Relaxed);

        let index = tail % self.capacity;
        if index + len > self.capacity {
            // Gap to the end of the buffer; cover it with one filler
            // (8-byte truncated form when the gap is exactly 8).
            let gap = (self.capacity - index) as usize;
            self.wait_for_space(tail, gap as u64);
            let mut filler = vec![0u8; gap];
            populate_filler(&mut filler);
            self.copy_into(index as usize, &filler);
            tail += gap as u64;
            self.tail.store(tail, Ordering::Release);
        }

        self.wait_for_space(tail, len);
        self.copy_into((tail % self.capacity) as usize, entry);
        self.tail.store(tail + len, Ordering::Release);
    }

    /// Spin until `[tail, tail + len)` no longer overlaps unflushed
    /// bytes.
    fn wait_for_space(&self, tail: u64, len: u64) {
        let mut spins = 0u32;
        while tail + len - self.head.load(Ordering::Acquire) > self.capacity {
            self.wake.notify_all();
            std::hint::spin_loop();
            spins = spins.wrapping_add(1);
            if spins % 64 == 0 {
                std::thread::yield_now();
            }
        }
    }

    fn copy_into(&self, index: usize, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            self.buf[index + i].store(byte, Ordering::Relaxed);
        }
    }

    /// Drain published bytes to the device and advance the durable
    /// watermark. Returns true when anything progressed.
    pub fn flush_once(&self) -> CoreResult<bool> {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Relaxed);
        let mut progressed = false;

        if tail > head {
            if let LogDevice::File(file) = &self.device {
                let mut out = vec![0u8; (tail - head) as usize];
                for (i, slot) in out.iter_mut().enumerate() {
                    *slot = self.buf[((head + i as u64) % self.capacity) as usize]
                        .load(Ordering::Relaxed);
                }
                let mut file = file.lock();
                if file.write_all(&out).and_then(|()| file.flush()).is_err() {
                    self.io_failed.store(true, Ordering::Release);
                    return Err(ErrorCode::LogIoError);
                }
            }
            self.head.store(tail, Ordering::Release);
            progressed = true;
        }

        // Largest epoch whose bytes are all flushed.
        let mut newest_flushed = Epoch::INVALID;
        {
            let mut marks = self.epoch_marks.lock();
            while let Some(&(end, epoch)) = marks.front() {
                if end <= tail {
                    newest_flushed = newest_flushed.max(Epoch::new(epoch));
                    marks.pop_front();
                } else {
                    break;
                }
            }
        }

        // Ring drained: nothing older than the in-commit guard can
        // still arrive, so idle epochs are durable up to the guard.
        if self.tail.load(Ordering::Acquire) == tail && tail == self.head.load(Ordering::Relaxed) {
            let mut safe = self.epoch_manager.grace_epoch();
            let guard = self.in_commit_epoch.load(Ordering::Acquire);
            if guard != Epoch::INVALID.value() {
                safe = safe.min(Epoch::new(guard).prev());
            }
            newest_flushed = newest_flushed.max(safe);
        }

        if newest_flushed > self.durable_epoch() {
            self.watermark.store(newest_flushed.value(), Ordering::Release);
            self.epoch_manager.refresh_durable();
            progressed = true;
        }
        Ok(progressed)
    }

    /// Spawn the flusher thread.
    pub fn start_flusher(self: &Arc<Self>) {
        let logger = Arc::clone(self);
        let mut slot = self.flusher.lock();
        debug_assert!(slot.is_none(), "flusher already running");
        *slot = Some(
            std::thread::Builder::new()
                .name(format!("pactum-flusher-{}", self.worker_id))
                .spawn(move || logger.flusher_loop())
                .expect("spawn log flusher"),
        );
    }

    fn flusher_loop(&self) {
        loop {
            {
                let mut stop = self.stop.lock();
                if *stop {
                    break;
                }
                self.wake.wait_for(&mut stop, Duration::from_millis(2));
            }
            if self.flush_once().is_err() {
                break;
            }
        }
        // Final drain so shutdown leaves nothing in the ring.
        let _ = self.flush_once();
    }

    /// Stop the flusher after a final drain. Surfaces any I/O failure
    /// the flusher hit. Idempotent.
    pub fn stop(&self) -> CoreResult<()> {
        {
            let mut stop = self.stop.lock();
            *stop = true;
            self.wake.notify_all();
        }
        if let Some(handle) = self.flusher.lock().take() {
            handle.join().expect("log flusher panicked");
        }
        if self.io_failed.load(Ordering::Acquire) {
            return Err(ErrorCode::LogIoError);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::types::{LogCode, peek_entry};
    use crate::options::XctOptions;
    use crate::storage::sequential::log_types as seq_log;

    fn null_logger(manager: &Arc<EpochManager>) -> Logger {
        let options = LogOptions {
            log_buffer_kb: 1,
            null_log_device: true,
            log_folder: String::new(),
        };
        Logger::new(0, &options, Arc::clone(manager)).expect("logger")
    }

    fn sample_entry(payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; seq_log::calculate_log_length(payload.len())];
        seq_log::populate(&mut buf, 1, payload);
        buf
    }

    #[test]
    fn append_emits_epoch_marker_then_entry() {
        let manager = Arc::new(EpochManager::new(&XctOptions::default()));
        let logger = null_logger(&manager);
        let entry = sample_entry(b"abc");
        logger.append_commit(Epoch::new(1), [entry.as_slice()]).expect("append");

        // Marker first, then the entry.
        let tail = logger.tail.load(Ordering::Acquire);
        assert_eq!(tail as usize, EPOCH_MARKER_LENGTH + entry.len());
        let mut raw = vec![0u8; tail as usize];
        for (i, slot) in raw.iter_mut().enumerate() {
            *slot = logger.buf[i].load(Ordering::Relaxed);
        }
        let (code, length) = peek_entry(&raw).expect("marker");
        assert_eq!(code, LogCode::EpochMarker);
        let (code2, _) = peek_entry(&raw[length..]).expect("entry");
        assert_eq!(code2, LogCode::SequentialAppend);
    }

    #[test]
    fn flush_advances_watermark_to_flushed_epoch() {
        let manager = Arc::new(EpochManager::new(&XctOptions::default()));
        let logger = null_logger(&manager);
        manager.advance(); // current = 2
        let entry = sample_entry(b"abc");
        logger.append_commit(Epoch::new(2), [entry.as_slice()]).expect("append");

        logger.flush_once().expect("flush");
        assert_eq!(logger.durable_epoch(), Epoch::new(2));
        assert_eq!(manager.durable_epoch(), Epoch::new(2));
    }

    #[test]
    fn idle_logger_tracks_grace_epoch() {
        let manager = Arc::new(EpochManager::new(&XctOptions::default()));
        let logger = null_logger(&manager);
        manager.advance();
        manager.advance(); // current = 3, grace = 2
        logger.flush_once().expect("flush");
        assert_eq!(logger.durable_epoch(), Epoch::new(2));
    }

    #[test]
    fn in_commit_guard_holds_durable_back() {
        let manager = Arc::new(EpochManager::new(&XctOptions::default()));
        let logger = null_logger(&manager);
        logger.enter_commit(Epoch::new(2));
        manager.advance();
        manager.advance(); // grace = 2, but a commit in epoch 2 is in flight
        logger.flush_once().expect("flush");
        assert_eq!(logger.durable_epoch(), Epoch::new(1));

        logger.leave_commit();
        logger.flush_once().expect("flush");
        assert_eq!(logger.durable_epoch(), Epoch::new(2));
    }

    #[test]
    fn ring_wraps_through_filler() {
        let manager = Arc::new(EpochManager::new(&XctOptions::default()));
        // 1 KiB ring; fill it with entries sized to leave an awkward
        // tail gap, forcing wrap fillers.
        let logger = Arc::new(null_logger(&manager));
        logger.start_flusher();
        let entry = sample_entry(&[7u8; 100]); // 120 bytes each
        for i in 0..64 {
            logger
                .append_commit(Epoch::new(1 + (i / 8)), [entry.as_slice()])
                .expect("append");
        }
        logger.stop().expect("stop");
        assert!(logger.durable_epoch() >= Epoch::new(7));
    }

    #[test]
    fn file_device_writes_parseable_stream() {
        let dir = std::env::temp_dir().join(format!("pactum_log_test_{}", std::process::id()));
        let options = LogOptions {
            log_buffer_kb: 1,
            null_log_device: false,
            log_folder: dir.to_string_lossy().into_owned(),
        };
        let manager = Arc::new(EpochManager::new(&XctOptions::default()));
        let logger = Logger::new(3, &options, Arc::clone(&manager)).expect("logger");

        let entry = sample_entry(b"persist-me");
        logger.append_commit(Epoch::new(1), [entry.as_slice()]).expect("append");
        logger.flush_once().expect("flush");
        logger.stop().expect("stop");

        let bytes = std::fs::read(dir.join("worker_3.log")).expect("log file");
        assert_eq!(bytes.len() % 8, 0);
        let (code, length) = peek_entry(&bytes).expect("first record");
        assert_eq!(code, LogCode::EpochMarker);
        let (code2, _) = peek_entry(&bytes[length..]).expect("second record");
        assert_eq!(code2, LogCode::SequentialAppend);
        std::fs::remove_dir_all(&dir).ok();
    }
}
