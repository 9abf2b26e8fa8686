//! Engine lifecycle: wires the epoch manager, the storage catalog, the
//! per-worker loggers, and the commit coordinator together.
//!
//! Storage creation is engine-global: it registers the storage, emits a
//! `CreateStorage` log record, and advances the epoch so the creation
//! sits in its own epoch, never interleaved with operations on that
//! storage. Shutdown is the clean path only: the epoch ticker stops, a
//! final advance closes the last epoch, and every logger drains before
//! the engine reports the run durable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::epoch_manager::EpochManager;
use crate::error::{CoreResult, ErrorCode};
use crate::log::logger::Logger;
use crate::log::types::{create_storage_log_length, populate_create_storage, stamp_xct_id};
use crate::options::EngineOptions;
use crate::storage::{Storage, StorageId, StorageMetadata, StorageRegistry};
use crate::thread_ctx::{ThreadCtx, pin_current_thread};
use crate::xct::manager::XctManager;
use crate::xct::xct_id::XctId;

/// The running engine.
pub struct Engine {
    options: EngineOptions,
    epoch_manager: Arc<EpochManager>,
    registry: Arc<StorageRegistry>,
    xct_manager: Arc<XctManager>,
    loggers: Vec<Arc<Logger>>,
    stopped: AtomicBool,
}

impl Engine {
    /// Bring up loggers, flushers, and the epoch ticker.
    pub fn initialize(options: EngineOptions) -> CoreResult<Self> {
        let worker_count = options.thread.worker_count.max(1) as usize;
        let epoch_manager = Arc::new(EpochManager::new(&options.xct));
        let registry = Arc::new(StorageRegistry::new(worker_count));

        let mut loggers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let logger = Arc::new(Logger::new(
                worker_id,
                &options.log,
                Arc::clone(&epoch_manager),
            )?);
            logger.start_flusher();
            loggers.push(logger);
        }
        epoch_manager.start_ticker();

        let xct_manager = Arc::new(XctManager::new(
            Arc::clone(&epoch_manager),
            Arc::clone(&registry),
        ));
        Ok(Self {
            options,
            epoch_manager,
            registry,
            xct_manager,
            loggers,
            stopped: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    #[must_use]
    pub fn epoch_manager(&self) -> &Arc<EpochManager> {
        &self.epoch_manager
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<StorageRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn xct_manager(&self) -> &Arc<XctManager> {
        &self.xct_manager
    }

    /// Build the context for one worker thread, pinning the calling
    /// thread when configured. Each worker id must be attached at most
    /// once: the logger behind it is single-producer.
    pub fn attach_worker(&self, worker_id: usize) -> CoreResult<ThreadCtx> {
        let logger = self.loggers.get(worker_id).ok_or(ErrorCode::InvalidState)?;
        if self.options.thread.pin_workers {
            pin_current_thread(worker_id);
        }
        Ok(ThreadCtx::new(
            worker_id,
            &self.options.xct,
            Arc::clone(logger),
        ))
    }

    pub fn create_array_storage(
        &self,
        name: &str,
        capacity: u64,
        payload_size: u16,
    ) -> CoreResult<(StorageId, Arc<Storage>)> {
        self.create_storage(StorageMetadata::array(name, capacity, payload_size))
    }

    pub fn create_hash_storage(
        &self,
        name: &str,
        bin_count_log2: u16,
        payload_size: u16,
    ) -> CoreResult<(StorageId, Arc<Storage>)> {
        self.create_storage(StorageMetadata::hash(name, bin_count_log2, payload_size))
    }

    pub fn create_sequential_storage(&self, name: &str) -> CoreResult<(StorageId, Arc<Storage>)> {
        self.create_storage(StorageMetadata::sequential(name))
    }

    /// Register a storage, log its creation, and advance the epoch so
    /// the creation is isolated from the storage's own operations.
    ///
    /// Called from the control thread during setup; the creation record
    /// goes through worker 0's logger, so it must not race that
    /// worker's own commits.
    pub fn create_storage(&self, meta: StorageMetadata) -> CoreResult<(StorageId, Arc<Storage>)> {
        let (id, storage) = self.registry.register(meta.clone())?;

        let epoch = self.epoch_manager.current_epoch();
        let mut entry = vec![0u8; create_storage_log_length(meta.name.len())];
        populate_create_storage(&mut entry, id, &meta);
        let mut tag = XctId::default();
        tag.set_epoch_ordinal(epoch, 0);
        tag.set_valid(true);
        stamp_xct_id(&mut entry, tag);
        self.loggers[0].append_commit(epoch, [entry.as_slice()])?;

        self.epoch_manager.advance();
        Ok((id, storage))
    }

    /// Clean shutdown: stop the ticker (with a final advance), drain
    /// every logger, and wait until everything closed is durable.
    /// Callers must have quiesced their workers first. Idempotent.
    pub fn shutdown(&self) -> CoreResult<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.epoch_manager.stop();

        let mut result = Ok(());
        for logger in &self.loggers {
            if let Err(code) = logger.stop() {
                result = Err(code);
            }
        }
        if result.is_ok() {
            let grace = self.epoch_manager.grace_epoch();
            // The flushers' final drains have already advanced their
            // watermarks; fold them into the global durable epoch.
            for logger in &self.loggers {
                let _ = logger.flush_once();
            }
            self.epoch_manager.refresh_durable();
            debug_assert!(
                self.epoch_manager.durable_epoch() >= grace,
                "shutdown left epochs {} < {} undurable",
                self.epoch_manager.durable_epoch(),
                grace
            );
        }
        result
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
