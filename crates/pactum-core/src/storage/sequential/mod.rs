//! Sequential (append-only) storage.
//!
//! No keyed addressing: each append creates a fresh record envelope on
//! the appending worker's chain. Appends never conflict with each other,
//! which is why their write-set entries go through the lock-free path at
//! precommit.

pub mod log_types;

use parking_lot::Mutex;

use crate::error::{CoreResult, ErrorCode};
use crate::storage::record::{Record, RecordPtr};
use crate::storage::{StorageId, StorageKind, StorageMetadata};
use crate::xct::xct_id::{XctId, lock_marker};

/// A sequential storage: one append chain per worker.
#[derive(Debug)]
pub struct SequentialStorage {
    id: StorageId,
    meta: StorageMetadata,
    // Boxed records so addresses stay stable as a chain grows.
    chains: Box<[Mutex<Vec<Box<Record>>>]>,
}

impl SequentialStorage {
    #[must_use]
    pub fn new(id: StorageId, meta: StorageMetadata, worker_count: usize) -> Self {
        debug_assert_eq!(meta.kind, StorageKind::Sequential);
        let chains = (0..worker_count.max(1)).map(|_| Mutex::new(Vec::new())).collect();
        Self { id, meta, chains }
    }

    #[must_use]
    pub fn id(&self) -> StorageId {
        self.id
    }

    #[must_use]
    pub fn metadata(&self) -> &StorageMetadata {
        &self.meta
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.chains.len()
    }

    /// Append one record with the given payload and commit tag to the
    /// worker's chain. Returns the stable address of the new envelope.
    pub fn append(&self, worker_id: usize, payload: &[u8], tag: XctId) -> CoreResult<RecordPtr> {
        let chain = self.chains.get(worker_id).ok_or(ErrorCode::StorageNotFound)?;
        let record = Box::new(Record::new(payload.len()));
        // The envelope is still private; the lock/release pair publishes
        // payload and tag in the standard order.
        record.owner_id().lock_unconditional(lock_marker(worker_id as u32));
        record.write_payload(0, payload);
        record.owner_id().release(tag);

        let ptr = RecordPtr::new(&record);
        chain.lock().push(record);
        Ok(ptr)
    }

    /// Number of records on one worker's chain.
    pub fn count(&self, worker_id: usize) -> CoreResult<usize> {
        Ok(self
            .chains
            .get(worker_id)
            .ok_or(ErrorCode::StorageNotFound)?
            .lock()
            .len())
    }

    /// Visit every record on one worker's chain in append order.
    pub fn for_each(&self, worker_id: usize, mut f: impl FnMut(&Record)) -> CoreResult<()> {
        let chain = self.chains.get(worker_id).ok_or(ErrorCode::StorageNotFound)?;
        for record in chain.lock().iter() {
            f(record);
        }
        Ok(())
    }
}
