//! Storage families and the record envelope.
//!
//! The core mutates three in-memory storage families: fixed-offset
//! array, two-bin hash, and per-worker sequential append. Each family
//! owns its record envelopes (stable addresses, never physically
//! removed) and defines the log record variants that capture its
//! mutations.

pub mod array;
pub mod hash;
pub mod record;
pub mod sequential;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, ErrorCode};
use crate::storage::array::ArrayStorage;
use crate::storage::hash::HashStorage;
use crate::storage::sequential::SequentialStorage;

/// Identifies one storage within the engine. `0` is reserved for
/// engine-global log records.
pub type StorageId = u32;

/// The three storage families the core mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    Array,
    Hash,
    Sequential,
}

impl StorageKind {
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::Array => 0,
            Self::Hash => 1,
            Self::Sequential => 2,
        }
    }

    pub fn from_u16(raw: u16) -> CoreResult<Self> {
        match raw {
            0 => Ok(Self::Array),
            1 => Ok(Self::Hash),
            2 => Ok(Self::Sequential),
            _ => Err(ErrorCode::StorageNotFound),
        }
    }
}

/// Creation-time description of a storage. Serialized as the body of a
/// `CreateStorage` log record, so the same block drives both live
/// creation and recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMetadata {
    pub name: String,
    pub kind: StorageKind,
    /// Array: number of records. Unused by other families.
    pub capacity: u64,
    /// Array: fixed payload bytes per record. Hash: maximum payload
    /// bytes per record (the envelope holds key + payload). Sequential:
    /// unused, each append sizes its own envelope.
    pub payload_size: u16,
    /// Hash: log2 of the bin count (power-of-two bins). Unused by other
    /// families.
    pub bin_count_log2: u16,
}

impl StorageMetadata {
    #[must_use]
    pub fn array(name: impl Into<String>, capacity: u64, payload_size: u16) -> Self {
        Self {
            name: name.into(),
            kind: StorageKind::Array,
            capacity,
            payload_size,
            bin_count_log2: 0,
        }
    }

    #[must_use]
    pub fn hash(name: impl Into<String>, bin_count_log2: u16, payload_size: u16) -> Self {
        Self {
            name: name.into(),
            kind: StorageKind::Hash,
            capacity: 0,
            payload_size,
            bin_count_log2,
        }
    }

    #[must_use]
    pub fn sequential(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StorageKind::Sequential,
            capacity: 0,
            payload_size: 0,
            bin_count_log2: 0,
        }
    }
}

/// One storage of any family.
#[derive(Debug)]
pub enum Storage {
    Array(ArrayStorage),
    Hash(HashStorage),
    Sequential(SequentialStorage),
}

impl Storage {
    #[must_use]
    pub fn id(&self) -> StorageId {
        match self {
            Self::Array(s) => s.id(),
            Self::Hash(s) => s.id(),
            Self::Sequential(s) => s.id(),
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &StorageMetadata {
        match self {
            Self::Array(s) => s.metadata(),
            Self::Hash(s) => s.metadata(),
            Self::Sequential(s) => s.metadata(),
        }
    }

    pub fn as_array(&self) -> CoreResult<&ArrayStorage> {
        match self {
            Self::Array(s) => Ok(s),
            _ => Err(ErrorCode::StorageNotFound),
        }
    }

    pub fn as_hash(&self) -> CoreResult<&HashStorage> {
        match self {
            Self::Hash(s) => Ok(s),
            _ => Err(ErrorCode::StorageNotFound),
        }
    }

    pub fn as_sequential(&self) -> CoreResult<&SequentialStorage> {
        match self {
            Self::Sequential(s) => Ok(s),
            _ => Err(ErrorCode::StorageNotFound),
        }
    }
}

/// The engine's storage catalog: id and name uniqueness, id assignment,
/// lookup. Registration is cold-path; lookups take a read lock only.
#[derive(Debug)]
pub struct StorageRegistry {
    by_id: RwLock<HashMap<StorageId, Arc<Storage>>>,
    by_name: RwLock<HashMap<String, StorageId>>,
    next_id: AtomicU32,
    worker_count: usize,
}

impl StorageRegistry {
    #[must_use]
    pub fn new(worker_count: usize) -> Self {
        Self {
            by_id: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            worker_count: worker_count.max(1),
        }
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Register a new storage under a fresh id.
    pub fn register(&self, meta: StorageMetadata) -> CoreResult<(StorageId, Arc<Storage>)> {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let storage = self.register_with_id(id, meta)?;
        Ok((id, storage))
    }

    /// Register a storage under an explicit id (recovery path).
    pub fn register_with_id(
        &self,
        id: StorageId,
        meta: StorageMetadata,
    ) -> CoreResult<Arc<Storage>> {
        debug_assert_ne!(id, 0, "storage id 0 is reserved for engine-global records");
        let mut by_name = self.by_name.write();
        let mut by_id = self.by_id.write();
        if by_id.contains_key(&id) || by_name.contains_key(&meta.name) {
            return Err(ErrorCode::StorageAlreadyExists);
        }
        let storage = Arc::new(match meta.kind {
            StorageKind::Array => Storage::Array(ArrayStorage::new(id, meta.clone())),
            StorageKind::Hash => Storage::Hash(HashStorage::new(id, meta.clone())),
            StorageKind::Sequential => {
                Storage::Sequential(SequentialStorage::new(id, meta.clone(), self.worker_count))
            }
        });
        by_name.insert(meta.name, id);
        by_id.insert(id, Arc::clone(&storage));
        // Keep fresh ids ahead of explicitly registered ones.
        self.next_id.fetch_max(id + 1, Ordering::AcqRel);
        Ok(storage)
    }

    pub fn get(&self, id: StorageId) -> CoreResult<Arc<Storage>> {
        self.by_id.read().get(&id).cloned().ok_or(ErrorCode::StorageNotFound)
    }

    pub fn get_by_name(&self, name: &str) -> CoreResult<Arc<Storage>> {
        let id = *self.by_name.read().get(name).ok_or(ErrorCode::StorageNotFound)?;
        self.get(id)
    }
}
