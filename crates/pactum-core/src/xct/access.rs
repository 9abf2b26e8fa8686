//! Read-set and write-set entry types.
//!
//! A transaction's read set captures `(record, observed tag)` pairs; the
//! write set additionally references the prepared log entry in the
//! transaction's local arena by `(offset, length)`. Lock-free write
//! entries (sequential appends) have no target record yet, only the
//! destination storage.

use crate::storage::StorageId;
use crate::storage::record::RecordPtr;
use crate::xct::xct_id::XctId;

/// One observed read: the record and the tag it carried at read time.
#[derive(Debug, Clone, Copy)]
pub struct ReadAccess {
    pub record: RecordPtr,
    pub observed: XctId,
}

/// One prepared write: the target record, the tag observed when the
/// write was issued, and the formatted log entry in the local arena.
#[derive(Debug, Clone, Copy)]
pub struct WriteAccess {
    pub record: RecordPtr,
    pub observed: XctId,
    pub log_offset: usize,
    pub log_length: usize,
    /// What the operation does to the record's status flags at publish
    /// time.
    pub kind: WriteKind,
}

/// Status-flag effect of a write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Valid, not deleted.
    Insert,
    /// Valid, deleted.
    Delete,
    /// Valid; preserves the observed deleted flag.
    Overwrite,
}

/// One prepared lock-free write (append-only; takes no record lock).
#[derive(Debug, Clone, Copy)]
pub struct LockFreeWriteAccess {
    pub storage_id: StorageId,
    pub log_offset: usize,
    pub log_length: usize,
}
