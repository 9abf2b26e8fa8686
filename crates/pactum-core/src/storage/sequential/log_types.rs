//! Log record for sequential-storage appends.
//!
//! Layout after the 16-byte common header:
//!
//! ```text
//! offset 16 : u16 payload_count
//! offset 18 : payload bytes, zero-padded to align8
//! ```
//!
//! There is no keyed addressing; applying an append means creating a
//! fresh envelope on the appending worker's chain.

use crate::error::CoreResult;
use crate::log::types::{LogCode, align8, read_u16, write_header, write_u16};
use crate::storage::StorageId;
use crate::storage::record::RecordPtr;
use crate::storage::sequential::SequentialStorage;
use crate::xct::xct_id::XctId;

const DATA_AT: usize = 18;

/// Log length for an append of `payload_count` bytes.
#[must_use]
pub const fn calculate_log_length(payload_count: usize) -> usize {
    align8(DATA_AT + payload_count)
}

/// Encode a sequential append.
pub fn populate(buf: &mut [u8], storage_id: StorageId, payload: &[u8]) {
    let length = calculate_log_length(payload.len());
    buf.fill(0);
    write_header(buf, LogCode::SequentialAppend, length, storage_id);
    write_u16(buf, 16, payload.len() as u16);
    buf[DATA_AT..DATA_AT + payload.len()].copy_from_slice(payload);
}

/// Accessor over an encoded sequential append.
#[derive(Debug, Clone, Copy)]
pub struct SequentialAppendRef<'a>(pub &'a [u8]);

impl SequentialAppendRef<'_> {
    #[must_use]
    pub fn payload_count(&self) -> u16 {
        read_u16(self.0, 16)
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.0[DATA_AT..DATA_AT + self.payload_count() as usize]
    }

    /// Materialize the append on a worker's chain with the given commit
    /// tag. Used by both the live commit path and recovery.
    pub fn apply_to_storage(
        &self,
        storage: &SequentialStorage,
        worker_id: usize,
        tag: XctId,
    ) -> CoreResult<RecordPtr> {
        self.assert_valid();
        storage.append(worker_id, self.payload(), tag)
    }

    pub fn assert_valid(&self) {
        debug_assert_eq!(read_u16(self.0, 0), LogCode::SequentialAppend as u16);
        debug_assert_eq!(
            read_u16(self.0, 2) as usize,
            calculate_log_length(self.payload_count() as usize)
        );
    }
}
