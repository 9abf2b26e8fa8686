//! Log record for array-storage overwrites.
//!
//! Layout after the 16-byte common header:
//!
//! ```text
//! offset 16 : u64 array_offset      (the record's index)
//! offset 24 : u16 payload_offset    (byte offset within the record)
//! offset 26 : u16 payload_count
//! offset 28 : u32 reserved
//! offset 32 : payload bytes, zero-padded to align8
//! ```

use crate::log::types::{
    LOG_HEADER_SIZE, LogCode, align8, read_u16, read_u64, write_header, write_u16, write_u64,
};
use crate::storage::StorageId;
use crate::storage::array::ArrayOffset;
use crate::storage::record::Record;

const BODY_FIXED: usize = 16;
const DATA_AT: usize = LOG_HEADER_SIZE + BODY_FIXED;

/// Log length for an overwrite of `payload_count` bytes.
#[must_use]
pub const fn calculate_log_length(payload_count: usize) -> usize {
    align8(DATA_AT + payload_count)
}

/// Encode an array overwrite into caller-supplied space of exactly
/// [`calculate_log_length`] bytes.
pub fn populate(
    buf: &mut [u8],
    storage_id: StorageId,
    array_offset: ArrayOffset,
    payload_offset: u16,
    payload: &[u8],
) {
    let length = calculate_log_length(payload.len());
    buf.fill(0);
    write_header(buf, LogCode::ArrayOverwrite, length, storage_id);
    write_u64(buf, 16, array_offset);
    write_u16(buf, 24, payload_offset);
    write_u16(buf, 26, payload.len() as u16);
    buf[DATA_AT..DATA_AT + payload.len()].copy_from_slice(payload);
}

/// Accessor over an encoded array overwrite.
#[derive(Debug, Clone, Copy)]
pub struct ArrayOverwriteRef<'a>(pub &'a [u8]);

impl ArrayOverwriteRef<'_> {
    #[must_use]
    pub fn array_offset(&self) -> ArrayOffset {
        read_u64(self.0, 16)
    }

    #[must_use]
    pub fn payload_offset(&self) -> u16 {
        read_u16(self.0, 24)
    }

    #[must_use]
    pub fn payload_count(&self) -> u16 {
        read_u16(self.0, 26)
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.0[DATA_AT..DATA_AT + self.payload_count() as usize]
    }

    /// Overwrite the record's payload range. The caller holds the tag
    /// lock (live commit) or has exclusive ownership (recovery).
    pub fn apply_to_record(&self, record: &Record) {
        self.assert_valid();
        record.write_payload(self.payload_offset() as usize, self.payload());
    }

    pub fn assert_valid(&self) {
        debug_assert_eq!(read_u16(self.0, 0), LogCode::ArrayOverwrite as u16);
        debug_assert_eq!(
            read_u16(self.0, 2) as usize,
            calculate_log_length(self.payload_count() as usize)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xct::xct_id::lock_marker;

    #[test]
    fn length_is_aligned() {
        assert_eq!(calculate_log_length(0), 32);
        assert_eq!(calculate_log_length(1), 40);
        assert_eq!(calculate_log_length(8), 40);
        assert_eq!(calculate_log_length(9), 48);
    }

    #[test]
    fn populate_then_read_back() {
        let mut buf = vec![0xFFu8; calculate_log_length(5)];
        populate(&mut buf, 3, 42, 6, b"hello");

        let entry = ArrayOverwriteRef(&buf);
        entry.assert_valid();
        assert_eq!(entry.array_offset(), 42);
        assert_eq!(entry.payload_offset(), 6);
        assert_eq!(entry.payload_count(), 5);
        assert_eq!(entry.payload(), b"hello");
        // Padding bytes were zeroed, not left stale.
        assert!(buf[DATA_AT + 5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn apply_is_a_plain_overwrite_of_the_range() {
        let record = Record::new(16);
        record.owner_id().lock_unconditional(lock_marker(0));
        record.write_payload(0, &[0xEE; 16]);

        let mut buf = vec![0u8; calculate_log_length(4)];
        populate(&mut buf, 1, 0, 8, b"abcd");
        ArrayOverwriteRef(&buf).apply_to_record(&record);

        let mut out = [0u8; 16];
        record.read_payload(0, &mut out);
        assert_eq!(&out[..8], &[0xEE; 8]);
        assert_eq!(&out[8..12], b"abcd");
        assert_eq!(&out[12..], &[0xEE; 4]);
    }

    #[test]
    fn apply_twice_is_idempotent() {
        let record = Record::new(8);
        record.owner_id().lock_unconditional(lock_marker(0));

        let mut buf = vec![0u8; calculate_log_length(3)];
        populate(&mut buf, 1, 0, 0, b"xyz");
        let entry = ArrayOverwriteRef(&buf);
        entry.apply_to_record(&record);
        let once = record.snapshot_payload();
        entry.apply_to_record(&record);
        assert_eq!(record.snapshot_payload(), once);
    }
}
