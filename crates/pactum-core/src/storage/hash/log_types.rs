//! Log records for hash-storage operations.
//!
//! Three variants, all carrying the key so recovery can re-derive the
//! bin, plus the placement coordinates the live path already resolved.
//!
//! Layouts after the 16-byte common header:
//!
//! ```text
//! HashInsert     16: u16 key_length  18: u16 payload_count
//!                20: u8 bin1  21: u8 reserved  22: u16 hashtag
//!                24: key[]  24+kl: payload[]          align8(24+kl+pc)
//! HashDelete     16: u16 key_length  18: u8 bin1  19: u8 slot
//!                20: key[]                            align8(20+kl)
//! HashOverwrite  16: u16 key_length  18: u16 payload_offset
//!                20: u16 payload_count  22: u8 bin1  23: u8 slot
//!                24: key[]  24+kl: payload[]          align8(24+kl+pc)
//! ```

use crate::log::types::{LogCode, align8, read_u16, write_header, write_u16};
use crate::storage::StorageId;
use crate::storage::hash::{HashCoord, PAYLOAD_AT, install_slot_key};
use crate::storage::record::Record;

// -- insert -----------------------------------------------------------------

/// Log length for an insert of `key_length` + `payload_count` bytes.
#[must_use]
pub const fn insert_log_length(key_length: usize, payload_count: usize) -> usize {
    align8(24 + key_length + payload_count)
}

/// Encode a hash insert. The insert carries the bin choice and hashtag
/// but no slot: placement within the bin is re-derived at apply time.
pub fn populate_insert(
    buf: &mut [u8],
    storage_id: StorageId,
    key: &[u8],
    coord: HashCoord,
    payload: &[u8],
) {
    let length = insert_log_length(key.len(), payload.len());
    buf.fill(0);
    write_header(buf, LogCode::HashInsert, length, storage_id);
    write_u16(buf, 16, key.len() as u16);
    write_u16(buf, 18, payload.len() as u16);
    buf[20] = coord.bin1 as u8;
    write_u16(buf, 22, coord.hashtag);
    buf[24..24 + key.len()].copy_from_slice(key);
    buf[24 + key.len()..24 + key.len() + payload.len()].copy_from_slice(payload);
}

/// Accessor over an encoded hash insert.
#[derive(Debug, Clone, Copy)]
pub struct HashInsertRef<'a>(pub &'a [u8]);

impl HashInsertRef<'_> {
    #[must_use]
    pub fn key_length(&self) -> u16 {
        read_u16(self.0, 16)
    }

    #[must_use]
    pub fn payload_count(&self) -> u16 {
        read_u16(self.0, 18)
    }

    #[must_use]
    pub fn bin1(&self) -> bool {
        self.0[20] != 0
    }

    #[must_use]
    pub fn hashtag(&self) -> u16 {
        read_u16(self.0, 22)
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.0[24..24 + self.key_length() as usize]
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        let start = 24 + self.key_length() as usize;
        &self.0[start..start + self.payload_count() as usize]
    }

    /// Install key and payload into the slot envelope. The new tag
    /// (valid, not deleted) is published by the caller.
    pub fn apply_to_record(&self, record: &Record) {
        self.assert_valid();
        install_slot_key(record, self.key());
        record.write_payload(PAYLOAD_AT, self.payload());
    }

    pub fn assert_valid(&self) {
        debug_assert_eq!(read_u16(self.0, 0), LogCode::HashInsert as u16);
        debug_assert_eq!(
            read_u16(self.0, 2) as usize,
            insert_log_length(self.key_length() as usize, self.payload_count() as usize)
        );
    }
}

// -- delete -----------------------------------------------------------------

/// Log length for a delete of a `key_length`-byte key.
#[must_use]
pub const fn delete_log_length(key_length: usize) -> usize {
    align8(20 + key_length)
}

/// Encode a hash delete. Nothing but the delete status bit changes, so
/// the record carries only the key and its coordinates.
pub fn populate_delete(buf: &mut [u8], storage_id: StorageId, key: &[u8], coord: HashCoord) {
    let length = delete_log_length(key.len());
    buf.fill(0);
    write_header(buf, LogCode::HashDelete, length, storage_id);
    write_u16(buf, 16, key.len() as u16);
    buf[18] = coord.bin1 as u8;
    buf[19] = coord.slot;
    buf[20..20 + key.len()].copy_from_slice(key);
}

/// Accessor over an encoded hash delete.
#[derive(Debug, Clone, Copy)]
pub struct HashDeleteRef<'a>(pub &'a [u8]);

impl HashDeleteRef<'_> {
    #[must_use]
    pub fn key_length(&self) -> u16 {
        read_u16(self.0, 16)
    }

    #[must_use]
    pub fn bin1(&self) -> bool {
        self.0[18] != 0
    }

    #[must_use]
    pub fn slot(&self) -> u8 {
        self.0[19]
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.0[20..20 + self.key_length() as usize]
    }

    /// A delete leaves the payload alone; the deleted status bit lives
    /// in the tag the caller publishes.
    pub fn apply_to_record(&self, _record: &Record) {
        self.assert_valid();
    }

    pub fn assert_valid(&self) {
        debug_assert_eq!(read_u16(self.0, 0), LogCode::HashDelete as u16);
        debug_assert_eq!(
            read_u16(self.0, 2) as usize,
            delete_log_length(self.key_length() as usize)
        );
    }
}

// -- overwrite --------------------------------------------------------------

/// Log length for an overwrite of `payload_count` bytes with a
/// `key_length`-byte key.
#[must_use]
pub const fn overwrite_log_length(key_length: usize, payload_count: usize) -> usize {
    align8(24 + key_length + payload_count)
}

/// Encode a hash overwrite of `[payload_offset, payload_offset +
/// payload_count)` within the slot's value region.
pub fn populate_overwrite(
    buf: &mut [u8],
    storage_id: StorageId,
    key: &[u8],
    coord: HashCoord,
    payload_offset: u16,
    payload: &[u8],
) {
    let length = overwrite_log_length(key.len(), payload.len());
    buf.fill(0);
    write_header(buf, LogCode::HashOverwrite, length, storage_id);
    write_u16(buf, 16, key.len() as u16);
    write_u16(buf, 18, payload_offset);
    write_u16(buf, 20, payload.len() as u16);
    buf[22] = coord.bin1 as u8;
    buf[23] = coord.slot;
    buf[24..24 + key.len()].copy_from_slice(key);
    buf[24 + key.len()..24 + key.len() + payload.len()].copy_from_slice(payload);
}

/// Accessor over an encoded hash overwrite.
#[derive(Debug, Clone, Copy)]
pub struct HashOverwriteRef<'a>(pub &'a [u8]);

impl HashOverwriteRef<'_> {
    #[must_use]
    pub fn key_length(&self) -> u16 {
        read_u16(self.0, 16)
    }

    #[must_use]
    pub fn payload_offset(&self) -> u16 {
        read_u16(self.0, 18)
    }

    #[must_use]
    pub fn payload_count(&self) -> u16 {
        read_u16(self.0, 20)
    }

    #[must_use]
    pub fn bin1(&self) -> bool {
        self.0[22] != 0
    }

    #[must_use]
    pub fn slot(&self) -> u8 {
        self.0[23]
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.0[24..24 + self.key_length() as usize]
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        let start = 24 + self.key_length() as usize;
        &self.0[start..start + self.payload_count() as usize]
    }

    /// Overwrite the slot's value region at the recorded offset.
    pub fn apply_to_record(&self, record: &Record) {
        self.assert_valid();
        record.write_payload(PAYLOAD_AT + self.payload_offset() as usize, self.payload());
    }

    pub fn assert_valid(&self) {
        debug_assert_eq!(read_u16(self.0, 0), LogCode::HashOverwrite as u16);
        debug_assert_eq!(
            read_u16(self.0, 2) as usize,
            overwrite_log_length(self.key_length() as usize, self.payload_count() as usize)
        );
    }
}
