//! Common log record layout: header, type codes, filler, epoch marker,
//! and the engine-global `CreateStorage` record.
//!
//! A log stream is a sequence of 8-byte-aligned records, each starting
//! with a 16-byte little-endian header:
//!
//! ```text
//! offset 0 : u16 log_type_code
//! offset 2 : u16 log_length      (bytes, multiple of 8)
//! offset 4 : u32 storage_id      (0 for engine-global)
//! offset 8 : u64 xct_id          (the committing transaction's tag)
//! ```
//!
//! The one exception is an 8-byte `Filler`: only the first half of the
//! header is present. Readers therefore peek `(code, length)` from the
//! first 8 bytes before touching the rest.
//!
//! Every variant provides the same triple: a `calculate_log_length`
//! function of its variable fields, a `populate` step writing into
//! caller-supplied aligned space (no allocation), and a debug
//! `assert_valid` consistency check on the encoded bytes.

use crate::epoch::Epoch;
use crate::error::{CoreResult, ErrorCode};
use crate::storage::{StorageId, StorageKind, StorageMetadata};
use crate::xct::xct_id::XctId;

/// Size of the full common header.
pub const LOG_HEADER_SIZE: usize = 16;

/// Size of the truncated header a degenerate 8-byte filler carries.
pub const LOG_PEEK_SIZE: usize = 8;

/// Round up to the next multiple of 8. The log stream carries an
/// implicit alignment invariant: every record length passes through
/// this.
#[must_use]
pub const fn align8(len: usize) -> usize {
    (len + 7) & !7
}

// -- little-endian field helpers --------------------------------------------

pub(crate) fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

pub(crate) fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(raw)
}

pub(crate) fn write_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

// -- type codes -------------------------------------------------------------

/// On-disk log type codes. Frozen; recovery dispatches on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum LogCode {
    Filler = 1,
    CreateStorage = 2,
    EpochMarker = 3,
    ArrayOverwrite = 16,
    HashInsert = 32,
    HashDelete = 33,
    HashOverwrite = 34,
    SequentialAppend = 48,
}

impl LogCode {
    #[must_use]
    pub const fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::Filler),
            2 => Some(Self::CreateStorage),
            3 => Some(Self::EpochMarker),
            16 => Some(Self::ArrayOverwrite),
            32 => Some(Self::HashInsert),
            33 => Some(Self::HashDelete),
            34 => Some(Self::HashOverwrite),
            48 => Some(Self::SequentialAppend),
            _ => None,
        }
    }
}

// -- header -----------------------------------------------------------------

/// Decoded common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    pub code: LogCode,
    pub length: usize,
    pub storage_id: StorageId,
    pub xct_id: XctId,
}

/// Peek `(code, length)` from the first 8 bytes of a record. This is
/// the only read that is valid against a truncated filler.
pub fn peek_entry(buf: &[u8]) -> CoreResult<(LogCode, usize)> {
    if buf.len() < LOG_PEEK_SIZE {
        return Err(ErrorCode::LogIoError);
    }
    let code = LogCode::from_u16(read_u16(buf, 0)).ok_or(ErrorCode::LogIoError)?;
    let length = read_u16(buf, 2) as usize;
    if length < LOG_PEEK_SIZE || length % 8 != 0 || length > buf.len() {
        return Err(ErrorCode::LogIoError);
    }
    Ok((code, length))
}

impl LogHeader {
    /// Decode a full header. Rejects records shorter than the header
    /// itself; use [`peek_entry`] first to handle truncated fillers.
    pub fn read_from(buf: &[u8]) -> CoreResult<Self> {
        let (code, length) = peek_entry(buf)?;
        if length < LOG_HEADER_SIZE || buf.len() < LOG_HEADER_SIZE {
            return Err(ErrorCode::LogIoError);
        }
        Ok(Self {
            code,
            length,
            storage_id: read_u32(buf, 4),
            xct_id: XctId::from_raw(read_u64(buf, 8)),
        })
    }
}

/// Write a full header at the start of `buf`.
pub(crate) fn write_header(buf: &mut [u8], code: LogCode, length: usize, storage_id: StorageId) {
    debug_assert!(length >= LOG_HEADER_SIZE && length % 8 == 0);
    debug_assert_eq!(buf.len(), length, "populate buffer must match log length");
    write_u16(buf, 0, code as u16);
    write_u16(buf, 2, length as u16);
    write_u32(buf, 4, storage_id);
    write_u64(buf, 8, 0);
}

/// Stamp the committing transaction's tag into an already-populated
/// record. Done by the commit coordinator after the commit tag is known.
pub fn stamp_xct_id(buf: &mut [u8], id: XctId) {
    debug_assert!(buf.len() >= LOG_HEADER_SIZE);
    write_u64(buf, 8, id.raw());
}

// -- filler -----------------------------------------------------------------

/// Smallest full-header filler.
pub const FILLER_MIN_FULL: usize = LOG_HEADER_SIZE;

/// Fill `buf` with one filler record covering its whole length.
///
/// `buf.len()` must be a non-zero multiple of 8. A length of exactly 8
/// produces the truncated-header form.
pub fn populate_filler(buf: &mut [u8]) {
    let length = buf.len();
    debug_assert!(length >= LOG_PEEK_SIZE && length % 8 == 0);
    debug_assert!(length <= u16::MAX as usize);
    buf.fill(0);
    write_u16(buf, 0, LogCode::Filler as u16);
    write_u16(buf, 2, length as u16);
    write_u32(buf, 4, 0);
}

// -- epoch marker -----------------------------------------------------------

/// Byte length of an epoch marker record.
pub const EPOCH_MARKER_LENGTH: usize = 24;

/// Write an epoch marker: the stream's current epoch changes from
/// `old_epoch` to `new_epoch` at this point. Recovery uses the markers
/// to stop at the durable horizon.
pub fn populate_epoch_marker(buf: &mut [u8], old_epoch: Epoch, new_epoch: Epoch) {
    write_header(buf, LogCode::EpochMarker, EPOCH_MARKER_LENGTH, 0);
    write_u32(buf, 16, old_epoch.value());
    write_u32(buf, 20, new_epoch.value());
}

/// Accessor over an encoded epoch marker.
#[derive(Debug, Clone, Copy)]
pub struct EpochMarkerRef<'a>(pub &'a [u8]);

impl EpochMarkerRef<'_> {
    #[must_use]
    pub fn old_epoch(&self) -> Epoch {
        Epoch::new(read_u32(self.0, 16))
    }

    #[must_use]
    pub fn new_epoch(&self) -> Epoch {
        Epoch::new(read_u32(self.0, 20))
    }

    pub fn assert_valid(&self) {
        debug_assert_eq!(read_u16(self.0, 0), LogCode::EpochMarker as u16);
        debug_assert_eq!(read_u16(self.0, 2) as usize, EPOCH_MARKER_LENGTH);
        debug_assert_eq!(read_u32(self.0, 4), 0, "epoch marker is engine-global");
    }
}

// -- create storage ---------------------------------------------------------

// Body block offsets (from record start).
const CREATE_KIND_AT: usize = 16;
const CREATE_NAME_LEN_AT: usize = 18;
const CREATE_CAPACITY_AT: usize = 24;
const CREATE_PAYLOAD_SIZE_AT: usize = 32;
const CREATE_BIN_COUNT_AT: usize = 34;
const CREATE_NAME_AT: usize = 40;

/// Length of a `CreateStorage` record for a storage name of `name_len`
/// bytes.
#[must_use]
pub const fn create_storage_log_length(name_len: usize) -> usize {
    align8(CREATE_NAME_AT + name_len)
}

/// Encode a `CreateStorage` record. Processed out-of-band in its own
/// epoch; creation is never interleaved with operations on the storage.
pub fn populate_create_storage(buf: &mut [u8], storage_id: StorageId, meta: &StorageMetadata) {
    let name = meta.name.as_bytes();
    let length = create_storage_log_length(name.len());
    buf.fill(0);
    write_header(buf, LogCode::CreateStorage, length, storage_id);
    write_u16(buf, CREATE_KIND_AT, meta.kind.to_u16());
    write_u16(buf, CREATE_NAME_LEN_AT, name.len() as u16);
    write_u64(buf, CREATE_CAPACITY_AT, meta.capacity);
    write_u16(buf, CREATE_PAYLOAD_SIZE_AT, meta.payload_size);
    write_u16(buf, CREATE_BIN_COUNT_AT, meta.bin_count_log2);
    buf[CREATE_NAME_AT..CREATE_NAME_AT + name.len()].copy_from_slice(name);
}

/// Accessor over an encoded `CreateStorage` record.
#[derive(Debug, Clone, Copy)]
pub struct CreateStorageRef<'a>(pub &'a [u8]);

impl CreateStorageRef<'_> {
    #[must_use]
    pub fn storage_id(&self) -> StorageId {
        read_u32(self.0, 4)
    }

    /// Decode the metadata block back into a [`StorageMetadata`].
    pub fn metadata(&self) -> CoreResult<StorageMetadata> {
        let kind = StorageKind::from_u16(read_u16(self.0, CREATE_KIND_AT))?;
        let name_len = read_u16(self.0, CREATE_NAME_LEN_AT) as usize;
        if CREATE_NAME_AT + name_len > self.0.len() {
            return Err(ErrorCode::LogIoError);
        }
        let name = std::str::from_utf8(&self.0[CREATE_NAME_AT..CREATE_NAME_AT + name_len])
            .map_err(|_| ErrorCode::LogIoError)?
            .to_owned();
        Ok(StorageMetadata {
            name,
            kind,
            capacity: read_u64(self.0, CREATE_CAPACITY_AT),
            payload_size: read_u16(self.0, CREATE_PAYLOAD_SIZE_AT),
            bin_count_log2: read_u16(self.0, CREATE_BIN_COUNT_AT),
        })
    }

    pub fn assert_valid(&self) {
        debug_assert_eq!(read_u16(self.0, 0), LogCode::CreateStorage as u16);
        let name_len = read_u16(self.0, CREATE_NAME_LEN_AT) as usize;
        debug_assert_eq!(
            read_u16(self.0, 2) as usize,
            create_storage_log_length(name_len)
        );
        debug_assert_ne!(read_u32(self.0, 4), 0, "created storage id must be non-zero");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align8_pads_up() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(17), 24);
        assert_eq!(align8(24), 24);
    }

    #[test]
    fn header_round_trip() {
        let mut buf = vec![0u8; 24];
        write_header(&mut buf, LogCode::EpochMarker, 24, 0);
        let mut id = XctId::default();
        id.set_epoch_ordinal(Epoch::new(9), 4);
        stamp_xct_id(&mut buf, id);

        let header = LogHeader::read_from(&buf).expect("valid header");
        assert_eq!(header.code, LogCode::EpochMarker);
        assert_eq!(header.length, 24);
        assert_eq!(header.storage_id, 0);
        assert_eq!(header.xct_id.epoch().value(), 9);
        assert_eq!(header.xct_id.ordinal(), 4);
    }

    #[test]
    fn peek_rejects_malformed_lengths() {
        let mut buf = vec![0u8; 16];
        write_u16(&mut buf, 0, LogCode::Filler as u16);

        write_u16(&mut buf, 2, 4); // below minimum
        assert_eq!(peek_entry(&buf).unwrap_err(), ErrorCode::LogIoError);

        write_u16(&mut buf, 2, 12); // not a multiple of 8
        assert_eq!(peek_entry(&buf).unwrap_err(), ErrorCode::LogIoError);

        write_u16(&mut buf, 2, 32); // longer than the buffer
        assert_eq!(peek_entry(&buf).unwrap_err(), ErrorCode::LogIoError);
    }

    #[test]
    fn peek_rejects_unknown_code() {
        let mut buf = vec![0u8; 16];
        write_u16(&mut buf, 0, 0xFFFF);
        write_u16(&mut buf, 2, 16);
        assert_eq!(peek_entry(&buf).unwrap_err(), ErrorCode::LogIoError);
    }

    #[test]
    fn truncated_filler_is_peekable_but_not_full() {
        let mut buf = vec![0xAAu8; 8];
        populate_filler(&mut buf);
        let (code, length) = peek_entry(&buf).expect("peek");
        assert_eq!(code, LogCode::Filler);
        assert_eq!(length, 8);
        assert!(LogHeader::read_from(&buf).is_err());
    }

    #[test]
    fn full_filler_covers_whole_gap() {
        let mut buf = vec![0xAAu8; 40];
        populate_filler(&mut buf);
        let (code, length) = peek_entry(&buf).expect("peek");
        assert_eq!(code, LogCode::Filler);
        assert_eq!(length, 40);
        assert!(buf[8..].iter().all(|&b| b == 0), "filler body must be zero");
    }

    #[test]
    fn epoch_marker_round_trip() {
        let mut buf = vec![0u8; EPOCH_MARKER_LENGTH];
        populate_epoch_marker(&mut buf, Epoch::new(7), Epoch::new(8));
        let marker = EpochMarkerRef(&buf);
        marker.assert_valid();
        assert_eq!(marker.old_epoch().value(), 7);
        assert_eq!(marker.new_epoch().value(), 8);
    }

    #[test]
    fn create_storage_round_trip() {
        let meta = StorageMetadata::hash("order_line", 10, 48);
        let length = create_storage_log_length(meta.name.len());
        assert_eq!(length % 8, 0);

        let mut buf = vec![0u8; length];
        populate_create_storage(&mut buf, 7, &meta);
        let entry = CreateStorageRef(&buf);
        entry.assert_valid();
        assert_eq!(entry.storage_id(), 7);
        assert_eq!(entry.metadata().expect("decode"), meta);
    }

    #[test]
    fn create_storage_rejects_garbage_name() {
        let meta = StorageMetadata::sequential("history");
        let mut buf = vec![0u8; create_storage_log_length(meta.name.len())];
        populate_create_storage(&mut buf, 3, &meta);
        // Claim a name longer than the record.
        write_u16(&mut buf, CREATE_NAME_LEN_AT, 200);
        assert_eq!(
            CreateStorageRef(&buf).metadata().unwrap_err(),
            ErrorCode::LogIoError
        );
    }
}
