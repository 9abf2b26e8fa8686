//! Two-bin hash storage.
//!
//! Keys hash to a primary and an alternate bin (cuckoo-style placement);
//! each bin holds a fixed number of record slots. The log records carry
//! `{bin1, slot, hashtag}` as opaque coordinates so live application and
//! recovery agree on placement without re-running the placement search.
//!
//! Slot envelopes are preallocated at creation. A slot's record payload
//! is laid out as `[u16 key_len][key bytes, fixed area][payload bytes]`,
//! so the payload region starts at a fixed offset regardless of key
//! length. A slot is occupied once its tag carries the `valid` flag;
//! logical deletes keep the slot occupied with the `deleted` flag set.

pub mod log_types;

use crate::error::{CoreResult, ErrorCode};
use crate::storage::record::Record;
use crate::storage::{StorageId, StorageKind, StorageMetadata};

/// Slots per bin. Kept small; bin overflow surfaces as a retryable
/// abort (growing bins belongs to the excluded page-split collaborator).
pub const SLOTS_PER_BIN: usize = 8;

/// Maximum key length a slot can hold.
pub const MAX_KEY_LENGTH: usize = 62;

/// Bytes reserved at the front of every slot payload for
/// `[u16 key_len][key]`.
pub const KEY_AREA: usize = 2 + MAX_KEY_LENGTH;

/// Fixed offset of the value region within a slot payload.
pub const PAYLOAD_AT: usize = KEY_AREA;

/// Deterministic 64-bit key hash (FNV-1a). Bin choice and hashtag both
/// derive from this, so every worker and the replayer place a key the
/// same way.
#[must_use]
pub fn hashinate(key: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET_BASIS;
    for &byte in key {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// The 16-bit tag the insert log carries; auxiliary (derivable from the
/// key) but keeps the log body 8-byte aligned and the search fast.
#[must_use]
pub fn hashtag_of(hash: u64) -> u16 {
    ((hash >> 32) & 0xFFFF) as u16
}

/// Placement coordinates for one key in one storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCoord {
    /// True when the record sits in the primary bin.
    pub bin1: bool,
    /// Slot index within the bin.
    pub slot: u8,
    /// Auxiliary 16-bit tag of the key.
    pub hashtag: u16,
}

#[derive(Debug)]
struct HashBin {
    slots: Box<[Record]>,
}

/// A hash storage with a power-of-two bin count.
#[derive(Debug)]
pub struct HashStorage {
    id: StorageId,
    meta: StorageMetadata,
    bins: Box<[HashBin]>,
}

impl HashStorage {
    #[must_use]
    pub fn new(id: StorageId, meta: StorageMetadata) -> Self {
        debug_assert_eq!(meta.kind, StorageKind::Hash);
        let bin_count = 1usize << meta.bin_count_log2;
        let slot_size = KEY_AREA + meta.payload_size as usize;
        let bins = (0..bin_count)
            .map(|_| HashBin {
                slots: (0..SLOTS_PER_BIN).map(|_| Record::new(slot_size)).collect(),
            })
            .collect();
        Self { id, meta, bins }
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
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    fn bin_mask(&self) -> u64 {
        self.bins.len() as u64 - 1
    }

    /// Bin index for a key hash, primary or alternate.
    #[must_use]
    pub fn bin_index(&self, hash: u64, bin1: bool) -> usize {
        if bin1 {
            (hash & self.bin_mask()) as usize
        } else {
            ((hash >> 21) & self.bin_mask()) as usize
        }
    }

    /// The slot envelope at explicit coordinates.
    pub fn slot_record(&self, key: &[u8], coord: HashCoord) -> CoreResult<&Record> {
        let bin = self.bin_index(hashinate(key), coord.bin1);
        self.bins[bin]
            .slots
            .get(coord.slot as usize)
            .ok_or(ErrorCode::StorageNotFound)
    }

    /// Find the slot currently holding `key` (valid, possibly deleted).
    #[must_use]
    pub fn locate(&self, key: &[u8]) -> Option<(&Record, HashCoord)> {
        let hash = hashinate(key);
        let hashtag = hashtag_of(hash);
        for bin1 in [true, false] {
            let bin = &self.bins[self.bin_index(hash, bin1)];
            for (slot, record) in bin.slots.iter().enumerate() {
                if record.owner_id().load_acquire().is_valid() && slot_key_matches(record, key) {
                    return Some((
                        record,
                        HashCoord {
                            bin1,
                            slot: slot as u8,
                            hashtag,
                        },
                    ));
                }
            }
        }
        None
    }

    /// Pick the slot an insert of `key` will install into: the slot
    /// already holding the key if any, else the first never-committed
    /// slot in the primary bin, else the alternate bin.
    ///
    /// Two concurrent reservations can pick the same free slot; the
    /// caller must add the slot to its read set (observing the
    /// never-committed tag) so the loser fails verification instead of
    /// clobbering the winner's install.
    pub fn reserve_for_insert(&self, key: &[u8]) -> CoreResult<(&Record, HashCoord)> {
        debug_assert!(key.len() <= MAX_KEY_LENGTH, "key exceeds slot key area");
        if let Some(found) = self.locate(key) {
            return Ok(found);
        }
        let hash = hashinate(key);
        let hashtag = hashtag_of(hash);
        for bin1 in [true, false] {
            let bin = &self.bins[self.bin_index(hash, bin1)];
            for (slot, record) in bin.slots.iter().enumerate() {
                let id = record.owner_id().load_acquire();
                if !id.is_valid() && !id.is_locked() {
                    return Ok((
                        record,
                        HashCoord {
                            bin1,
                            slot: slot as u8,
                            hashtag,
                        },
                    ));
                }
            }
        }
        // Both candidate bins are full; retryable from the caller's view.
        Err(ErrorCode::RaceAbort)
    }

    /// Recovery-side placement for an insert log: the matching occupied
    /// slot, else the first free slot of the bin the log names.
    pub fn replay_locate_insert(&self, key: &[u8], bin1: bool) -> CoreResult<(&Record, u8)> {
        let hash = hashinate(key);
        let bin = &self.bins[self.bin_index(hash, bin1)];
        for (slot, record) in bin.slots.iter().enumerate() {
            if record.owner_id().load_acquire().is_valid() && slot_key_matches(record, key) {
                return Ok((record, slot as u8));
            }
        }
        for (slot, record) in bin.slots.iter().enumerate() {
            if !record.owner_id().load_acquire().is_valid() {
                return Ok((record, slot as u8));
            }
        }
        Err(ErrorCode::LogIoError)
    }
}

/// Write the key area of a slot. Caller holds the tag lock (live) or
/// owns the storage exclusively (recovery).
pub fn install_slot_key(record: &Record, key: &[u8]) {
    debug_assert!(key.len() <= MAX_KEY_LENGTH);
    record.write_payload(0, &(key.len() as u16).to_le_bytes());
    record.write_payload(2, key);
}

/// Compare a slot's stored key against `key`.
#[must_use]
pub fn slot_key_matches(record: &Record, key: &[u8]) -> bool {
    let mut len_raw = [0u8; 2];
    record.read_payload(0, &mut len_raw);
    let stored_len = u16::from_le_bytes(len_raw) as usize;
    if stored_len != key.len() || stored_len > MAX_KEY_LENGTH {
        return false;
    }
    let mut stored = [0u8; MAX_KEY_LENGTH];
    record.read_payload(2, &mut stored[..stored_len]);
    &stored[..stored_len] == key
}
