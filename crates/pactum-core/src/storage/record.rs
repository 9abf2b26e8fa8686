//! The record envelope: one version tag plus an opaque payload.
//!
//! The envelope address is stable for the record's lifetime once
//! installed; records are never physically removed (logical deletion
//! sets the `deleted` status flag). Payload bytes are only written while
//! the tag lock is held, and the subsequent tag release-store publishes
//! them; readers acquire-load the tag first and then read the bytes.
//!
//! Payload storage is a slice of `AtomicU8`. Optimistic readers can race
//! with an in-flight writer by design (the read-set verify catches it at
//! precommit), and byte-atomic relaxed accesses keep that race defined:
//! the tag's acquire/release pair is still the only ordering edge that
//! matters.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::xct::xct_id::{AtomicXctId, XctId};

/// One record: `(tag, payload[N])`. `N` is fixed at construction and is
/// storage-family-specific.
#[derive(Debug)]
pub struct Record {
    owner_id: AtomicXctId,
    payload: Box<[AtomicU8]>,
}

impl Record {
    /// A never-committed record with a zeroed payload of `payload_size`
    /// bytes and an all-zero (invalid, unlocked) tag.
    #[must_use]
    pub fn new(payload_size: usize) -> Self {
        let payload = (0..payload_size).map(|_| AtomicU8::new(0)).collect();
        Self {
            owner_id: AtomicXctId::new(XctId::default()),
            payload,
        }
    }

    #[must_use]
    pub fn owner_id(&self) -> &AtomicXctId {
        &self.owner_id
    }

    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Copy `out.len()` payload bytes starting at `offset` into `out`.
    ///
    /// Callers on the transactional path must have acquire-loaded the
    /// tag first (that is the ordering edge that makes these relaxed
    /// loads observe the committed bytes).
    pub fn read_payload(&self, offset: usize, out: &mut [u8]) {
        debug_assert!(
            offset + out.len() <= self.payload.len(),
            "payload read [{offset}, {}) out of bounds (len {})",
            offset + out.len(),
            self.payload.len()
        );
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.payload[offset + i].load(Ordering::Relaxed);
        }
    }

    /// Copy `src` into the payload starting at `offset`.
    ///
    /// The caller must hold this record's tag lock; the write becomes
    /// visible to other threads at the next tag release-store.
    pub fn write_payload(&self, offset: usize, src: &[u8]) {
        debug_assert!(
            self.owner_id.load_acquire().is_locked(),
            "payload write without holding the tag lock"
        );
        debug_assert!(
            offset + src.len() <= self.payload.len(),
            "payload write [{offset}, {}) out of bounds (len {})",
            offset + src.len(),
            self.payload.len()
        );
        for (i, byte) in src.iter().enumerate() {
            self.payload[offset + i].store(*byte, Ordering::Relaxed);
        }
    }

    /// Whole-payload copy, for tests and replay verification.
    #[must_use]
    pub fn snapshot_payload(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.payload.len()];
        self.read_payload(0, &mut out);
        out
    }
}

/// Stable address of a record envelope.
///
/// Read/write sets capture these; the commit coordinator sorts write
/// entries by the pointer as an integer to lock in a global order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordPtr(NonNull<Record>);

// SAFETY: a RecordPtr names a record owned by a storage that outlives
// every transaction touching it; all mutation goes through the record's
// atomic fields.
unsafe impl Send for RecordPtr {}
unsafe impl Sync for RecordPtr {}

impl RecordPtr {
    #[must_use]
    pub fn new(record: &Record) -> Self {
        Self(NonNull::from(record))
    }

    /// The address as an integer, the sort key for lock ordering.
    #[must_use]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Dereference the pointer.
    ///
    /// # Safety
    ///
    /// The storage owning the record must still be alive. Within the
    /// engine this holds for the whole run: storages are created through
    /// the registry and never dropped while workers are attached.
    #[must_use]
    pub unsafe fn as_ref<'a>(self) -> &'a Record {
        // SAFETY: per the function contract.
        unsafe { self.0.as_ref() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::Epoch;
    use crate::xct::xct_id::lock_marker;

    #[test]
    fn new_record_is_invalid_and_zeroed() {
        let record = Record::new(16);
        assert_eq!(record.payload_len(), 16);
        let id = record.owner_id().load_acquire();
        assert!(!id.is_valid());
        assert_eq!(id.epoch(), Epoch::INVALID);
        assert_eq!(record.snapshot_payload(), vec![0u8; 16]);
    }

    #[test]
    fn write_under_lock_then_read_back() {
        let record = Record::new(8);
        record.owner_id().lock_unconditional(lock_marker(0));
        record.write_payload(2, b"abc");

        let mut id = XctId::default();
        id.set_epoch_ordinal(Epoch::new(1), 0);
        id.set_valid(true);
        record.owner_id().release(id);

        let mut out = [0u8; 3];
        record.read_payload(2, &mut out);
        assert_eq!(&out, b"abc");
        assert_eq!(record.snapshot_payload(), vec![0, 0, b'a', b'b', b'c', 0, 0, 0]);
    }

    #[test]
    fn record_ptr_orders_by_address() {
        let records: Vec<Record> = (0..4).map(|_| Record::new(4)).collect();
        let mut ptrs: Vec<RecordPtr> = records.iter().map(RecordPtr::new).collect();
        ptrs.reverse();
        ptrs.sort();
        for pair in ptrs.windows(2) {
            assert!(pair[0].addr() < pair[1].addr());
        }
    }

    #[test]
    fn record_ptr_round_trips_to_same_record() {
        let record = Record::new(4);
        let ptr = RecordPtr::new(&record);
        // SAFETY: `record` is alive for the whole test.
        let back = unsafe { ptr.as_ref() };
        assert!(std::ptr::eq(back, &record));
    }
}
