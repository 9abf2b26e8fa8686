//! The per-worker transaction context.
//!
//! Holds the isolation level, the begin epoch, the bounded read/write
//! sets, and the local log arena. State machine:
//! `Inactive → Active → {Committed, Aborted} → Inactive` — `begin` is
//! legal from any non-`Active` state and re-arms the context.

use std::sync::atomic::{Ordering, fence};

use crate::epoch::Epoch;
use crate::error::{CoreResult, ErrorCode};
use crate::log::arena::LogArena;
use crate::options::XctOptions;
use crate::storage::StorageId;
use crate::storage::record::{Record, RecordPtr};
use crate::xct::access::{LockFreeWriteAccess, ReadAccess, WriteAccess, WriteKind};
use crate::xct::xct_id::XctId;

/// Isolation level of one transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Full read-set verification at commit.
    #[default]
    Serializable,
    /// Same verification as serializable in this storage model (no
    /// phantoms crossed by design).
    RepeatableRead,
    /// No read-set recording; the reader prefers snapshot pages.
    DirtyReadPreferSnapshot,
    /// No read-set recording; the reader prefers volatile pages.
    DirtyReadPreferVolatile,
}

impl IsolationLevel {
    #[must_use]
    pub const fn is_dirty_read(self) -> bool {
        matches!(self, Self::DirtyReadPreferSnapshot | Self::DirtyReadPreferVolatile)
    }
}

/// Lifecycle state of a transaction context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum XctState {
    #[default]
    Inactive,
    Active,
    Committed,
    Aborted,
}

/// A transaction context, owned by one worker and reused across
/// transactions.
#[derive(Debug)]
pub struct Xct {
    pub(crate) state: XctState,
    pub(crate) isolation: IsolationLevel,
    pub(crate) begin_epoch: Epoch,
    pub(crate) read_set: Vec<ReadAccess>,
    pub(crate) write_set: Vec<WriteAccess>,
    pub(crate) lock_free_write_set: Vec<LockFreeWriteAccess>,
    pub(crate) arena: LogArena,
    max_read_set: usize,
    max_write_set: usize,
    max_lock_free_write_set: usize,
}

impl Xct {
    #[must_use]
    pub fn new(options: &XctOptions) -> Self {
        Self {
            state: XctState::Inactive,
            isolation: IsolationLevel::Serializable,
            begin_epoch: Epoch::INVALID,
            read_set: Vec::with_capacity(options.max_read_set_size as usize),
            write_set: Vec::with_capacity(options.max_write_set_size as usize),
            lock_free_write_set: Vec::with_capacity(options.max_lock_free_write_set_size as usize),
            arena: LogArena::new((options.local_work_memory_size_mb as usize) << 20),
            max_read_set: options.max_read_set_size as usize,
            max_write_set: options.max_write_set_size as usize,
            max_lock_free_write_set: options.max_lock_free_write_set_size as usize,
        }
    }

    #[must_use]
    pub fn state(&self) -> XctState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == XctState::Active
    }

    #[must_use]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Epoch observed at `begin`. The commit epoch is always `>=` this.
    #[must_use]
    pub fn begin_epoch(&self) -> Epoch {
        self.begin_epoch
    }

    #[must_use]
    pub fn read_set(&self) -> &[ReadAccess] {
        &self.read_set
    }

    #[must_use]
    pub fn write_set(&self) -> &[WriteAccess] {
        &self.write_set
    }

    #[must_use]
    pub fn lock_free_write_set(&self) -> &[LockFreeWriteAccess] {
        &self.lock_free_write_set
    }

    /// Move to `Active`, capture the begin epoch, reset the sets.
    pub fn begin(&mut self, isolation: IsolationLevel, current_epoch: Epoch) -> CoreResult<()> {
        if self.state == XctState::Active {
            return Err(ErrorCode::InvalidState);
        }
        debug_assert!(current_epoch.is_valid());
        self.state = XctState::Active;
        self.isolation = isolation;
        self.begin_epoch = current_epoch;
        self.read_set.clear();
        self.write_set.clear();
        self.lock_free_write_set.clear();
        self.arena.reset();
        Ok(())
    }

    /// Record a read of `record`, returning the observed tag.
    ///
    /// Dirty-read isolation returns the tag without recording. The
    /// fence between the tag load and any payload access keeps the
    /// payload read from being reordered before the tag copy. A tag
    /// observed locked aborts immediately: the verify at precommit
    /// would almost certainly fail anyway, so the CPU time is better
    /// spent on the retry.
    pub fn add_to_read_set(&mut self, record: &Record) -> CoreResult<XctId> {
        debug_assert!(self.is_active(), "read outside an active transaction");
        if self.isolation.is_dirty_read() {
            return Ok(record.owner_id().load_acquire());
        }
        if self.read_set.len() >= self.max_read_set {
            return Err(ErrorCode::ReadSetOverflow);
        }
        let observed = record.owner_id().load_acquire();
        // Orders the tag copy before any payload access that follows.
        fence(Ordering::Acquire);
        if observed.is_locked() {
            return Err(ErrorCode::RaceAbort);
        }
        self.read_set.push(ReadAccess {
            record: RecordPtr::new(record),
            observed,
        });
        Ok(observed)
    }

    /// Record a write of `record` whose log entry lives at
    /// `(log_offset, log_length)` in this context's arena.
    pub fn add_to_write_set(
        &mut self,
        record: &Record,
        kind: WriteKind,
        log_offset: usize,
        log_length: usize,
    ) -> CoreResult<()> {
        debug_assert!(self.is_active(), "write outside an active transaction");
        if self.write_set.len() >= self.max_write_set {
            return Err(ErrorCode::WriteSetOverflow);
        }
        self.write_set.push(WriteAccess {
            record: RecordPtr::new(record),
            observed: record.owner_id().load_acquire(),
            log_offset,
            log_length,
            kind,
        });
        Ok(())
    }

    /// Record an append-only write; no record lock will be taken.
    pub fn add_to_lock_free_write_set(
        &mut self,
        storage_id: StorageId,
        log_offset: usize,
        log_length: usize,
    ) -> CoreResult<()> {
        debug_assert!(self.is_active(), "write outside an active transaction");
        if self.lock_free_write_set.len() >= self.max_lock_free_write_set {
            return Err(ErrorCode::LockFreeWriteSetOverflow);
        }
        self.lock_free_write_set.push(LockFreeWriteAccess {
            storage_id,
            log_offset,
            log_length,
        });
        Ok(())
    }

    /// Reserve arena space for a log entry of `length` bytes.
    pub fn allocate_log_entry(&mut self, length: usize) -> CoreResult<usize> {
        debug_assert!(self.is_active(), "allocation outside an active transaction");
        self.arena.allocate(length)
    }

    #[must_use]
    pub fn log_entry(&self, offset: usize, length: usize) -> &[u8] {
        self.arena.slice(offset, length)
    }

    #[must_use]
    pub fn log_entry_mut(&mut self, offset: usize, length: usize) -> &mut [u8] {
        self.arena.slice_mut(offset, length)
    }

    /// Discard all transaction-local state. After this, no record
    /// envelope reflects any of the aborted writes (nothing was applied
    /// yet; application only happens inside precommit).
    pub fn abort(&mut self) {
        debug_assert!(self.is_active(), "abort of a non-active transaction");
        self.read_set.clear();
        self.write_set.clear();
        self.lock_free_write_set.clear();
        self.arena.reset();
        self.state = XctState::Aborted;
    }

    /// Internal: called by the commit coordinator after a successful
    /// precommit.
    pub(crate) fn mark_committed(&mut self) {
        debug_assert!(self.is_active());
        self.read_set.clear();
        self.write_set.clear();
        self.lock_free_write_set.clear();
        self.arena.reset();
        self.state = XctState::Committed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xct::xct_id::lock_marker;

    fn small_options() -> XctOptions {
        XctOptions {
            max_read_set_size: 4,
            max_write_set_size: 2,
            max_lock_free_write_set_size: 2,
            local_work_memory_size_mb: 1,
            epoch_advance_interval_ms: 20,
        }
    }

    #[test]
    fn begin_requires_non_active_state() {
        let mut xct = Xct::new(&small_options());
        xct.begin(IsolationLevel::Serializable, Epoch::new(3)).expect("begin");
        assert!(xct.is_active());
        assert_eq!(xct.begin_epoch(), Epoch::new(3));
        assert_eq!(
            xct.begin(IsolationLevel::Serializable, Epoch::new(3)).unwrap_err(),
            ErrorCode::InvalidState
        );
        xct.abort();
        assert_eq!(xct.state(), XctState::Aborted);
        xct.begin(IsolationLevel::Serializable, Epoch::new(4)).expect("re-begin");
    }

    #[test]
    fn read_set_records_observed_tag() {
        let mut xct = Xct::new(&small_options());
        xct.begin(IsolationLevel::Serializable, Epoch::new(1)).unwrap();

        let record = Record::new(8);
        let observed = xct.add_to_read_set(&record).expect("readable");
        assert!(!observed.is_valid());
        assert_eq!(xct.read_set().len(), 1);
        assert_eq!(xct.read_set()[0].observed, observed);
    }

    #[test]
    fn read_set_overflow_on_last_read() {
        let mut xct = Xct::new(&small_options());
        xct.begin(IsolationLevel::Serializable, Epoch::new(1)).unwrap();
        let records: Vec<Record> = (0..5).map(|_| Record::new(4)).collect();
        for record in &records[..4] {
            xct.add_to_read_set(record).expect("within capacity");
        }
        assert_eq!(
            xct.add_to_read_set(&records[4]).unwrap_err(),
            ErrorCode::ReadSetOverflow
        );
    }

    #[test]
    fn dirty_read_skips_recording() {
        let mut xct = Xct::new(&small_options());
        xct.begin(IsolationLevel::DirtyReadPreferVolatile, Epoch::new(1)).unwrap();
        let record = Record::new(4);
        for _ in 0..10 {
            xct.add_to_read_set(&record).expect("never overflows");
        }
        assert!(xct.read_set().is_empty());
    }

    #[test]
    fn locked_record_aborts_the_read_early() {
        let mut xct = Xct::new(&small_options());
        xct.begin(IsolationLevel::Serializable, Epoch::new(1)).unwrap();
        let record = Record::new(4);
        record.owner_id().lock_unconditional(lock_marker(9));
        assert_eq!(xct.add_to_read_set(&record).unwrap_err(), ErrorCode::RaceAbort);
        assert!(xct.read_set().is_empty());
    }

    #[test]
    fn write_set_overflow() {
        let mut xct = Xct::new(&small_options());
        xct.begin(IsolationLevel::Serializable, Epoch::new(1)).unwrap();
        let records: Vec<Record> = (0..3).map(|_| Record::new(4)).collect();
        for record in &records[..2] {
            xct.add_to_write_set(record, WriteKind::Overwrite, 0, 0).expect("fits");
        }
        assert_eq!(
            xct.add_to_write_set(&records[2], WriteKind::Overwrite, 0, 0).unwrap_err(),
            ErrorCode::WriteSetOverflow
        );
    }

    #[test]
    fn lock_free_write_set_overflow() {
        let mut xct = Xct::new(&small_options());
        xct.begin(IsolationLevel::Serializable, Epoch::new(1)).unwrap();
        xct.add_to_lock_free_write_set(5, 0, 24).expect("fits");
        xct.add_to_lock_free_write_set(5, 24, 24).expect("fits");
        assert_eq!(
            xct.add_to_lock_free_write_set(5, 48, 24).unwrap_err(),
            ErrorCode::LockFreeWriteSetOverflow
        );
    }

    #[test]
    fn abort_discards_everything() {
        let mut xct = Xct::new(&small_options());
        xct.begin(IsolationLevel::Serializable, Epoch::new(1)).unwrap();
        let record = Record::new(4);
        let offset = xct.allocate_log_entry(32).expect("arena space");
        xct.add_to_read_set(&record).expect("read");
        xct.add_to_write_set(&record, WriteKind::Overwrite, offset, 32).expect("write");
        xct.abort();

        assert!(xct.read_set().is_empty());
        assert!(xct.write_set().is_empty());
        assert_eq!(xct.arena.used(), 0);
        assert_eq!(xct.state(), XctState::Aborted);
    }
}
