//! The commit coordinator.
//!
//! Precommit turns a transaction's intent into published record state:
//!
//! 1. lock the (deduplicated) write set in record-address order;
//! 2. full fence, then read the commit epoch and hand out ordinals;
//! 3. verify every read-set tag (ignoring lock bits; locked by anyone
//!    but this transaction's own write set is a race);
//! 4. apply each log entry in address order and publish the new tag
//!    with a release-store that drops the lock;
//! 5. hand the log entries to the worker's logger, tagged with the
//!    commit epoch.
//!
//! Failure at phase 1 cannot occur (locks always succeed eventually).
//! Failure at phase 3 releases every taken lock with the tag it had at
//! acquisition and aborts. Failure after phase 4 is impossible by
//! construction; a logger I/O failure at phase 5 is engine-fatal, not a
//! rollback.

use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};

use crate::epoch::Epoch;
use crate::error::{CoreResult, ErrorCode};
use crate::log::types::{LogCode, peek_entry, stamp_xct_id};
use crate::storage::StorageRegistry;
use crate::storage::array::log_types::{self as array_log, ArrayOverwriteRef};
use crate::storage::array::{ArrayOffset, ArrayStorage};
use crate::storage::hash::log_types::{HashDeleteRef, HashInsertRef, HashOverwriteRef};
use crate::storage::record::{Record, RecordPtr};
use crate::storage::sequential::log_types::SequentialAppendRef;
use crate::thread_ctx::ThreadCtx;
use crate::xct::access::{ReadAccess, WriteKind};
use crate::xct::xct::IsolationLevel;
use crate::xct::xct_id::XctId;

use crate::epoch_manager::EpochManager;

/// Coordinates begin/precommit/abort against the epoch manager and the
/// storage catalog.
pub struct XctManager {
    epoch_manager: Arc<EpochManager>,
    registry: Arc<StorageRegistry>,
}

impl XctManager {
    #[must_use]
    pub fn new(epoch_manager: Arc<EpochManager>, registry: Arc<StorageRegistry>) -> Self {
        Self {
            epoch_manager,
            registry,
        }
    }

    #[must_use]
    pub fn epoch_manager(&self) -> &Arc<EpochManager> {
        &self.epoch_manager
    }

    /// Move the worker's context to `Active`, capturing the begin
    /// epoch.
    pub fn begin_xct(&self, ctx: &mut ThreadCtx, isolation: IsolationLevel) -> CoreResult<()> {
        ctx.xct_mut().begin(isolation, self.epoch_manager.current_epoch())
    }

    /// Abort the active transaction; no record reflects any of its
    /// writes.
    pub fn abort_xct(&self, ctx: &mut ThreadCtx) {
        ctx.xct_mut().abort();
    }

    /// Block until the given commit epoch is durable on every logger.
    pub fn wait_for_commit(&self, commit_epoch: Epoch) {
        self.epoch_manager.wait_for_durable(commit_epoch);
    }

    /// Run the precommit protocol. On success the context is
    /// `Committed` and the returned epoch is the commit epoch; on a
    /// verification failure the context is `Aborted` and the caller may
    /// retry from scratch.
    pub fn precommit_xct(&self, ctx: &mut ThreadCtx) -> CoreResult<Epoch> {
        if !ctx.xct().is_active() {
            return Err(ErrorCode::InvalidState);
        }
        if ctx.xct().write_set().is_empty() && ctx.xct().lock_free_write_set().is_empty() {
            return self.precommit_read_only(ctx);
        }
        self.precommit_with_writes(ctx)
    }

    /// Empty write set: no locks, no epoch assignment, no logging —
    /// but the read set is still verified.
    fn precommit_read_only(&self, ctx: &mut ThreadCtx) -> CoreResult<Epoch> {
        if let Err(code) = verify_read_set(ctx.xct().read_set(), &[]) {
            ctx.xct_mut().abort();
            return Err(code);
        }
        let epoch = self.epoch_manager.current_epoch();
        ctx.xct_mut().mark_committed();
        Ok(epoch)
    }

    fn precommit_with_writes(&self, ctx: &mut ThreadCtx) -> CoreResult<Epoch> {
        let marker = ctx.lock_marker();
        let write_set = ctx.xct().write_set().to_vec();
        let lock_free = ctx.xct().lock_free_write_set().to_vec();

        // Phase 1: sort by record address; the address order is the
        // global lock order, which is what makes intersecting commits
        // deadlock-free. Ties (the same record written twice) keep the
        // highest insertion index: the most recent log entry wins the
        // slot, earlier ones are superseded.
        let mut order: Vec<usize> = (0..write_set.len()).collect();
        order.sort_by_key(|&i| (write_set[i].record.addr(), i));
        let mut winners: Vec<usize> = Vec::with_capacity(order.len());
        let mut at = 0;
        while at < order.len() {
            let addr = write_set[order[at]].record.addr();
            let mut last = at;
            while last + 1 < order.len() && write_set[order[last + 1]].record.addr() == addr {
                last += 1;
            }
            winners.push(order[last]);
            at = last + 1;
        }

        // Ascending-address lock sweep; remember each tag as of
        // acquisition so a failed verify can restore it untouched.
        let mut locked: Vec<(RecordPtr, XctId)> = Vec::with_capacity(winners.len());
        for &i in &winners {
            let ptr = write_set[i].record;
            // SAFETY: records referenced by the write set belong to
            // registered storages, which outlive the transaction.
            let record = unsafe { ptr.as_ref() };
            record.owner_id().lock_unconditional(marker);
            let original = record.owner_id().load_acquire().without_lock();
            locked.push((ptr, original));
        }

        // Phase 2: publish the in-commit guard, fence, then read the
        // commit epoch. The guard is read from the pre-fence epoch, so
        // it never exceeds the stamped epoch.
        ctx.logger().enter_commit(self.epoch_manager.current_epoch());
        fence(Ordering::SeqCst);
        let commit_epoch = self.epoch_manager.current_epoch();
        debug_assert!(commit_epoch >= ctx.xct().begin_epoch());

        // Phase 3: verify the read set.
        if let Err(code) = verify_read_set(ctx.xct().read_set(), &locked) {
            for &(ptr, original) in &locked {
                // SAFETY: as above; we hold each of these locks.
                unsafe { ptr.as_ref() }.owner_id().release(original);
            }
            ctx.logger().leave_commit();
            ctx.xct_mut().abort();
            return Err(code);
        }

        // Phase 4: apply and publish, in address order.
        for (k, &i) in winners.iter().enumerate() {
            let entry = write_set[i];
            let original = locked[k].1;
            // SAFETY: as above.
            let record = unsafe { entry.record.as_ref() };

            let mut new_tag = XctId::default();
            new_tag.set_epoch_ordinal(commit_epoch, ctx.next_ordinal(commit_epoch));
            match entry.kind {
                WriteKind::Insert => new_tag.set_valid(true),
                WriteKind::Delete => {
                    new_tag.set_valid(true);
                    new_tag.set_deleted(true);
                }
                WriteKind::Overwrite => {
                    new_tag.set_valid(original.is_valid());
                    new_tag.set_deleted(original.is_deleted());
                }
            }

            apply_record_log(ctx.xct().log_entry(entry.log_offset, entry.log_length), record)?;
            stamp_xct_id(
                ctx.xct_mut().log_entry_mut(entry.log_offset, entry.log_length),
                new_tag,
            );
            record.owner_id().release(new_tag);
        }

        // Lock-free (append-only) writes follow: fresh envelopes, no
        // lock to take or release.
        for lf in &lock_free {
            let storage = self.registry.get(lf.storage_id)?;
            let sequential = storage.as_sequential()?;
            let mut tag = XctId::default();
            tag.set_epoch_ordinal(commit_epoch, ctx.next_ordinal(commit_epoch));
            tag.set_valid(true);
            stamp_xct_id(ctx.xct_mut().log_entry_mut(lf.log_offset, lf.log_length), tag);
            SequentialAppendRef(ctx.xct().log_entry(lf.log_offset, lf.log_length))
                .apply_to_storage(sequential, ctx.worker_id(), tag)?;
        }

        // Phase 5: hand the surviving entries to the logger. Superseded
        // duplicates are not logged; replaying them would resurrect
        // stale intermediate states.
        let mut handles: Vec<(usize, usize)> = winners
            .iter()
            .map(|&i| (write_set[i].log_offset, write_set[i].log_length))
            .collect();
        handles.extend(lock_free.iter().map(|lf| (lf.log_offset, lf.log_length)));

        let logger = Arc::clone(ctx.logger());
        let log_result = {
            let entries = handles
                .iter()
                .map(|&(offset, length)| ctx.xct().log_entry(offset, length));
            logger.append_commit(commit_epoch, entries)
        };
        logger.leave_commit();

        // The in-memory commit stands either way; a log failure is
        // engine-fatal and surfaces to the caller.
        ctx.xct_mut().mark_committed();
        log_result.map(|()| commit_epoch)
    }
}

/// Phase 3: every read-set tag must be unchanged (outside the lock
/// bits), and a locked record must be locked by this transaction's own
/// write set.
fn verify_read_set(read_set: &[ReadAccess], locked: &[(RecordPtr, XctId)]) -> CoreResult<()> {
    for read in read_set {
        // SAFETY: read-set records belong to registered storages.
        let record = unsafe { read.record.as_ref() };
        let current = record.owner_id().load_acquire();
        if !current.equals_ignoring_lock(read.observed) {
            return Err(ErrorCode::RaceAbort);
        }
        if current.is_locked()
            && locked
                .binary_search_by_key(&read.record.addr(), |(ptr, _)| ptr.addr())
                .is_err()
        {
            return Err(ErrorCode::RaceAbort);
        }
    }
    Ok(())
}

/// Dispatch a record-targeted log entry onto its envelope.
fn apply_record_log(entry: &[u8], record: &Record) -> CoreResult<()> {
    let (code, _) = peek_entry(entry)?;
    match code {
        LogCode::ArrayOverwrite => ArrayOverwriteRef(entry).apply_to_record(record),
        LogCode::HashInsert => HashInsertRef(entry).apply_to_record(record),
        LogCode::HashDelete => HashDeleteRef(entry).apply_to_record(record),
        LogCode::HashOverwrite => HashOverwriteRef(entry).apply_to_record(record),
        // Engine-global and append records never land in the locked
        // write set.
        LogCode::Filler
        | LogCode::CreateStorage
        | LogCode::EpochMarker
        | LogCode::SequentialAppend => {
            debug_assert!(false, "non-record log {code:?} in the locked write set");
            return Err(ErrorCode::InvalidState);
        }
    }
    Ok(())
}

/// Convenience used by tests and drivers: the full transactional write
/// of one array record through a context.
pub fn array_overwrite(
    ctx: &mut ThreadCtx,
    storage: &ArrayStorage,
    offset: ArrayOffset,
    payload_offset: u16,
    payload: &[u8],
) -> CoreResult<()> {
    let record = storage.record(offset)?;
    let length = array_log::calculate_log_length(payload.len());
    let log_offset = ctx.xct_mut().allocate_log_entry(length)?;
    array_log::populate(
        ctx.xct_mut().log_entry_mut(log_offset, length),
        storage.id(),
        offset,
        payload_offset,
        payload,
    );
    ctx.xct_mut()
        .add_to_write_set(record, WriteKind::Overwrite, log_offset, length)
}

/// Read one array record into `out`, recording the read.
pub fn array_read(
    ctx: &mut ThreadCtx,
    storage: &ArrayStorage,
    offset: ArrayOffset,
    out: &mut [u8],
) -> CoreResult<XctId> {
    let record = storage.record(offset)?;
    let observed = ctx.xct_mut().add_to_read_set(record)?;
    record.read_payload(0, out);
    Ok(observed)
}
