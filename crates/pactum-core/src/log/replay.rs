//! Recovery: re-apply a log stream to freshly loaded storages.
//!
//! The stream is one worker's flushed log, in order: storage creations
//! re-register storages, record logs re-install payloads and tags,
//! fillers and epoch markers structure the stream. Replayed state
//! equals live-application state given the same order, and every apply
//! is idempotent against an already-applied target.

use crate::epoch::Epoch;
use crate::error::{CoreResult, ErrorCode};
use crate::log::types::{CreateStorageRef, EpochMarkerRef, LogCode, LogHeader, peek_entry};
use crate::storage::StorageRegistry;
use crate::storage::array::log_types::ArrayOverwriteRef;
use crate::storage::hash::log_types::{HashDeleteRef, HashInsertRef, HashOverwriteRef};
use crate::storage::hash::{HashCoord, hashinate, hashtag_of};
use crate::storage::record::Record;
use crate::xct::xct_id::{XctId, lock_marker};

/// Counters from one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub storages_created: usize,
    pub records_applied: usize,
    pub entries_skipped: usize,
    /// Highest epoch seen in the stream (markers and record tags).
    pub last_epoch: Epoch,
}

/// Replay one worker's log stream against the registry.
///
/// `worker_id` names the chain sequential appends land on (a stream is
/// one worker's file). Entries whose tag epoch exceeds `horizon` are
/// skipped: they were in flight but never reached durability.
pub fn replay_stream(
    registry: &StorageRegistry,
    stream: &[u8],
    worker_id: usize,
    horizon: Option<Epoch>,
) -> CoreResult<ReplayStats> {
    let mut stats = ReplayStats::default();
    let mut at = 0usize;

    while at < stream.len() {
        let (code, length) = peek_entry(&stream[at..])?;
        let entry = &stream[at..at + length];
        at += length;

        match code {
            LogCode::Filler => {}
            LogCode::EpochMarker => {
                let marker = EpochMarkerRef(entry);
                marker.assert_valid();
                stats.last_epoch = stats.last_epoch.max(marker.new_epoch());
            }
            _ => {
                let header = LogHeader::read_from(entry)?;
                let epoch = header.xct_id.epoch();
                if horizon.is_some_and(|h| epoch > h) {
                    stats.entries_skipped += 1;
                    continue;
                }
                stats.last_epoch = stats.last_epoch.max(epoch);
                replay_entry(registry, code, header, entry, worker_id, &mut stats)?;
            }
        }
    }
    Ok(stats)
}

fn replay_entry(
    registry: &StorageRegistry,
    code: LogCode,
    header: LogHeader,
    entry: &[u8],
    worker_id: usize,
    stats: &mut ReplayStats,
) -> CoreResult<()> {
    match code {
        LogCode::CreateStorage => {
            let create = CreateStorageRef(entry);
            create.assert_valid();
            registry.register_with_id(create.storage_id(), create.metadata()?)?;
            stats.storages_created += 1;
        }
        LogCode::ArrayOverwrite => {
            let overwrite = ArrayOverwriteRef(entry);
            let storage = registry.get(header.storage_id)?;
            let record = storage.as_array()?.record(overwrite.array_offset())?;
            install(record, header.xct_id, |r| overwrite.apply_to_record(r));
            stats.records_applied += 1;
        }
        LogCode::HashInsert => {
            let insert = HashInsertRef(entry);
            let storage = registry.get(header.storage_id)?;
            let hash = storage.as_hash()?;
            let (record, _slot) = hash.replay_locate_insert(insert.key(), insert.bin1())?;
            install(record, header.xct_id, |r| insert.apply_to_record(r));
            stats.records_applied += 1;
        }
        LogCode::HashDelete => {
            let delete = HashDeleteRef(entry);
            let storage = registry.get(header.storage_id)?;
            let record = storage.as_hash()?.slot_record(
                delete.key(),
                HashCoord {
                    bin1: delete.bin1(),
                    slot: delete.slot(),
                    hashtag: hashtag_of(hashinate(delete.key())),
                },
            )?;
            install(record, header.xct_id, |r| delete.apply_to_record(r));
            stats.records_applied += 1;
        }
        LogCode::HashOverwrite => {
            let overwrite = HashOverwriteRef(entry);
            let storage = registry.get(header.storage_id)?;
            let record = storage.as_hash()?.slot_record(
                overwrite.key(),
                HashCoord {
                    bin1: overwrite.bin1(),
                    slot: overwrite.slot(),
                    hashtag: hashtag_of(hashinate(overwrite.key())),
                },
            )?;
            install(record, header.xct_id, |r| overwrite.apply_to_record(r));
            stats.records_applied += 1;
        }
        LogCode::SequentialAppend => {
            let append = crate::storage::sequential::log_types::SequentialAppendRef(entry);
            let storage = registry.get(header.storage_id)?;
            append.apply_to_storage(storage.as_sequential()?, worker_id, header.xct_id)?;
            stats.records_applied += 1;
        }
        LogCode::Filler | LogCode::EpochMarker => {
            debug_assert!(false, "structural log {code:?} reached replay_entry");
            return Err(ErrorCode::LogIoError);
        }
    }
    Ok(())
}

/// Recovery-side mirror of the live publish: take the lock, mutate the
/// payload, release with the logged tag.
fn install(record: &Record, tag: XctId, apply: impl FnOnce(&Record)) {
    record.owner_id().lock_unconditional(lock_marker(0));
    apply(record);
    record.owner_id().release(tag);
}
