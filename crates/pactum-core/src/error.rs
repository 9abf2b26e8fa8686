//! Error surface of the transactional core.
//!
//! Errors split into three classes. Transient transaction failures (the
//! abort variants) are returned to the caller, who re-executes the
//! transaction from scratch; after an abort no record envelope reflects
//! any of the aborted writes. Resource exhaustion (set and arena
//! overflows) looks the same to the caller: abort and retry, possibly
//! with reduced scope. Invariant violations are programming errors and
//! assert in debug builds; the one runtime-fatal case is logger I/O
//! failure.

use thiserror::Error;

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, ErrorCode>;

/// Error codes surfaced out of the transaction context and engine.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The per-transaction read set hit `max_read_set_size`.
    #[error("read set capacity exhausted")]
    ReadSetOverflow,

    /// The per-transaction write set hit `max_write_set_size`.
    #[error("write set capacity exhausted")]
    WriteSetOverflow,

    /// The lock-free write set hit `max_lock_free_write_set_size`.
    #[error("lock-free write set capacity exhausted")]
    LockFreeWriteSetOverflow,

    /// The per-transaction log arena ran out of space.
    #[error("local work memory exhausted")]
    LocalWorkMemoryOverflow,

    /// Concurrency race detected; the caller should retry from scratch.
    #[error("race abort: concurrent transaction invalidated a read")]
    RaceAbort,

    /// Soft variant of `ReadSetOverflow` for oversized read sets that the
    /// caller may retry with a coarser access pattern.
    #[error("read set grew too large for verification")]
    LargeReadSetAbort,

    /// The application requested the abort.
    #[error("user requested abort")]
    UserRequestedAbort,

    /// A storage with the same name or id already exists.
    #[error("storage already exists")]
    StorageAlreadyExists,

    /// The storage id does not name a known storage.
    #[error("storage not found")]
    StorageNotFound,

    /// The transaction context is not in a state that allows the call
    /// (e.g. `begin` while already active).
    #[error("invalid transaction state for this operation")]
    InvalidState,

    /// The logger failed to write to stable storage. Engine-fatal.
    #[error("log device I/O failure")]
    LogIoError,
}

impl ErrorCode {
    /// True for errors the caller handles by re-running the transaction.
    #[must_use]
    pub const fn is_retryable_abort(self) -> bool {
        matches!(
            self,
            Self::ReadSetOverflow
                | Self::WriteSetOverflow
                | Self::LockFreeWriteSetOverflow
                | Self::LocalWorkMemoryOverflow
                | Self::RaceAbort
                | Self::LargeReadSetAbort
                | Self::UserRequestedAbort
        )
    }
}
