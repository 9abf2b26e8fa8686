//! Coarse-grained logical clock shared by all workers.
//!
//! An epoch is a 32-bit counter advanced by the epoch manager, either on a
//! periodic tick or on demand. Commit visibility and durability are
//! reasoned about in whole epochs: a commit stamped with epoch `E` is
//! durable once every logger has flushed through `E`.
//!
//! Epoch `0` is the invalid sentinel. A record whose tag carries epoch 0
//! has never been committed and is not readable. Wrap-around is out of
//! scope (2^32 epochs at the default 20 ms tick is roughly 2.7 years of
//! uptime).

use serde::{Deserialize, Serialize};

/// Raw integer representation of an epoch.
pub type EpochInt = u32;

/// The invalid epoch sentinel.
pub const EPOCH_INVALID: EpochInt = 0;

/// A monotonically non-decreasing logical clock value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Epoch(EpochInt);

impl Epoch {
    /// The invalid epoch (never committed).
    pub const INVALID: Epoch = Epoch(EPOCH_INVALID);

    /// The first valid epoch an engine starts in.
    pub const INITIAL: Epoch = Epoch(1);

    #[must_use]
    pub const fn new(value: EpochInt) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> EpochInt {
        self.0
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != EPOCH_INVALID
    }

    /// The epoch after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The epoch before this one, or `INVALID` for the initial epoch.
    #[must_use]
    pub const fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("invalid")
        }
    }
}
