//! Engine configuration.
//!
//! Plain-old-data option structs with serde derives so deployments can
//! externalize them as JSON. Every field has a default; a handful of
//! knobs can additionally be overridden through `PACTUM_*` environment
//! variables, parsed loosely (unknown values fall back to the default
//! rather than erroring).

use serde::{Deserialize, Serialize};

/// Transaction-manager options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XctOptions {
    /// Maximum number of read-set entries one transaction can hold.
    /// The set is preallocated per worker, so keep it moderate.
    pub max_read_set_size: u32,
    /// Maximum number of write-set entries one transaction can hold.
    pub max_write_set_size: u32,
    /// Maximum number of lock-free (append-only) write-set entries.
    pub max_lock_free_write_set_size: u32,
    /// Per-transaction arena for formatted log entries, in MiB.
    pub local_work_memory_size_mb: u32,
    /// Interval between periodic epoch advances, in milliseconds.
    /// Too frequent becomes an advance bottleneck; too infrequent adds
    /// commit-durability latency.
    pub epoch_advance_interval_ms: u32,
}

impl Default for XctOptions {
    fn default() -> Self {
        Self {
            max_read_set_size: 32 << 10,
            max_write_set_size: 8 << 10,
            max_lock_free_write_set_size: 4 << 10,
            local_work_memory_size_mb: 2,
            epoch_advance_interval_ms: 20,
        }
    }
}

/// Logger options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    /// Per-worker log ring size in KiB.
    pub log_buffer_kb: u32,
    /// When true, the logger accepts all entries and instantly advances
    /// its durable epoch without touching a file. Benchmarking only.
    pub null_log_device: bool,
    /// Directory for the per-worker log files (`worker_<id>.log`).
    pub log_folder: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_buffer_kb: 512 << 10,
            null_log_device: false,
            log_folder: "pactum_logs".to_owned(),
        }
    }
}

/// Worker-thread options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadOptions {
    /// Number of worker threads (one logger and one transaction context
    /// each).
    pub worker_count: u16,
    /// Pin each worker to a CPU core (`worker_id % cores`). Off by
    /// default so tests and CI boxes are unaffected.
    pub pin_workers: bool,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            worker_count: 4,
            pin_workers: false,
        }
    }
}

/// Top-level engine options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub xct: XctOptions,
    pub log: LogOptions,
    pub thread: ThreadOptions,
}

impl EngineOptions {
    /// Build options from defaults plus `PACTUM_*` environment overrides.
    ///
    /// Recognized: `PACTUM_NULL_LOG_DEVICE` (truthy strings enable),
    /// `PACTUM_EPOCH_INTERVAL_MS` (integer).
    #[must_use]
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(raw) = std::env::var("PACTUM_NULL_LOG_DEVICE") {
            options.log.null_log_device = parse_bool_loose(&raw);
        }
        if let Ok(raw) = std::env::var("PACTUM_EPOCH_INTERVAL_MS")
            && let Ok(ms) = raw.trim().parse::<u32>()
            && ms > 0
        {
            options.xct.epoch_advance_interval_ms = ms;
        }
        options
    }
}

/// Loose boolean parsing: recognized affirmatives enable, everything
/// else (including garbage) keeps the safe default of `false`.
#[must_use]
pub fn parse_bool_loose(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
