//! Logging: record formats, the per-transaction arena, the per-worker
//! logger, and recovery replay.

pub mod arena;
pub mod logger;
pub mod replay;
pub mod types;
