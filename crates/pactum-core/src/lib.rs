//! # pactum-core
//!
//! A log-structured, in-memory OLTP transactional core. Optimistic
//! concurrency control over per-record 64-bit version tags, per-worker
//! epoch-based durability, and fixed-layout log records for three
//! storage families (fixed-offset array, two-bin hash, sequential
//! append).
//!
//! The engine's collaborators — snapshot composers, the page pool and
//! NUMA allocator, log-file rotation and savepoints, the ordered-index
//! implementation, drivers and metrics — live behind interfaces;
//! this crate is the part where memory ordering, lock-word layout, and
//! epoch transitions decide whether the database is correct.

pub mod engine;
pub mod epoch;
pub mod epoch_manager;
pub mod error;
pub mod log;
pub mod options;
pub mod storage;
pub mod thread_ctx;
pub mod xct;

pub use engine::Engine;
pub use epoch::Epoch;
pub use error::{CoreResult, ErrorCode};
pub use options::EngineOptions;
pub use xct::xct::IsolationLevel;
