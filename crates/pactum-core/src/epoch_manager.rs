//! The global epoch state machine.
//!
//! One `current` epoch is stamped onto new commits; `grace` is
//! `current - 1`, whose commits are being flushed; `durable` is the
//! highest epoch every registered logger has written to stable storage.
//!
//! The advance path is lock-free for readers: workers only ever
//! acquire-load the current epoch. Advancing itself is serialized by a
//! mutex (it is rare: a 20 ms tick or an on-demand request) and
//! publishes the new epoch with a release-store after a full fence, so
//! a commit that read epoch `E'` also observes everything the advancing
//! thread did before publishing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering, fence};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::epoch::Epoch;
use crate::options::XctOptions;

/// A per-logger durable watermark: the highest epoch that logger has
/// flushed. Registered with the manager; the manager's durable epoch is
/// the minimum across all of them.
pub type DurableWatermark = Arc<AtomicU32>;

/// Drives the monotonically advancing global epoch.
pub struct EpochManager {
    current: AtomicU32,
    durable: AtomicU32,
    advance_mutex: Mutex<()>,
    watermarks: RwLock<Vec<DurableWatermark>>,
    interval: Duration,
    // Ticker shutdown handshake: the flag under the mutex, so a stop
    // request is never missed between the check and the wait.
    ticker_stop: Mutex<bool>,
    ticker_wake: Condvar,
    ticker: Mutex<Option<JoinHandle<()>>>,
    durable_mutex: Mutex<()>,
    durable_wake: Condvar,
    stopped: AtomicBool,
}

impl EpochManager {
    #[must_use]
    pub fn new(options: &XctOptions) -> Self {
        Self {
            current: AtomicU32::new(Epoch::INITIAL.value()),
            durable: AtomicU32::new(Epoch::INVALID.value()),
            advance_mutex: Mutex::new(()),
            watermarks: RwLock::new(Vec::new()),
            interval: Duration::from_millis(options.epoch_advance_interval_ms as u64),
            ticker_stop: Mutex::new(false),
            ticker_wake: Condvar::new(),
            ticker: Mutex::new(None),
            durable_mutex: Mutex::new(()),
            durable_wake: Condvar::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// The epoch being stamped onto new commits.
    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        Epoch::new(self.current.load(Ordering::Acquire))
    }

    /// `current - 1`: the newest closed epoch, whose commits are being
    /// flushed.
    #[must_use]
    pub fn grace_epoch(&self) -> Epoch {
        self.current_epoch().prev()
    }

    /// The highest epoch every logger has made stable.
    #[must_use]
    pub fn durable_epoch(&self) -> Epoch {
        Epoch::new(self.durable.load(Ordering::Acquire))
    }

    /// Register a logger's durable watermark. Done once per logger at
    /// engine initialization, before any commit.
    #[must_use]
    pub fn register_logger(&self) -> DurableWatermark {
        let watermark: DurableWatermark = Arc::new(AtomicU32::new(Epoch::INVALID.value()));
        self.watermarks.write().push(Arc::clone(&watermark));
        watermark
    }

    /// Advance the current epoch by one and return the new value.
    ///
    /// Used by the periodic ticker and on demand: when a synchronous
    /// commit waits for durability, or when a storage-creation log must
    /// be isolated in its own epoch.
    pub fn advance(&self) -> Epoch {
        let _guard = self.advance_mutex.lock();
        let proposed = self.current.load(Ordering::Acquire) + 1;
        // Everything before the publication must be globally visible
        // before any worker can stamp the new epoch.
        fence(Ordering::SeqCst);
        self.current.store(proposed, Ordering::Release);
        Epoch::new(proposed)
    }

    /// Recompute the durable epoch from the registered watermarks.
    /// Called by loggers whenever they report flush progress.
    pub fn refresh_durable(&self) -> Epoch {
        let watermarks = self.watermarks.read();
        let min = watermarks
            .iter()
            .map(|w| w.load(Ordering::Acquire))
            .min()
            // With no loggers (pure in-memory runs) everything closed is
            // trivially durable.
            .unwrap_or_else(|| self.grace_epoch().value());
        drop(watermarks);

        let durable = self.durable.fetch_max(min, Ordering::AcqRel).max(min);
        let _guard = self.durable_mutex.lock();
        self.durable_wake.notify_all();
        Epoch::new(durable)
    }

    /// Block until the durable epoch reaches `epoch`.
    ///
    /// Forces on-demand advances while `epoch` is still open, so a
    /// synchronous commit does not wait a full tick for its epoch to
    /// close.
    pub fn wait_for_durable(&self, epoch: Epoch) {
        loop {
            if self.durable_epoch() >= epoch {
                return;
            }
            if self.current_epoch() <= epoch {
                self.advance();
            }
            self.refresh_durable();
            if self.durable_epoch() >= epoch {
                return;
            }
            let mut guard = self.durable_mutex.lock();
            // Re-check under the lock, then sleep briefly; loggers
            // notify on every progress report.
            if self.durable_epoch() < epoch {
                self.durable_wake.wait_for(&mut guard, Duration::from_millis(1));
            }
        }
    }

    /// Spawn the periodic advance ticker.
    pub fn start_ticker(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let mut slot = self.ticker.lock();
        debug_assert!(slot.is_none(), "ticker already running");
        *slot = Some(
            std::thread::Builder::new()
                .name("pactum-epoch-ticker".to_owned())
                .spawn(move || manager.ticker_loop())
                .expect("spawn epoch ticker"),
        );
    }

    fn ticker_loop(&self) {
        loop {
            {
                let mut stop = self.ticker_stop.lock();
                if *stop {
                    return;
                }
                self.ticker_wake.wait_for(&mut stop, self.interval);
                if *stop {
                    return;
                }
            }
            self.advance();
            self.refresh_durable();
        }
    }

    /// Stop the ticker and perform one final advance so the last
    /// commits' epoch closes. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut stop = self.ticker_stop.lock();
            *stop = true;
            self.ticker_wake.notify_all();
        }
        if let Some(handle) = self.ticker.lock().take() {
            handle.join().expect("epoch ticker panicked");
        }
        self.advance();
        self.refresh_durable();
    }
}

impl Drop for EpochManager {
    fn drop(&mut self) {
        self.stop();
    }
}
