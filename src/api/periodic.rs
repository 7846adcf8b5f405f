//! Background estimation
//!
//! Runs estimation on its own thread at a fixed interval so slow solves never
//! hold up ingestion. Readers pick up the most recent report.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::api::service::PositioningService;
use crate::api::types::EstimateReport;

/// Granularity at which the worker checks for shutdown while waiting
const STOP_POLL: Duration = Duration::from_millis(50);

struct Shared {
    latest: RwLock<Option<Arc<EstimateReport>>>,
    running: AtomicBool,
    passes: AtomicU64,
}

pub struct PeriodicEstimator {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicEstimator {
    /// Start estimating every `interval`. The first pass runs immediately.
    pub fn spawn(service: Arc<PositioningService>, interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            latest: RwLock::new(None),
            running: AtomicBool::new(true),
            passes: AtomicU64::new(0),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::spawn(move || {
            while worker.running.load(Ordering::Acquire) {
                let started = Instant::now();
                let report = service.estimate_positions(Utc::now());
                debug!(
                    located = report.located,
                    unavailable = report.unavailable,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "estimation pass finished"
                );
                *worker.latest.write() = Some(Arc::new(report));
                worker.passes.fetch_add(1, Ordering::AcqRel);

                let deadline = started + interval;
                while worker.running.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    thread::sleep(STOP_POLL.min(deadline - now));
                }
            }
        });

        Self { shared, handle: Some(handle) }
    }

    /// Most recent report, `None` before the first pass completes
    pub fn latest(&self) -> Option<Arc<EstimateReport>> {
        self.shared.latest.read().clone()
    }

    /// Number of completed passes
    pub fn passes(&self) -> u64 {
        self.shared.passes.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for the current pass to finish.
    ///
    /// Returns `false` if the worker died from a panic. Later calls return `true`.
    pub fn stop(&mut self) -> bool {
        self.shared.running.store(false, Ordering::Release);
        match self.handle.take() {
            Some(handle) => join_worker(handle),
            None => true,
        }
    }
}

fn join_worker(handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(%message, "estimation worker panicked");
            false
        }
    }
}

impl Drop for PeriodicEstimator {
    fn drop(&mut self) {
        self.stop();
    }
}
