//! Stage progress reporting
//!
//! Workers bump atomic counters; a timer task samples them every two
//! seconds and logs a summary line. Purely observational - nothing
//! reads these counters for control flow.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

const REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Shared per-stage counters
#[derive(Debug, Default)]
pub struct Counters {
    pub processed: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
    pub bytes: AtomicI64,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, bytes: i64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64, u64, i64) {
        (
            self.processed.load(Ordering::Relaxed),
            self.succeeded.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.bytes.load(Ordering::Relaxed),
        )
    }
}

/// Background reporter sampling the counters on a fixed interval
pub struct ProgressReporter {
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    /// Spawn the reporter for a stage
    pub fn start(stage: &'static str, counters: Arc<Counters>, total: u64) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(REPORT_INTERVAL);
            interval.tick().await; // first tick completes immediately

            loop {
                interval.tick().await;
                let (processed, succeeded, failed, skipped, bytes) = counters.snapshot();
                tracing::info!(
                    "{}: {}/{} processed ({} ok, {} failed, {} skipped, {} bytes)",
                    stage,
                    processed,
                    total,
                    succeeded,
                    failed,
                    skipped,
                    bytes
                );
            }
        });

        Self { handle }
    }

    /// Stop sampling; the final stage summary is logged by the caller
    pub fn stop(self) {
        self.handle.abort();
    }
}
