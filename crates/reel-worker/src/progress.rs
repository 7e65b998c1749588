//! Worker progress counters with periodic persistence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use reel_models::keys::progress_key;
use reel_models::{Outcome, ProgressCounts, ProgressSnapshot};
use reel_storage::{get_json, put_json, ObjectStore};

use crate::metrics;

/// Counts row outcomes and persists a snapshot every `every` updates.
///
/// A snapshot left behind by an interrupted run with the same row total is
/// picked up again: its elapsed time carries over and its counters are kept
/// as [`resumed`](Self::resumed). Counters restart at zero because the
/// worker revisits every assigned row; rows published before the
/// interruption come back as skipped. Persisting never fails the worker.
pub struct ProgressTracker {
    store: Arc<dyn ObjectStore>,
    worker: u32,
    total: u64,
    every: u64,
    counts: ProgressCounts,
    resumed: ProgressCounts,
    prior_elapsed: Duration,
    started: Instant,
    since_persist: u64,
}

impl ProgressTracker {
    /// Fresh tracker that ignores any persisted state.
    pub fn new(store: Arc<dyn ObjectStore>, worker: u32, total: u64, every: u64) -> Self {
        Self {
            store,
            worker,
            total,
            every: every.max(1),
            counts: ProgressCounts::default(),
            resumed: ProgressCounts::default(),
            prior_elapsed: Duration::ZERO,
            started: Instant::now(),
            since_persist: 0,
        }
    }

    /// Tracker seeded from this worker's persisted snapshot, if one applies.
    pub async fn load(store: Arc<dyn ObjectStore>, worker: u32, total: u64, every: u64) -> Self {
        let mut tracker = Self::new(store, worker, total, every);
        let key = progress_key(worker);

        match get_json::<ProgressSnapshot>(tracker.store.as_ref(), &key).await {
            Ok(snapshot) if snapshot.is_resumable(total) => {
                info!(
                    worker,
                    completed = snapshot.completed,
                    failed = snapshot.failed,
                    skipped = snapshot.skipped,
                    "Resuming progress from {}",
                    key
                );
                tracker.resumed = snapshot.counts();
                tracker.prior_elapsed = Duration::from_secs_f64(snapshot.elapsed_secs.max(0.0));
            }
            Ok(snapshot) => {
                debug!(
                    worker,
                    finished = snapshot.finished,
                    prior_total = snapshot.total,
                    "Previous progress does not apply, starting fresh"
                );
            }
            Err(e) if e.is_not_found() => {
                debug!(worker, "No previous progress at {}", key);
            }
            Err(e) => {
                warn!(worker, "Failed to load progress from {}: {}", key, e);
            }
        }

        tracker
    }

    /// Counters of the interrupted run this tracker picked up, if any.
    pub fn resumed(&self) -> ProgressCounts {
        self.resumed
    }

    pub async fn mark_completed(&mut self) {
        self.counts.completed += 1;
        self.after_update().await;
    }

    pub async fn mark_failed(&mut self) {
        self.counts.failed += 1;
        self.after_update().await;
    }

    pub async fn mark_skipped(&mut self) {
        self.counts.skipped += 1;
        self.after_update().await;
    }

    /// Count an outcome under its status.
    pub async fn record(&mut self, outcome: &Outcome) {
        if outcome.is_completed() {
            self.mark_completed().await;
        } else if outcome.is_skipped() {
            self.mark_skipped().await;
        } else {
            self.mark_failed().await;
        }
    }

    pub fn counts(&self) -> ProgressCounts {
        self.counts
    }

    /// Wall time across this and any resumed run.
    pub fn elapsed(&self) -> Duration {
        self.prior_elapsed + self.started.elapsed()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::new(self.worker, self.counts, self.total, self.elapsed())
    }

    /// Persist a final snapshot unconditionally.
    pub async fn flush(&mut self) -> ProgressSnapshot {
        let snapshot = self.snapshot().with_finished(true);
        self.persist(&snapshot).await;
        self.since_persist = 0;
        snapshot
    }

    async fn after_update(&mut self) {
        metrics::set_rows_remaining(self.total.saturating_sub(self.counts.processed()));

        self.since_persist += 1;
        if self.since_persist >= self.every {
            let snapshot = self.snapshot();
            self.persist(&snapshot).await;
            self.since_persist = 0;
        }
    }

    async fn persist(&self, snapshot: &ProgressSnapshot) {
        let key = progress_key(self.worker);
        match put_json(self.store.as_ref(), &key, snapshot).await {
            Ok(()) => debug!(
                worker = self.worker,
                processed = snapshot.counts().processed(),
                total = snapshot.total,
                "Progress persisted"
            ),
            Err(e) => {
                metrics::record_progress_persist_failure();
                warn!(worker = self.worker, "Failed to persist progress to {}: {}", key, e);
            }
        }
    }
}
