//! Progress snapshot persisted by each worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Row counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl ProgressCounts {
    /// Rows that reached a terminal outcome.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed + self.skipped
    }
}

/// Point-in-time view of a worker's progress.
///
/// Overwritten (not appended) on every persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Worker slot index
    pub worker: u32,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Rows assigned to this worker
    pub total: u64,
    pub timestamp: DateTime<Utc>,
    /// Wall time spent across all runs of this worker
    pub elapsed_secs: f64,
    /// Rows per minute
    pub rate_per_minute: f64,
    /// Estimated seconds until all assigned rows are processed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<f64>,
    /// Set by the final flush once the worker loop ended
    #[serde(default)]
    pub finished: bool,
}

impl ProgressSnapshot {
    pub fn new(worker: u32, counts: ProgressCounts, total: u64, elapsed: Duration) -> Self {
        let elapsed_secs = elapsed.as_secs_f64();
        let processed = counts.processed();

        let rate_per_minute = if elapsed_secs > 0.0 {
            processed as f64 / (elapsed_secs / 60.0)
        } else {
            0.0
        };

        let remaining = total.saturating_sub(processed);
        let eta_secs = if remaining == 0 {
            Some(0.0)
        } else if rate_per_minute > 0.0 {
            Some(remaining as f64 / rate_per_minute * 60.0)
        } else {
            None
        };

        Self {
            worker,
            completed: counts.completed,
            failed: counts.failed,
            skipped: counts.skipped,
            total,
            timestamp: Utc::now(),
            elapsed_secs,
            rate_per_minute,
            eta_secs,
            finished: false,
        }
    }

    pub fn with_finished(mut self, finished: bool) -> Self {
        self.finished = finished;
        self
    }

    /// Whether a later run should continue from this snapshot.
    pub fn is_resumable(&self, total: u64) -> bool {
        !self.finished && self.total == total && self.counts().processed() <= total
    }

    pub fn counts(&self) -> ProgressCounts {
        ProgressCounts {
            completed: self.completed,
            failed: self.failed,
            skipped: self.skipped,
        }
    }

    /// Fraction of processed rows that did not fail, in `[0, 1]`.
    pub fn success_rate(&self) -> f64 {
        let processed = self.counts().processed();
        if processed == 0 {
            return 1.0;
        }
        (self.completed + self.skipped) as f64 / processed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_and_eta() {
        let counts = ProgressCounts {
            completed: 8,
            failed: 1,
            skipped: 1,
        };
        let snap = ProgressSnapshot::new(0, counts, 20, Duration::from_secs(300));

        assert!((snap.rate_per_minute - 2.0).abs() < 1e-9);
        assert!((snap.eta_secs.unwrap() - 300.0).abs() < 1e-9);
        assert!((snap.success_rate() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_eta_unknown_without_progress() {
        let snap = ProgressSnapshot::new(1, ProgressCounts::default(), 5, Duration::ZERO);
        assert_eq!(snap.rate_per_minute, 0.0);
        assert!(snap.eta_secs.is_none());
    }

    #[test]
    fn test_snapshot_json() {
        let snap = ProgressSnapshot::new(3, ProgressCounts::default(), 0, Duration::from_secs(1));
        let json = serde_json::to_string(&snap).unwrap();
        let back: ProgressSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.worker, 3);
        assert_eq!(back.eta_secs, Some(0.0));
        assert!(!back.finished);
    }

    #[test]
    fn test_resumable_only_when_unfinished() {
        let counts = ProgressCounts {
            completed: 2,
            failed: 0,
            skipped: 1,
        };
        let snap = ProgressSnapshot::new(0, counts, 10, Duration::from_secs(60));
        assert!(snap.is_resumable(10));
        assert!(!snap.is_resumable(12));
        assert!(!snap.with_finished(true).is_resumable(10));
    }

    #[test]
    fn test_old_snapshot_without_finished_flag() {
        let json = r#"{"worker":0,"completed":1,"failed":0,"skipped":0,"total":4,
            "timestamp":"2026-01-01T00:00:00Z","elapsed_secs":30.0,"rate_per_minute":2.0}"#;
        let snap: ProgressSnapshot = serde_json::from_str(json).unwrap();
        assert!(!snap.finished);
        assert!(snap.eta_secs.is_none());
    }
}
