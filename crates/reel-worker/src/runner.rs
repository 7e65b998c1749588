//! Worker main loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use reel_models::{parse_rows, InputRow, ProgressCounts};
use reel_storage::ObjectStore;

use crate::config::{InputSource, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RowLogger;
use crate::metrics;
use crate::partition::{partition, AssignedRow};
use crate::pipeline::RowPipeline;
use crate::progress::ProgressTracker;
use crate::results::{merge, MergeReport, ResultAggregator};

/// Process exit status of a worker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every row completed or was skipped
    Success,
    /// Startup failed before any row ran
    Fatal,
    /// At least one row failed
    PartialFailure,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Fatal => 1,
            ExitStatus::PartialFailure => 2,
        }
    }
}

/// Totals of one worker run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub worker: u32,
    /// Rows assigned to this worker after the batch cap
    pub assigned: usize,
    /// Outcomes of this run; rows published earlier count as skipped
    pub counts: ProgressCounts,
    pub elapsed: Duration,
    /// Present on the merging worker when the merge succeeded
    pub merge: Option<MergeReport>,
    /// The merging worker could not write the master file
    pub merge_failed: bool,
}

impl RunSummary {
    pub fn exit_status(&self) -> ExitStatus {
        if self.counts.failed > 0 || self.merge_failed {
            ExitStatus::PartialFailure
        } else {
            ExitStatus::Success
        }
    }

    /// Fraction of processed rows that did not fail.
    pub fn success_rate(&self) -> f64 {
        let processed = self.counts.processed();
        if processed == 0 {
            1.0
        } else {
            (self.counts.completed + self.counts.skipped) as f64 / processed as f64
        }
    }
}

/// Read and parse the input row list.
///
/// Any failure here is a startup validation error.
pub async fn load_rows(config: &WorkerConfig, store: &dyn ObjectStore) -> WorkerResult<Vec<InputRow>> {
    let (origin, data) = match &config.input {
        InputSource::Remote(key) => {
            let data = store.get(key).await.map_err(|e| {
                WorkerError::validation(format!("input list {} unreadable: {}", key, e))
            })?;
            (key.clone(), data)
        }
        InputSource::Local(path) => {
            let data = tokio::fs::read(path).await.map_err(|e| {
                WorkerError::validation(format!("input list {} unreadable: {}", path.display(), e))
            })?;
            (path.display().to_string(), data)
        }
    };

    let set = parse_rows(&data)
        .map_err(|e| WorkerError::validation(format!("input list {} invalid: {}", origin, e)))?;
    for rejected in &set.rejected {
        warn!("Input line {} rejected: {}", rejected.line, rejected.reason);
    }
    info!(
        rows = set.rows.len(),
        rejected = set.rejected.len(),
        "Loaded input list from {}",
        origin
    );

    Ok(set.rows)
}

/// Rows this worker owns, capped by the configured batch size.
pub fn assign_rows(config: &WorkerConfig, rows: &[InputRow]) -> Vec<AssignedRow> {
    let mut assigned = partition(rows, config.slot);
    if let Some(cap) = config.batch_size {
        if assigned.len() > cap {
            info!(
                "Batch size caps worker {} at {} of {} rows",
                config.slot,
                cap,
                assigned.len()
            );
            assigned.truncate(cap);
        }
    }
    assigned
}

/// Drives the row pipeline over a worker's assigned rows.
pub struct Worker {
    config: WorkerConfig,
    store: Arc<dyn ObjectStore>,
    pipeline: RowPipeline,
}

impl Worker {
    pub fn new(config: WorkerConfig, store: Arc<dyn ObjectStore>, pipeline: RowPipeline) -> Self {
        Self {
            config,
            store,
            pipeline,
        }
    }

    /// Process `rows` sequentially, then publish the completion marker and,
    /// on the highest worker, merge all result files.
    pub async fn run(&self, rows: &[AssignedRow]) -> RunSummary {
        let slot = self.config.slot;
        let worker = slot.index();
        let total = rows.len();

        let mut progress = ProgressTracker::load(
            self.store.clone(),
            worker,
            total as u64,
            self.config.progress_every,
        )
        .await;
        let mut results = ResultAggregator::new(self.store.clone(), worker, self.results_path());
        results.load_prior().await;

        let resumed = progress.resumed();
        if resumed.processed() > 0 {
            info!(
                worker,
                "Interrupted run got through {} of {} rows, revisiting all of them",
                resumed.processed(),
                total
            );
        }
        info!(worker, slot = %slot, rows = total, "Worker started");

        for (done, assigned) in rows.iter().enumerate() {
            if done > 0
                && self.config.recycle_every > 0
                && done % self.config.recycle_every == 0
            {
                self.recycle_capture().await;
            }

            let started = Instant::now();
            let logger = RowLogger::new(worker, assigned.index, &assigned.row);
            let outcome = self.pipeline.process(&assigned.row, &logger).await;
            let row_secs = started.elapsed().as_secs_f64();

            logger.log_outcome(&outcome, row_secs, progress.elapsed().as_secs_f64());
            metrics::record_row(&outcome, row_secs);

            if let Err(e) = results.record(&outcome).await {
                warn!(worker, identity = %assigned.row.identity, "Failed to publish results: {}", e);
            }
            progress.record(&outcome).await;
        }

        let snapshot = progress.flush().await;
        if let Err(e) = results.mark_done().await {
            warn!(worker, "Failed to publish completion marker: {}", e);
        }

        let mut merge_failed = false;
        let merge_report = if slot.is_merger() {
            match merge(self.store.as_ref(), slot.total(), self.config.merge).await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(worker, "Merge failed: {}", e);
                    merge_failed = true;
                    None
                }
            }
        } else {
            None
        };

        let summary = RunSummary {
            worker,
            assigned: total,
            counts: snapshot.counts(),
            elapsed: progress.elapsed(),
            merge: merge_report,
            merge_failed,
        };
        info!(
            worker,
            completed = summary.counts.completed,
            failed = summary.counts.failed,
            skipped = summary.counts.skipped,
            "Worker finished: {}/{} rows, {:.1}% success, {:.0}s elapsed",
            summary.counts.processed(),
            summary.assigned,
            summary.success_rate() * 100.0,
            summary.elapsed.as_secs_f64()
        );
        summary
    }

    async fn recycle_capture(&self) {
        info!(worker = self.config.slot.index(), "Recycling browser state");
        metrics::record_browser_recycle();
        if let Err(e) = self.pipeline.capture().recycle().await {
            warn!("Browser recycle failed: {}", e);
        }
    }

    fn results_path(&self) -> PathBuf {
        self.config
            .work_dir
            .join("results")
            .join(format!("worker_{}.csv", self.config.slot.index()))
    }
}
