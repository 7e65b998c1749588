//! Per-worker result files and the final merge.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use reel_models::keys::{
    content_type_for_key, parse_worker_results_key, worker_done_key, worker_results_key,
    MASTER_RESULTS_KEY, RESULTS_PREFIX,
};
use reel_models::{read_records, write_records, Outcome, OutcomeRecord, RecordStatus};
use reel_storage::ObjectStore;

use crate::config::MergeSettings;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Collects this worker's outcome records.
///
/// The table is rewritten locally and uploaded after every outcome, so an
/// interrupted worker leaves a usable result file behind.
pub struct ResultAggregator {
    store: Arc<dyn ObjectStore>,
    worker: u32,
    local_path: PathBuf,
    records: Vec<OutcomeRecord>,
}

impl ResultAggregator {
    pub fn new(store: Arc<dyn ObjectStore>, worker: u32, local_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            worker,
            local_path: local_path.into(),
            records: Vec::new(),
        }
    }

    /// Carry forward records from this worker's previous result file.
    ///
    /// Returns how many were loaded. A missing or unreadable file yields an
    /// empty table.
    pub async fn load_prior(&mut self) -> usize {
        let key = worker_results_key(self.worker);
        let data = match self.store.get(&key).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!(worker = self.worker, "No previous results at {}", key);
                return 0;
            }
            Err(e) => {
                warn!(worker = self.worker, "Failed to load previous results {}: {}", key, e);
                return 0;
            }
        };

        match read_records(&data) {
            Ok(records) => {
                info!(
                    worker = self.worker,
                    "Carrying forward {} records from {}",
                    records.len(),
                    key
                );
                self.records = records;
                self.records.len()
            }
            Err(e) => {
                warn!(worker = self.worker, "Ignoring unparsable results {}: {}", key, e);
                0
            }
        }
    }

    pub fn records(&self) -> &[OutcomeRecord] {
        &self.records
    }

    /// Record an outcome and publish the updated table.
    ///
    /// A record replaces the earlier one for the same identity, except that
    /// a skip never hides an earlier completion.
    pub async fn record(&mut self, outcome: &Outcome) -> WorkerResult<()> {
        self.upsert(outcome.to_record());

        let data = write_records(&self.records)?;
        if let Some(parent) = self.local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.local_path, &data).await?;

        let key = worker_results_key(self.worker);
        self.store
            .put(&key, data, content_type_for_key(&key))
            .await
            .map_err(|e| WorkerError::upload_failed(format!("{}: {}", key, e)))
    }

    /// Upload this worker's completion marker.
    pub async fn mark_done(&self) -> WorkerResult<()> {
        let key = worker_done_key(self.worker);
        let body = chrono::Utc::now().to_rfc3339().into_bytes();
        self.store
            .put(&key, body, content_type_for_key(&key))
            .await
            .map_err(|e| WorkerError::upload_failed(format!("{}: {}", key, e)))
    }

    fn upsert(&mut self, record: OutcomeRecord) {
        match self
            .records
            .iter_mut()
            .find(|existing| existing.identity == record.identity)
        {
            Some(existing) => {
                let keeps_completion = record.status == RecordStatus::Skipped
                    && existing.status == RecordStatus::Completed;
                if !keeps_completion {
                    *existing = record;
                }
            }
            None => self.records.push(record),
        }
    }
}

/// What the merge step produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Worker indices whose result files were merged, ascending
    pub merged_workers: Vec<u32>,
    /// Result files that could not be downloaded or parsed
    pub skipped_files: Vec<String>,
    /// Completion markers present when the wait ended
    pub markers_seen: u32,
    /// Records in the master file
    pub records: usize,
    pub waited: Duration,
}

/// Merge all worker result files into the master file.
///
/// Waits until every worker's completion marker exists or the grace period
/// runs out, then concatenates the result files in worker-index order.
pub async fn merge(
    store: &dyn ObjectStore,
    total_workers: u32,
    settings: MergeSettings,
) -> WorkerResult<MergeReport> {
    let started = Instant::now();
    let markers_seen = wait_for_markers(store, total_workers, settings).await;
    if markers_seen < total_workers {
        warn!(
            "Merging with {}/{} completion markers after {:.0}s",
            markers_seen,
            total_workers,
            started.elapsed().as_secs_f64()
        );
    }

    let mut sources: Vec<(u32, String)> = store
        .list(RESULTS_PREFIX)
        .await?
        .into_iter()
        .filter_map(|info| parse_worker_results_key(&info.key).map(|w| (w, info.key)))
        .filter(|(w, key)| {
            let current = *w < total_workers;
            if !current {
                debug!("Ignoring {} from a larger deployment", key);
            }
            current
        })
        .collect();
    sources.sort_by_key(|(w, _)| *w);

    let mut report = MergeReport {
        markers_seen,
        ..MergeReport::default()
    };
    let mut merged: Vec<OutcomeRecord> = Vec::new();

    for (worker, key) in sources {
        let parsed = match store.get(&key).await {
            Ok(data) => read_records(&data).map_err(WorkerError::from),
            Err(e) => Err(WorkerError::from(e)),
        };
        match parsed {
            Ok(records) => {
                debug!(worker, "Merging {} records from {}", records.len(), key);
                merged.extend(records);
                report.merged_workers.push(worker);
            }
            Err(e) => {
                warn!(worker, "Skipping result file {}: {}", key, e);
                report.skipped_files.push(key);
            }
        }
    }

    let data = write_records(&merged)?;
    store
        .put(MASTER_RESULTS_KEY, data, content_type_for_key(MASTER_RESULTS_KEY))
        .await
        .map_err(|e| WorkerError::upload_failed(format!("{}: {}", MASTER_RESULTS_KEY, e)))?;

    report.records = merged.len();
    report.waited = started.elapsed();
    metrics::set_merged_records(report.records);
    info!(
        records = report.records,
        workers = report.merged_workers.len(),
        skipped = report.skipped_files.len(),
        "Master results written to {}",
        MASTER_RESULTS_KEY
    );

    Ok(report)
}

async fn wait_for_markers(store: &dyn ObjectStore, total: u32, settings: MergeSettings) -> u32 {
    let deadline = Instant::now() + settings.grace;
    loop {
        let mut seen = 0;
        for worker in 0..total {
            match store.head(&worker_done_key(worker)).await {
                Ok(true) => seen += 1,
                Ok(false) => {}
                Err(e) => debug!(worker, "Marker check failed: {}", e),
            }
        }

        let now = Instant::now();
        if seen >= total || now >= deadline {
            return seen;
        }

        info!("Waiting for workers: {}/{} finished", seen, total);
        let pause = settings.poll_interval.min(deadline - now);
        tokio::time::sleep(pause).await;
    }
}
