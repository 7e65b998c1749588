//! Batch rendering worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_media::{check_chromium, check_ffmpeg, check_ffprobe, ChromeCapture, Encoder};
use reel_models::RowSet;
use reel_storage::{ObjectStore, R2Client, RetryingStore};
use reel_worker::metrics::init_metrics;
use reel_worker::{
    assign_rows, load_rows, ExitStatus, OverlaySet, RowPipeline, Worker, WorkerConfig,
    WorkerError, WorkerResult,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();
    info!("Starting reel-worker");

    let code = match run().await {
        Ok(status) => status.code(),
        Err(e) => {
            error!("Fatal: {}", e);
            ExitStatus::Fatal.code()
        }
    };

    info!("Worker shutdown complete (exit code {})", code);
    std::process::exit(code);
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,aws=warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> WorkerResult<ExitStatus> {
    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);
    init_metrics(config.metrics_port);

    check_ffmpeg().map_err(|e| WorkerError::validation(e.to_string()))?;
    check_ffprobe().map_err(|e| WorkerError::validation(e.to_string()))?;
    check_chromium(&config.capture.binary).map_err(|e| WorkerError::validation(e.to_string()))?;

    let r2 = config
        .storage
        .clone()
        .map(R2Client::new)
        .ok_or_else(|| WorkerError::config_error("object storage is not configured"))?;
    r2.check_connectivity()
        .await
        .map_err(|e| WorkerError::validation(e.to_string()))?;
    info!(bucket = r2.bucket(), "Object storage reachable");

    let store: Arc<dyn ObjectStore> =
        Arc::new(RetryingStore::new(Arc::new(r2), config.retry.clone()));

    tokio::fs::create_dir_all(&config.work_dir).await?;

    let rows = load_rows(&config, store.as_ref()).await?;
    let assigned = assign_rows(&config, &rows);
    info!(
        worker = %config.slot,
        assigned = assigned.len(),
        of = rows.len(),
        "Rows assigned"
    );

    let categories = RowSet::categories(assigned.iter().map(|a| &a.row));
    let overlays = OverlaySet::fetch(
        store.as_ref(),
        &config.overlay_prefix,
        &categories,
        &config.overlay_dir(),
    )
    .await;
    if !overlays.missing().is_empty() {
        error!(
            "No usable overlay for categories {:?}; their rows will fail",
            overlays.missing()
        );
    }

    let pipeline = RowPipeline::new(
        &config,
        store.clone(),
        Arc::new(ChromeCapture::new(config.capture.clone())),
        Encoder::ffmpeg(config.encoding.clone(), config.render_timeout),
        Arc::new(overlays),
    );

    let worker = Worker::new(config, store, pipeline);
    let summary = worker.run(&assigned).await;
    Ok(summary.exit_status())
}
