// src/telemetry.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for one stage: stdout plus `<log_dir>/<stage>.log`.
///
/// `RUST_LOG` overrides the default `info` filter; `REGULINK_LOG_JSON=1` switches
/// stdout to JSON lines.
pub fn init_tracing(stage: &str, log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;
    let log_path = log_dir.join(format!("{stage}.log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("REGULINK_LOG_JSON").ok().as_deref() == Some("1");

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file));

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    let installed = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    installed.context("installing tracing subscriber")?;

    Ok(())
}

/// One-time metrics registration (so series carry descriptions once a recorder exists).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("harvest_rows_total", "Registry rows processed, by outcome.");
        describe_counter!("harvest_checkpoints_total", "Successful registry saves.");
        describe_counter!(
            "harvest_checkpoint_errors_total",
            "Registry saves that failed (file locked, disk errors)."
        );
        describe_histogram!("harvest_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!("refine_documents_saved_total", "RawDocuments written.");
        describe_counter!("refine_skipped_total", "Rows skipped by the Refiner, by reason.");
        describe_counter!(
            "analyst_engine_calls_total",
            "Successful classification engine calls, by engine."
        );
        describe_counter!(
            "analyst_filtered_total",
            "Documents rejected before classification, by reason."
        );
        describe_counter!("analyst_records_total", "ClassificationRecords written.");
        describe_gauge!("report_rows", "Rows in the last written report.");
    });
}
