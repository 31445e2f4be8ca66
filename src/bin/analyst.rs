//! Stage 3 entrypoint: classify stored documents and rebuild the intelligence report.
//!
//! Exits non-zero when the processed directory is missing or holds no documents.

use anyhow::{Context, Result};
use regulink::analyze::{build_engine, run_stage};
use regulink::telemetry::init_tracing;
use regulink::{EngineSelection, PipelineConfig};
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cfg = PipelineConfig::load_default()?;
    init_tracing("analyst", &cfg.paths.log_dir)?;

    let selection = EngineSelection::from_env();
    // never log the key itself
    info!(
        engine = selection.label(),
        key_len = selection.key_len(),
        home_market = %cfg.analyst.home_market,
        "engine selected"
    );
    let engine = build_engine(
        &selection,
        &cfg.analyst.home_market,
        cfg.analyst.request_timeout(),
    )
    .context("building classification engine")?;

    let summary = run_stage(&cfg, engine).await?;
    info!(
        classified = summary.classified,
        reused = summary.reused,
        report = %cfg.paths.report.display(),
        "analyst finished"
    );
    Ok(())
}
