//! Stage 2 entrypoint: download and store the article text of every successful source.
//!
//! Exits non-zero when the registry is missing or has no rows.

use anyhow::{Context, Result};
use regulink::browserless::BrowserlessClient;
use regulink::refine::source::{ArticleSource, HttpArticleSource};
use regulink::telemetry::init_tracing;
use regulink::{JsonDirStore, PipelineConfig, RawDocument, Refiner};
use std::sync::Arc;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cfg = PipelineConfig::load_default()?;
    init_tracing("refiner", &cfg.paths.log_dir)?;

    let store = JsonDirStore::<RawDocument>::create(&cfg.paths.processed_dir)
        .context("preparing processed documents directory")?;

    let client = cfg.http.build_client()?;
    let source: Arc<dyn ArticleSource> = match cfg.harvester.browserless_url.as_deref() {
        Some(base) => {
            let browserless = BrowserlessClient::new(
                base,
                cfg.harvester.browserless_token.as_deref(),
                cfg.harvester.navigation_timeout(),
            )
            .context("building Browserless client")?;
            Arc::new(HttpArticleSource::with_browserless(client, browserless))
        }
        None => Arc::new(HttpArticleSource::new(client)),
    };

    info!(
        delay_secs = cfg.refiner.delay_secs,
        out = %cfg.paths.processed_dir.display(),
        "starting refiner"
    );
    let summary = Refiner::new(source, Arc::new(store), &cfg.refiner)
        .run(&cfg.paths.registry)
        .await?;
    info!(saved = summary.saved, "refiner finished");
    Ok(())
}
