//! Stage 1 entrypoint: probe every registry source and write a status note back per row.
//!
//! Exits non-zero when the registry is missing or has no rows.

use anyhow::{Context, Result};
use regulink::browserless::BrowserlessClient;
use regulink::harvest::browser::{BrowserlessPageProbe, ChromeSession};
use regulink::harvest::feed::FeedReader;
use regulink::harvest::types::PageProbe;
use regulink::harvest::Harvester;
use regulink::telemetry::init_tracing;
use regulink::PipelineConfig;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let cfg = PipelineConfig::load_default()?;
    init_tracing("harvester", &cfg.paths.log_dir)?;

    let feeds = Box::new(FeedReader::from_client(cfg.http.build_client()?));
    let pages: Box<dyn PageProbe> = match cfg.harvester.browserless_url.as_deref() {
        Some(base) => {
            info!(base, "scrape sources render through Browserless");
            let client = BrowserlessClient::new(
                base,
                cfg.harvester.browserless_token.as_deref(),
                cfg.harvester.navigation_timeout(),
            )
            .context("building Browserless client")?;
            Box::new(BrowserlessPageProbe::new(client))
        }
        None => Box::new(ChromeSession::new(
            &cfg.http.user_agent,
            cfg.harvester.navigation_timeout(),
        )),
    };

    info!(registry = %cfg.paths.registry.display(), "starting harvester");
    let summary = Harvester::new(feeds, pages, &cfg.harvester)
        .run(&cfg.paths.registry)
        .await?;
    info!(
        success = summary.success,
        failed = summary.failed,
        "harvester finished, registry updated"
    );
    Ok(())
}
