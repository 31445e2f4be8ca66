// src/harvest/mod.rs
//! Stage 1: visit every registry row, probe the source with the row's strategy and
//! overwrite the row's notes with a `StatusNote`.

pub mod browser;
pub mod feed;
pub mod types;

use anyhow::{bail, Result};
use metrics::counter;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::pipeline::HarvesterConfig;
use crate::harvest::types::{FeedProbe, HarvestError, PageProbe};
use crate::registry::{HarvestOutcome, OutcomeKind, Registry, SignalKind, StatusNote, Strategy};
use crate::retry::RetryPolicy;
use crate::telemetry::ensure_metrics_described;

pub const API_NOT_BUILT: &str = "API connector not built yet.";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestSummary {
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub unknown: usize,
    pub checkpoints: usize,
    pub checkpoint_errors: usize,
}

impl HarvestSummary {
    fn record(&mut self, kind: OutcomeKind) {
        self.processed += 1;
        match kind {
            OutcomeKind::Success => self.success += 1,
            OutcomeKind::Failed => self.failed += 1,
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::UnknownStrategy => self.unknown += 1,
        }
    }
}

pub struct Harvester {
    feeds: Box<dyn FeedProbe>,
    pages: Box<dyn PageProbe>,
    checkpoint_every: usize,
    scrape_delay: Duration,
    feed_retry: RetryPolicy,
    page_retry: RetryPolicy,
}

impl Harvester {
    pub fn new(feeds: Box<dyn FeedProbe>, pages: Box<dyn PageProbe>, cfg: &HarvesterConfig) -> Self {
        Self {
            feeds,
            pages,
            checkpoint_every: cfg.checkpoint_every,
            scrape_delay: cfg.scrape_delay(),
            feed_retry: RetryPolicy::feed(),
            page_retry: RetryPolicy::browser(),
        }
    }

    pub fn with_retry(mut self, feed: RetryPolicy, page: RetryPolicy) -> Self {
        self.feed_retry = feed;
        self.page_retry = page;
        self
    }

    /// Process every row, checkpointing as it goes. Only a missing, unreadable or empty
    /// registry is fatal; the browser is shut down and the registry saved on every other path.
    pub async fn run(&self, registry_path: &Path) -> Result<HarvestSummary> {
        ensure_metrics_described();
        let mut registry = match Registry::load(registry_path) {
            Ok(r) => r,
            Err(e) => {
                error!(path = %registry_path.display(), error = %format!("{e:#}"), "cannot load registry");
                return Err(e);
            }
        };
        if registry.is_empty() {
            error!(path = %registry_path.display(), "registry has no source rows");
            bail!("no input items: registry {} has no source rows", registry_path.display());
        }
        info!(sources = registry.len(), "loaded registry");

        let mut summary = HarvestSummary::default();
        self.process_rows(&mut registry, registry_path, &mut summary).await;

        self.pages.shutdown().await;
        self.checkpoint(&registry, registry_path, &mut summary);

        info!(
            processed = summary.processed,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            unknown = summary.unknown,
            checkpoint_errors = summary.checkpoint_errors,
            "harvest run complete"
        );
        Ok(summary)
    }

    async fn process_rows(&self, registry: &mut Registry, path: &Path, summary: &mut HarvestSummary) {
        let total = registry.len();
        for index in 0..total {
            let Some(row) = registry.row(index) else {
                continue;
            };
            if row.url.is_empty() {
                continue;
            }
            let source = row.display_name().to_string();
            let url = row.url.to_string();
            let strategy = row.strategy();

            info!(%source, row = index + 1, total, "processing source");
            let outcome = self.harvest_one(&url, &strategy).await;
            match &outcome {
                HarvestOutcome::Failed { error } => error!(%source, %url, %error, "source failed"),
                HarvestOutcome::UnknownStrategy { strategy } => {
                    warn!(%source, %strategy, "unrecognized strategy")
                }
                _ => info!(%source, outcome = outcome.kind().as_str(), "source done"),
            }

            let kind = outcome.kind();
            summary.record(kind);
            counter!("harvest_rows_total", "outcome" => kind.as_str()).increment(1);
            registry.set_notes(index, &StatusNote::new(&outcome).to_string());

            if self.checkpoint_every > 0 && index % self.checkpoint_every == 0 {
                self.checkpoint(registry, path, summary);
            }
        }
    }

    /// Dispatch one row by strategy, with the strategy's retry policy.
    pub async fn harvest_one(&self, url: &str, strategy: &Strategy) -> HarvestOutcome {
        match strategy {
            Strategy::Rss => {
                let feeds = &*self.feeds;
                match self
                    .feed_retry
                    .run("feed", HarvestError::is_transient, move || feeds.latest_title(url))
                    .await
                {
                    Ok(signal) => HarvestOutcome::Success {
                        via: SignalKind::Feed,
                        signal,
                    },
                    Err(e) => HarvestOutcome::Failed {
                        error: e.to_string(),
                    },
                }
            }
            Strategy::Scrape => {
                let pages = &*self.pages;
                match self
                    .page_retry
                    .run("scrape", HarvestError::is_transient, move || pages.page_title(url))
                    .await
                {
                    Ok(signal) => {
                        // polite delay between scrape operations
                        tokio::time::sleep(self.scrape_delay).await;
                        HarvestOutcome::Success {
                            via: SignalKind::Page,
                            signal,
                        }
                    }
                    Err(e) => HarvestOutcome::Failed {
                        error: e.to_string(),
                    },
                }
            }
            Strategy::Api => HarvestOutcome::Skipped {
                reason: API_NOT_BUILT.to_string(),
            },
            Strategy::Unknown(raw) => HarvestOutcome::UnknownStrategy {
                strategy: raw.clone(),
            },
        }
    }

    /// Persist the registry. Failures are logged apart from source failures and never abort.
    fn checkpoint(&self, registry: &Registry, path: &Path, summary: &mut HarvestSummary) {
        match registry.save(path) {
            Ok(()) => {
                summary.checkpoints += 1;
                counter!("harvest_checkpoints_total").increment(1);
                info!(target: "persistence", path = %path.display(), "checkpoint saved");
            }
            Err(e) => {
                summary.checkpoint_errors += 1;
                counter!("harvest_checkpoint_errors_total").increment(1);
                if is_locked(&e) {
                    error!(
                        target: "persistence",
                        path = %path.display(),
                        "could not save registry: file is locked by another program, close it"
                    );
                } else {
                    error!(target: "persistence", path = %path.display(), error = %format!("{e:#}"), "could not save registry");
                }
            }
        }
    }
}

fn is_locked(e: &anyhow::Error) -> bool {
    e.chain().any(|c| {
        c.downcast_ref::<io::Error>()
            .is_some_and(|io| io.kind() == io::ErrorKind::PermissionDenied)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn permission_denied_anywhere_in_the_chain_reads_as_locked() {
        let locked: Result<()> = Err(io::Error::from(io::ErrorKind::PermissionDenied))
            .context("saving registry sources.csv");
        assert!(is_locked(&locked.unwrap_err()));

        let other: Result<()> = Err(io::Error::from(io::ErrorKind::NotFound)).context("saving registry");
        assert!(!is_locked(&other.unwrap_err()));
    }
}
