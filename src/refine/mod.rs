// src/refine/mod.rs
//! Stage 2: for every row the Harvester marked successful, download the article once
//! and store its clean text under the URL's content address.

pub mod extract;
pub mod source;

use anyhow::{bail, Result};
use chrono::Local;
use metrics::counter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::pipeline::RefinerConfig;
use crate::documents::RawDocument;
use crate::refine::source::{ArticleSource, RefineError};
use crate::registry::{is_success_note, Registry};
use crate::retry::RetryPolicy;
use crate::store::{ContentAddress, DocumentStore};
use crate::telemetry::ensure_metrics_described;
use crate::text::char_len;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefineSummary {
    pub selected: usize,
    pub invalid_url: usize,
    pub already_present: usize,
    pub saved: usize,
    pub too_short: usize,
    pub failed: usize,
}

/// Scheme and host are both required.
pub fn is_valid_url(raw: &str) -> bool {
    match url::Url::parse(raw.trim()) {
        Ok(u) => !u.scheme().is_empty() && u.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

pub struct Refiner {
    source: Arc<dyn ArticleSource>,
    store: Arc<dyn DocumentStore<RawDocument>>,
    min_content_chars: usize,
    delay: Duration,
    retry: RetryPolicy,
}

impl Refiner {
    pub fn new(
        source: Arc<dyn ArticleSource>,
        store: Arc<dyn DocumentStore<RawDocument>>,
        cfg: &RefinerConfig,
    ) -> Self {
        Self {
            source,
            store,
            min_content_chars: cfg.min_content_chars,
            delay: cfg.delay(),
            retry: RetryPolicy::download(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(&self, registry_path: &Path) -> Result<RefineSummary> {
        ensure_metrics_described();
        let registry = match Registry::load(registry_path) {
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
        info!(sources = registry.len(), "scanning sources for content to extract");

        let mut summary = RefineSummary::default();
        for row in registry.rows() {
            if !is_success_note(row.notes) {
                continue;
            }
            summary.selected += 1;
            if !is_valid_url(row.url) {
                warn!(source = row.display_name(), url = row.url, "invalid URL format skipped");
                summary.invalid_url += 1;
                counter!("refine_skipped_total", "reason" => "invalid_url").increment(1);
                continue;
            }
            self.refine_one(row.display_name(), row.url, &mut summary).await;
        }

        info!(
            selected = summary.selected,
            saved = summary.saved,
            already_present = summary.already_present,
            too_short = summary.too_short,
            failed = summary.failed,
            "refiner run complete"
        );
        Ok(summary)
    }

    /// Idempotent: an existing document at the URL's address means nothing to do.
    pub async fn refine_one(&self, source_name: &str, url: &str, summary: &mut RefineSummary) {
        let key = ContentAddress::for_url(url);
        if self.store.contains(&key) {
            info!(source = source_name, %key, "already downloaded, skipping");
            summary.already_present += 1;
            counter!("refine_skipped_total", "reason" => "already_present").increment(1);
            return;
        }

        info!(source = source_name, url, "extracting");
        let source = &*self.source;
        let fetched = self
            .retry
            .run("download", RefineError::is_transient, move || source.fetch_article(url))
            .await;

        let text = match fetched {
            Ok(Some(text)) if char_len(&text) >= self.min_content_chars => text,
            Ok(other) => {
                warn!(
                    source = source_name,
                    url,
                    chars = other.as_deref().map(char_len).unwrap_or(0),
                    "content too short or empty"
                );
                summary.too_short += 1;
                counter!("refine_skipped_total", "reason" => "too_short").increment(1);
                return;
            }
            Err(e) => {
                error!(source = source_name, url, error = %e, "download failed");
                summary.failed += 1;
                return;
            }
        };

        let doc = RawDocument {
            source: source_name.to_string(),
            url: url.to_string(),
            downloaded_at: Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            content_clean: text,
        };
        if let Err(e) = self.store.put(&key, &doc) {
            error!(target: "persistence", source = source_name, %key, error = %e, "could not save document");
            summary.failed += 1;
            return;
        }
        summary.saved += 1;
        counter!("refine_documents_saved_total").increment(1);
        info!(source = source_name, %key, "saved content");

        tokio::time::sleep(self.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation_needs_scheme_and_host() {
        assert!(is_valid_url("https://www.eba.europa.eu/rss.xml"));
        assert!(is_valid_url(" http://example.eu/a "));
        assert!(!is_valid_url("www.eba.europa.eu/rss.xml"));
        assert!(!is_valid_url("mailto:press@esma.europa.eu"));
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("nan"));
    }
}
