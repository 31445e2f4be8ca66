// src/analyze/mod.rs
//! Stage 3: classify every RawDocument exactly once and rebuild the report from
//! all ClassificationRecords.

pub mod engine;
pub mod filters;

use anyhow::{bail, Context, Result};
use chrono::Local;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::analyze::engine::EngineError;
use crate::analyze::filters::ContentFilter;
use crate::config::pipeline::{AnalystConfig, PipelineConfig};
use crate::documents::{Classification, ClassificationRecord, RawDocument};
use crate::report::write_report;
use crate::retry::RetryPolicy;
use crate::store::{ContentAddress, DocumentStore, JsonDirStore, StoreError};
use crate::telemetry::ensure_metrics_described;

pub use engine::{build_engine, DynEngine};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnalystSummary {
    pub documents: usize,
    pub reused: usize,
    pub classified: usize,
    pub too_short: usize,
    pub blocked: usize,
    pub failed: usize,
    pub corrupt: usize,
}

pub struct AnalystOutput {
    pub summary: AnalystSummary,
    /// Every record known after the run (reused + new), in key order.
    pub records: Vec<ClassificationRecord>,
}

pub struct Analyst {
    engine: DynEngine,
    inputs: Arc<dyn DocumentStore<RawDocument>>,
    outputs: Arc<dyn DocumentStore<ClassificationRecord>>,
    filter: ContentFilter,
    call_delay: Duration,
    retry: RetryPolicy,
}

impl Analyst {
    pub fn new(
        engine: DynEngine,
        inputs: Arc<dyn DocumentStore<RawDocument>>,
        outputs: Arc<dyn DocumentStore<ClassificationRecord>>,
        cfg: &AnalystConfig,
    ) -> Self {
        Self {
            engine,
            inputs,
            outputs,
            filter: ContentFilter::from_config(cfg),
            call_delay: cfg.call_delay(),
            retry: RetryPolicy::engine(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(&self) -> Result<AnalystOutput> {
        ensure_metrics_described();
        let keys = self.inputs.keys().context("listing processed documents")?;
        let mut summary = AnalystSummary {
            documents: keys.len(),
            ..Default::default()
        };
        if keys.is_empty() {
            error!("no processed documents found, run the refiner first");
            bail!("no input items: no processed documents found");
        }
        let mut records = Vec::with_capacity(keys.len());
        info!(
            documents = keys.len(),
            engine = self.engine.name(),
            "starting analysis"
        );

        for key in &keys {
            if let Some(rec) = self.analyze_one(key, &mut summary).await {
                records.push(rec);
            }
        }

        info!(
            documents = summary.documents,
            reused = summary.reused,
            classified = summary.classified,
            too_short = summary.too_short,
            blocked = summary.blocked,
            failed = summary.failed,
            corrupt = summary.corrupt,
            "analysis complete"
        );
        Ok(AnalystOutput { summary, records })
    }

    /// Returns the record to report for `key`, reusing an existing one when present.
    pub async fn analyze_one(
        &self,
        key: &ContentAddress,
        summary: &mut AnalystSummary,
    ) -> Option<ClassificationRecord> {
        if self.outputs.contains(key) {
            return match self.outputs.get(key) {
                Ok(Some(rec)) => {
                    summary.reused += 1;
                    Some(rec)
                }
                Ok(None) => None,
                // Never reclassify: a corrupt record is left for an operator to inspect.
                Err(e) => {
                    error!(%key, error = %e, "existing classification unreadable, skipped");
                    summary.corrupt += 1;
                    None
                }
            };
        }

        let doc = match self.inputs.get(key) {
            Ok(Some(doc)) => doc,
            Ok(None) => return None,
            Err(e @ StoreError::Corrupt { .. }) => {
                error!(%key, error = %e, "processed document unreadable, skipped");
                summary.corrupt += 1;
                return None;
            }
            Err(e) => {
                error!(%key, error = %e, "could not read processed document");
                summary.failed += 1;
                return None;
            }
        };

        if let Err(rejection) = self.filter.check(&doc.content_clean) {
            warn!(source = %doc.source, %key, %rejection, "document not analyzed");
            counter!("analyst_filtered_total", "reason" => rejection.reason()).increment(1);
            match rejection {
                filters::Rejection::TooShort { .. } => summary.too_short += 1,
                filters::Rejection::Blocked { .. } => summary.blocked += 1,
            }
            return None;
        }

        info!(source = %doc.source, %key, "analyzing");
        let engine = &*self.engine;
        let text = doc.content_clean.as_str();
        let answer = self
            .retry
            .run("engine", EngineError::is_transient, move || engine.classify(text))
            .await;

        let value = match answer {
            Ok(v) => v,
            Err(e) => {
                error!(source = %doc.source, %key, error = %e, "classification failed");
                summary.failed += 1;
                return None;
            }
        };
        counter!("analyst_engine_calls_total", "engine" => engine.name()).increment(1);
        // provider rate limit
        tokio::time::sleep(self.call_delay).await;

        let classification = Classification::from_value(&value);
        let missing = classification.missing_fields();
        if !missing.is_empty() {
            warn!(source = %doc.source, %key, ?missing, "engine answer missing fields");
        }

        let record = ClassificationRecord {
            raw: doc,
            classification,
            analyzed_at: Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            engine: engine.name().to_string(),
        };
        match self.outputs.put(key, &record) {
            Ok(()) => {
                summary.classified += 1;
                counter!("analyst_records_total").increment(1);
                info!(
                    source = %record.raw.source,
                    %key,
                    impact_score = ?record.classification.impact_score,
                    "classification saved"
                );
                Some(record)
            }
            Err(e) => {
                error!(target: "persistence", %key, error = %e, "could not save classification");
                summary.failed += 1;
                None
            }
        }
    }
}

/// Full stage against the configured directories: the processed dir must exist,
/// the output dir is created, and the report is rebuilt from every record.
pub async fn run_stage(cfg: &PipelineConfig, engine: DynEngine) -> Result<AnalystSummary> {
    let paths = &cfg.paths;
    let inputs = JsonDirStore::<RawDocument>::open_existing(&paths.processed_dir)
        .context("processed documents directory missing (run the refiner first)")?;
    let outputs = JsonDirStore::<ClassificationRecord>::create(&paths.intelligence_dir)
        .context("preparing intelligence directory")?;

    let analyst = Analyst::new(engine, Arc::new(inputs), Arc::new(outputs), &cfg.analyst);
    let out = analyst.run().await?;
    write_report(&out.records, &paths.report)?;
    Ok(out.summary)
}
