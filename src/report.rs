// src/report.rs
//! Tabular intelligence report: one row per ClassificationRecord, highest impact first.

use anyhow::{Context, Result};
use metrics::gauge;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::documents::ClassificationRecord;
use crate::store::write_atomic;

/// Leading columns, in order. Everything else follows in `TRAILING_COLUMNS`.
pub const PRIORITY_COLUMNS: [&str; 6] = ["date", "source", "impact_score", "summary", "tags", "url"];
pub const TRAILING_COLUMNS: [&str; 4] = ["downloaded_at", "content_clean", "analyzed_at", "engine"];

pub const TAG_SEPARATOR: &str = "; ";

/// Stable sort by impact, descending; records without a score go last.
pub fn rank(records: &[ClassificationRecord]) -> Vec<&ClassificationRecord> {
    let mut out: Vec<&ClassificationRecord> = records.iter().collect();
    // Option<u8>: None < Some(_), so reversing puts unscored rows at the end.
    out.sort_by(|a, b| {
        b.classification
            .impact_score
            .cmp(&a.classification.impact_score)
    });
    out
}

fn row_values(r: &ClassificationRecord) -> [String; 10] {
    let c = &r.classification;
    [
        c.date.clone().unwrap_or_default(),
        r.raw.source.clone(),
        c.impact_score.map(|s| s.to_string()).unwrap_or_default(),
        c.summary.clone().unwrap_or_default(),
        c.tags
            .as_ref()
            .map(|t| t.join(TAG_SEPARATOR))
            .unwrap_or_default(),
        r.raw.url.clone(),
        r.raw.downloaded_at.clone(),
        r.raw.content_clean.clone(),
        r.analyzed_at.clone(),
        r.engine.clone(),
    ]
}

pub fn render_csv(records: &[ClassificationRecord]) -> Result<String> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(PRIORITY_COLUMNS.iter().chain(TRAILING_COLUMNS.iter()))
        .context("writing report header")?;
    for r in rank(records) {
        w.write_record(row_values(r)).context("writing report row")?;
    }
    let bytes = w.into_inner().context("flushing report")?;
    String::from_utf8(bytes).context("report is not valid UTF-8")
}

/// Write the report atomically. Returns `Ok(None)` without touching disk when
/// there is nothing to report.
pub fn write_report(records: &[ClassificationRecord], path: &Path) -> Result<Option<PathBuf>> {
    if records.is_empty() {
        warn!("no classified records, report not written");
        return Ok(None);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report dir {}", parent.display()))?;
    }
    let body = render_csv(records)?;
    write_atomic(path, body.as_bytes())
        .with_context(|| format!("writing report {}", path.display()))?;

    gauge!("report_rows").set(records.len() as f64);
    info!(rows = records.len(), path = %path.display(), "report written");
    Ok(Some(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{Classification, RawDocument};

    fn rec(source: &str, score: Option<u8>) -> ClassificationRecord {
        ClassificationRecord {
            raw: RawDocument {
                source: source.into(),
                url: format!("https://{source}.europa.eu/news"),
                downloaded_at: "2025-03-01T09:00:00".into(),
                content_clean: "body".into(),
            },
            classification: Classification {
                summary: Some(format!("{source} update")),
                impact_score: score,
                tags: Some(vec!["MiCA".into(), "AML".into()]),
                date: Some("2025-02-28".into()),
            },
            analyzed_at: "2025-03-01T10:00:00".into(),
            engine: "MOCK".into(),
        }
    }

    #[test]
    fn ranks_descending_with_unscored_last() {
        let records = vec![
            rec("a", Some(3)),
            rec("b", None),
            rec("c", Some(9)),
            rec("d", Some(3)),
        ];
        let order: Vec<&str> = rank(&records).iter().map(|r| r.raw.source.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn csv_has_priority_columns_first() {
        let out = render_csv(&[rec("esma", Some(7))]).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,source,impact_score,summary,tags,url,downloaded_at,content_clean,analyzed_at,engine"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("2025-02-28,esma,7,esma update,MiCA; AML,https://esma.europa.eu/news,"));
        assert!(row.ends_with(",MOCK"));
    }

    #[test]
    fn empty_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        assert_eq!(write_report(&[], &path).unwrap(), None);
        assert!(!path.exists());
    }
}
