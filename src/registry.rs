// src/registry.rs
//! Source registry: a CSV table of (source name, target URL, extraction strategy, notes).
//!
//! The Harvester is the only writer; it overwrites the notes cell with a rendered
//! `StatusNote`. Downstream stages read notes back through `is_success_note`.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDateTime};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::store::write_atomic;

pub const COL_SOURCE_NAME: &str = "Source Name";
pub const COL_TARGET_URL: &str = "Target URL";
pub const COL_STRATEGY: &str = "Extraction Strategy";
pub const COL_NOTES: &str = "Notes";

const NOTE_TS_FORMAT: &str = "%Y-%m-%d %H:%M";
const SIGNAL_MAX_CHARS: usize = 50;
const ERROR_MAX_CHARS: usize = 100;

// ------------------------------------------------------------
// Strategy
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Rss,
    Scrape,
    Api,
    Unknown(String),
}

impl Strategy {
    /// Case-insensitive containment, so "Web Scrape" and "RSS feed" resolve too.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_lowercase();
        if s.contains("rss") {
            Self::Rss
        } else if s.contains("scrape") {
            Self::Scrape
        } else if s.contains("api") {
            Self::Api
        } else {
            Self::Unknown(s)
        }
    }
}

// ------------------------------------------------------------
// Outcome + status note
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Failed,
    Skipped,
    UnknownStrategy,
}

impl OutcomeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
            Self::UnknownStrategy => "Unknown Strategy",
        }
    }

    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::UnknownStrategy => "unknown-strategy",
        }
    }

    fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            "unknown strategy" | "unknown-strategy" => Some(Self::UnknownStrategy),
            _ => None,
        }
    }
}

/// Which probe produced a success signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Feed,
    Page,
}

/// Result of harvesting one registry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestOutcome {
    Success { via: SignalKind, signal: String },
    Failed { error: String },
    Skipped { reason: String },
    UnknownStrategy { strategy: String },
}

impl HarvestOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success { .. } => OutcomeKind::Success,
            Self::Failed { .. } => OutcomeKind::Failed,
            Self::Skipped { .. } => OutcomeKind::Skipped,
            Self::UnknownStrategy { .. } => OutcomeKind::UnknownStrategy,
        }
    }

    /// Short diagnostic written after the outcome label.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Success { via, signal } => {
                let prefix = match via {
                    SignalKind::Feed => "RSS OK",
                    SignalKind::Page => "Scrape OK",
                };
                format!("{prefix}: {}...", truncate_chars(&single_line(signal), SIGNAL_MAX_CHARS))
            }
            Self::Failed { error } => {
                format!("Error: {}", truncate_chars(&single_line(error), ERROR_MAX_CHARS))
            }
            Self::Skipped { reason } => single_line(reason),
            Self::UnknownStrategy { strategy } => {
                format!("Strategy '{}' not recognized.", single_line(strategy))
            }
        }
    }
}

/// `[YYYY-MM-DD HH:MM] <Outcome> - <diagnostic>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNote {
    pub at: NaiveDateTime,
    pub kind: OutcomeKind,
    pub diagnostic: String,
}

impl StatusNote {
    pub fn new(outcome: &HarvestOutcome) -> Self {
        Self::at(outcome, Local::now().naive_local())
    }

    pub fn at(outcome: &HarvestOutcome, at: NaiveDateTime) -> Self {
        Self {
            at,
            kind: outcome.kind(),
            diagnostic: outcome.diagnostic(),
        }
    }

    /// Recover a note rendered by `Display`. Free text yields `None`.
    pub fn parse(note: &str) -> Option<Self> {
        static RE: OnceCell<Regex> = OnceCell::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"^\s*\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2})\]\s+([A-Za-z][A-Za-z -]*?)\s+-\s?(.*)$")
                .expect("status note regex")
        });
        let caps = re.captures(note)?;
        let at = NaiveDateTime::parse_from_str(&caps[1], NOTE_TS_FORMAT).ok()?;
        let kind = OutcomeKind::from_label(&caps[2])?;
        Some(Self {
            at,
            kind,
            diagnostic: caps[3].trim().to_string(),
        })
    }
}

impl fmt::Display for StatusNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} - {}",
            self.at.format(NOTE_TS_FORMAT),
            self.kind.label(),
            self.diagnostic
        )
    }
}

/// Downstream gate: did the Harvester mark this row as successful?
///
/// Structured notes are decided by their outcome label alone. Free-text notes need a
/// whole-word success token (`success`, `rss ok`, `scrape ok`) that is not directly
/// negated, so "Scrape OK" passes while "Not Success" and "Unsuccessful" do not.
pub fn is_success_note(note: &str) -> bool {
    if let Some(parsed) = StatusNote::parse(note) {
        return parsed.kind == OutcomeKind::Success;
    }
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:(not|no|non|never)[\s-]+)?(success|rss ok|scrape ok)\b")
            .expect("success token regex")
    });
    re.captures_iter(note).any(|c| c.get(1).is_none())
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ").trim().to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ------------------------------------------------------------
// Registry table
// ------------------------------------------------------------

/// Borrowed view of one registry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow<'a> {
    pub index: usize,
    pub name: &'a str,
    pub url: &'a str,
    pub strategy_raw: &'a str,
    pub notes: &'a str,
}

impl SourceRow<'_> {
    pub fn strategy(&self) -> Strategy {
        Strategy::parse(self.strategy_raw)
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "Unknown"
        } else {
            self.name
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    name: usize,
    url: usize,
    strategy: usize,
    notes: usize,
}

/// In-memory registry; extra columns and their order survive a save.
#[derive(Debug, Clone)]
pub struct Registry {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
    cols: Columns,
}

impl Registry {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("registry file not found at {}", path.display()));
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading registry {}", path.display()))?;
        Self::from_csv_str(&content).with_context(|| format!("parsing registry {}", path.display()))
    }

    pub fn from_csv_str(s: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(s.as_bytes());

        let mut headers: Vec<String> = rdr
            .headers()
            .context("reading registry header")?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut records: Vec<Vec<String>> = Vec::new();
        for (i, rec) in rdr.records().enumerate() {
            let rec = rec.with_context(|| format!("reading registry row {}", i + 1))?;
            records.push(rec.iter().map(|c| c.to_string()).collect());
        }

        // cells past the header keep their position under blank header names
        let widest = records.iter().map(Vec::len).max().unwrap_or(0);
        if widest > headers.len() {
            warn!(header = headers.len(), widest, "registry rows wider than header, keeping extra cells");
            headers.resize(widest, String::new());
        }

        let find = |headers: &[String], name: &str| {
            headers.iter().position(|h| h.eq_ignore_ascii_case(name))
        };
        let name = find(&headers, COL_SOURCE_NAME)
            .ok_or_else(|| anyhow!("registry is missing column '{COL_SOURCE_NAME}'"))?;
        let url = find(&headers, COL_TARGET_URL)
            .ok_or_else(|| anyhow!("registry is missing column '{COL_TARGET_URL}'"))?;
        let strategy = find(&headers, COL_STRATEGY)
            .ok_or_else(|| anyhow!("registry is missing column '{COL_STRATEGY}'"))?;
        let notes = match find(&headers, COL_NOTES) {
            Some(i) => i,
            None => {
                headers.push(COL_NOTES.to_string());
                headers.len() - 1
            }
        };

        let width = headers.len();
        for row in &mut records {
            row.resize(width, String::new());
        }

        Ok(Self {
            headers,
            records,
            cols: Columns {
                name,
                url,
                strategy,
                notes,
            },
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row(&self, index: usize) -> Option<SourceRow<'_>> {
        let r = self.records.get(index)?;
        Some(SourceRow {
            index,
            name: r[self.cols.name].trim(),
            url: r[self.cols.url].trim(),
            strategy_raw: r[self.cols.strategy].trim(),
            notes: r[self.cols.notes].as_str(),
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = SourceRow<'_>> + '_ {
        (0..self.records.len()).filter_map(move |i| self.row(i))
    }

    pub fn set_notes(&mut self, index: usize, note: &str) {
        let col = self.cols.notes;
        if let Some(r) = self.records.get_mut(index) {
            r[col] = note.to_string();
        }
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(&self.headers)?;
        for r in &self.records {
            wtr.write_record(r)?;
        }
        let bytes = wtr.into_inner().map_err(|e| anyhow!("flushing registry csv: {e}"))?;
        String::from_utf8(bytes).context("registry csv is not utf-8")
    }

    /// Atomic save. The io error is kept as the root cause so callers can spot
    /// `PermissionDenied` (file held open by a spreadsheet program).
    pub fn save(&self, path: &Path) -> Result<()> {
        let body = self.to_csv_string()?;
        write_atomic(path, body.as_bytes())
            .with_context(|| format!("saving registry {}", path.display()))
    }
}
