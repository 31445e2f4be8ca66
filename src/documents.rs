// src/documents.rs
//! Persisted hand-off artifacts: `RawDocument` (Refiner → Analyst) and
//! `ClassificationRecord` (Analyst → report).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extracted article text for one source URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawDocument {
    pub source: String,
    pub url: String,
    /// ISO 8601 local timestamp.
    pub downloaded_at: String,
    pub content_clean: String,
}

/// Output contract shared by every classification engine.
/// Fields are optional because a partial engine answer is still persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

pub const REQUIRED_FIELDS: [&str; 4] = ["summary", "impact_score", "tags", "date"];

impl Classification {
    /// Lenient mapping from an engine's JSON object.
    /// `impact_score` accepts numbers or numeric strings and is clamped to 0..=10;
    /// `tags` accepts a list or a single comma-separated string; other keys are ignored.
    pub fn from_value(v: &Value) -> Self {
        let summary = v
            .get("summary")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let impact_score = v.get("impact_score").and_then(score_from_value);

        let tags = match v.get("tags") {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|t| match t {
                        Value::String(s) => Some(s.trim().to_string()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            Some(Value::String(s)) => Some(
                s.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
            ),
            _ => None,
        };

        let date = v
            .get("date")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            summary,
            impact_score,
            tags,
            date,
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let present = [
            self.summary.is_some(),
            self.impact_score.is_some(),
            self.tags.is_some(),
            self.date.is_some(),
        ];
        REQUIRED_FIELDS
            .iter()
            .zip(present)
            .filter(|(_, p)| !p)
            .map(|(f, _)| *f)
            .collect()
    }
}

fn score_from_value(v: &Value) -> Option<u8> {
    let raw = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 10.0) as u8)
}

/// RawDocument + classification + provenance. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationRecord {
    #[serde(flatten)]
    pub raw: RawDocument,
    #[serde(flatten)]
    pub classification: Classification,
    pub analyzed_at: String,
    pub engine: String,
}
