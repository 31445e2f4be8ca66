// src/analyze/filters.rs
// Pre-classification gates: documents that fail never reach an engine.

use std::fmt;

use crate::config::pipeline::AnalystConfig;
use crate::text::char_len;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    TooShort { chars: usize, min: usize },
    Blocked { phrase: String },
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::TooShort { .. } => "too_short",
            Self::Blocked { .. } => "blocked",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { chars, min } => write!(f, "content too short ({chars} < {min} chars)"),
            Self::Blocked { phrase } => write!(f, "bot-block page detected ('{phrase}')"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentFilter {
    min_chars: usize,
    /// Lowercased.
    phrases: Vec<String>,
}

impl ContentFilter {
    pub fn new(min_chars: usize, phrases: &[String]) -> Self {
        Self {
            min_chars,
            phrases: phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn from_config(cfg: &AnalystConfig) -> Self {
        Self::new(cfg.min_content_chars, &cfg.block_phrases)
    }

    /// Length first, then block phrases.
    pub fn check(&self, text: &str) -> Result<(), Rejection> {
        let chars = char_len(text.trim());
        if chars < self.min_chars {
            return Err(Rejection::TooShort {
                chars,
                min: self.min_chars,
            });
        }
        if let Some(phrase) = self.blocked_by(text) {
            return Err(Rejection::Blocked {
                phrase: phrase.to_string(),
            });
        }
        Ok(())
    }

    fn blocked_by(&self, text: &str) -> Option<&str> {
        if self.phrases.is_empty() {
            return None;
        }
        let lower = text.to_lowercase();
        self.phrases
            .iter()
            .find(|p| lower.contains(p.as_str()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ContentFilter {
        ContentFilter::from_config(&AnalystConfig::default())
    }

    #[test]
    fn short_text_is_rejected() {
        let r = filter().check(&"a".repeat(40)).unwrap_err();
        assert_eq!(r, Rejection::TooShort { chars: 40, min: 100 });
        assert_eq!(r.reason(), "too_short");
        assert!(filter().check(&"a".repeat(100)).is_ok());
    }

    #[test]
    fn block_phrase_match_is_case_insensitive() {
        let long = format!("{} Please Verify You Are Human to continue.", "x".repeat(200));
        let r = filter().check(&long).unwrap_err();
        assert_eq!(
            r,
            Rejection::Blocked {
                phrase: "verify you are human".into()
            }
        );
        // a short bot wall is still kept away from the engine
        assert!(matches!(filter().check("CAPTCHA"), Err(Rejection::TooShort { .. })));
    }
}
