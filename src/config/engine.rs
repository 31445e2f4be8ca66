// src/config/engine.rs
use serde::{Deserialize, Serialize};
use std::env;

pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_GEMINI_MODEL: &str = "GEMINI_MODEL";
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Which classification engine the Analyst runs with.
/// Chosen once at process start from credential presence; Mock needs none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EngineSelection {
    Mock,
    Gemini { api_key: String, model: String },
    OpenAi { api_key: String, model: String },
}

impl EngineSelection {
    /// Gemini wins over OpenAI when both keys are present.
    pub fn from_env() -> Self {
        Self::resolve(
            env::var(ENV_GEMINI_API_KEY).ok(),
            env::var(ENV_OPENAI_API_KEY).ok(),
            env::var(ENV_GEMINI_MODEL).ok(),
            env::var(ENV_OPENAI_MODEL).ok(),
        )
    }

    pub fn resolve(
        gemini_key: Option<String>,
        openai_key: Option<String>,
        gemini_model: Option<String>,
        openai_model: Option<String>,
    ) -> Self {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        if let Some(api_key) = non_empty(gemini_key) {
            return Self::Gemini {
                api_key,
                model: non_empty(gemini_model).unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            };
        }
        if let Some(api_key) = non_empty(openai_key) {
            return Self::OpenAi {
                api_key,
                model: non_empty(openai_model).unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            };
        }
        Self::Mock
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Mock => "MOCK",
            Self::Gemini { .. } => "GEMINI",
            Self::OpenAi { .. } => "OPENAI",
        }
    }

    /// Safe diagnostics: never the key itself.
    pub fn key_len(&self) -> usize {
        match self {
            Self::Mock => 0,
            Self::Gemini { api_key, .. } | Self::OpenAi { api_key, .. } => api_key.len(),
        }
    }
}
