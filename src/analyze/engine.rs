// src/analyze/engine.rs
//! Classification engines: one trait, three variants (Mock, Gemini, OpenAI).
//!
//! Every engine answers with the same JSON object:
//! `{"summary": str, "impact_score": 0..=10, "tags": [str], "date": "YYYY-MM-DD"}`.
//! The Analyst picks exactly one engine at startup and never re-resolves it.

use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::engine::EngineSelection;
use crate::text::truncate_chars;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Input budgets per engine, in characters.
pub const GEMINI_MAX_INPUT_CHARS: usize = 30_000;
pub const OPENAI_MAX_INPUT_CHARS: usize = 6_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Transport(String),

    #[error("engine request timed out")]
    Timeout,

    #[error("engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("engine output is not a JSON object: {0}")]
    Decode(String),

    #[error("engine returned no content")]
    Empty,
}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::Empty => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[async_trait]
pub trait ClassificationEngine: Send + Sync {
    /// Recorded in every ClassificationRecord ("MOCK", "GEMINI", "OPENAI").
    fn name(&self) -> &'static str;

    /// Raw JSON object from the engine; field validation happens in the Analyst.
    async fn classify(&self, text: &str) -> Result<Value, EngineError>;
}

pub type DynEngine = Arc<dyn ClassificationEngine>;

/// Factory: one engine for the whole run, from the startup selection.
pub fn build_engine(
    selection: &EngineSelection,
    home_market: &str,
    timeout: Duration,
) -> Result<DynEngine, EngineError> {
    match selection {
        EngineSelection::Mock => Ok(Arc::new(MockEngine)),
        EngineSelection::Gemini { api_key, model } => Ok(Arc::new(GeminiEngine::new(
            http_client(timeout)?,
            api_key,
            model,
            home_market,
        ))),
        EngineSelection::OpenAi { api_key, model } => Ok(Arc::new(OpenAiEngine::new(
            http_client(timeout)?,
            api_key,
            model,
            home_market,
        ))),
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, EngineError> {
    reqwest::Client::builder()
        .user_agent(concat!("regulink/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(timeout)
        .build()
        .map_err(EngineError::from)
}

/// Instructions shared by every real engine, including the home-market scoring rule.
pub fn system_prompt(home_market: &str) -> String {
    format!(
        "You are a Senior Compliance Officer monitoring regulation for the {home_market} market.\n\
         Analyze the regulatory text you are given.\n\
         \n\
         CRITICAL:\n\
         - If the text concerns a foreign jurisdiction only (for example US SEC/CFTC rules) and has \
         NO impact on the {home_market} market, set \"impact_score\": 0.\n\
         \n\
         Return ONLY a JSON object with this exact schema:\n\
         {{\n\
           \"summary\": \"One sentence headline.\",\n\
           \"impact_score\": 5,\n\
           \"tags\": [\"Tag1\", \"Tag2\"],\n\
           \"date\": \"YYYY-MM-DD\"\n\
         }}\n\
         impact_score is an integer from 0 (irrelevant) to 10 (critical); date is the \
         effective or publication date found in the text."
    )
}

/// Parse engine text into a JSON object, tolerating Markdown code fences.
pub fn parse_engine_json(raw: &str) -> Result<Value, EngineError> {
    let mut s = raw.trim();
    if s.is_empty() {
        return Err(EngineError::Empty);
    }
    if let Some(rest) = s.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        s = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }
    let v: Value = serde_json::from_str(s).map_err(|e| EngineError::Decode(e.to_string()))?;
    if !v.is_object() {
        return Err(EngineError::Decode(format!("expected object, got {v}")));
    }
    Ok(v)
}

async fn read_body(resp: reqwest::Response) -> Result<reqwest::Response, EngineError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(EngineError::Status {
        status: status.as_u16(),
        body: truncate_chars(&body, 200).to_string(),
    })
}

// ------------------------------------------------------------
// Mock
// ------------------------------------------------------------

/// Non-failing default used when no credentials are configured.
pub struct MockEngine;

#[async_trait]
impl ClassificationEngine for MockEngine {
    fn name(&self) -> &'static str {
        "MOCK"
    }

    async fn classify(&self, _text: &str) -> Result<Value, EngineError> {
        Ok(json!({
            "summary": "Mock Summary: Regulatory update detected.",
            "impact_score": 5,
            "tags": ["Mock_Tag"],
            "date": Local::now().format("%Y-%m-%d").to_string(),
        }))
    }
}

// ------------------------------------------------------------
// Gemini (generateContent)
// ------------------------------------------------------------

pub struct GeminiEngine {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    prompt: String,
}

impl GeminiEngine {
    pub fn new(http: reqwest::Client, api_key: &str, model: &str, home_market: &str) -> Self {
        Self {
            http,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            prompt: system_prompt(home_market),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig<'a> {
    response_mime_type: &'a str,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig<'a>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[async_trait]
impl ClassificationEngine for GeminiEngine {
    fn name(&self) -> &'static str {
        "GEMINI"
    }

    async fn classify(&self, text: &str) -> Result<Value, EngineError> {
        let user_text = format!("Text to analyze:\n{}", truncate_chars(text, GEMINI_MAX_INPUT_CHARS));
        let req = GeminiRequest {
            system_instruction: GeminiContent {
                role: "system",
                parts: vec![GeminiPart { text: &self.prompt }],
            },
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: &user_text }],
            }],
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.1,
            },
        };

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await?;
        let body: GeminiResponse = read_body(resp).await?.json().await?;

        let content: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        parse_engine_json(&content)
    }
}

// ------------------------------------------------------------
// OpenAI (Chat Completions, JSON mode)
// ------------------------------------------------------------

pub struct OpenAiEngine {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    prompt: String,
}

impl OpenAiEngine {
    pub fn new(http: reqwest::Client, api_key: &str, model: &str, home_market: &str) -> Self {
        Self {
            http,
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            prompt: system_prompt(home_market),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Deserialize)]
struct ChatResp {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

#[async_trait]
impl ClassificationEngine for OpenAiEngine {
    fn name(&self) -> &'static str {
        "OPENAI"
    }

    async fn classify(&self, text: &str) -> Result<Value, EngineError> {
        let input = truncate_chars(text, OPENAI_MAX_INPUT_CHARS);
        let req = ChatReq {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &self.prompt,
                },
                Msg {
                    role: "user",
                    content: input,
                },
            ],
            temperature: 0.1,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;
        let body: ChatResp = read_body(resp).await?.json().await?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        parse_engine_json(&content)
    }
}
