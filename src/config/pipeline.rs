// src/config/pipeline.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "REGULINK_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_REFINER_DELAY: &str = "REFINER_DELAY";
pub const ENV_BROWSERLESS_URL: &str = "BROWSERLESS_URL";
pub const ENV_BROWSERLESS_TOKEN: &str = "BROWSERLESS_TOKEN";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Whole pipeline configuration. Every section is optional in TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub http: HttpConfig,
    pub harvester: HarvesterConfig,
    pub refiner: RefinerConfig,
    pub analyst: AnalystConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub registry: PathBuf,
    pub processed_dir: PathBuf,
    pub intelligence_dir: PathBuf,
    pub report: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            registry: PathBuf::from("data/sources.csv"),
            processed_dir: PathBuf::from("data/processed"),
            intelligence_dir: PathBuf::from("data/intelligence"),
            report: PathBuf::from("data/intelligence_report.csv"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 15,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Shared reqwest client for feeds and article downloads.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(Duration::from_secs(5))
            .timeout(self.timeout())
            .build()
            .context("building http client")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    /// Save the registry after every N-th row (0 disables periodic saves).
    pub checkpoint_every: usize,
    pub scrape_delay_secs: u64,
    pub navigation_timeout_secs: u64,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 5,
            scrape_delay_secs: 2,
            navigation_timeout_secs: 30,
            browserless_url: None,
            browserless_token: None,
        }
    }
}

impl HarvesterConfig {
    pub fn scrape_delay(&self) -> Duration {
        Duration::from_secs(self.scrape_delay_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    pub delay_secs: u64,
    pub min_content_chars: usize,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            delay_secs: 1,
            min_content_chars: 50,
        }
    }
}

impl RefinerConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystConfig {
    pub min_content_chars: usize,
    pub call_delay_secs: u64,
    pub request_timeout_secs: u64,
    /// Market the classifier scores relevance against.
    pub home_market: String,
    pub block_phrases: Vec<String>,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            min_content_chars: 100,
            call_delay_secs: 4,
            request_timeout_secs: 60,
            home_market: "EU".to_string(),
            block_phrases: default_block_phrases(),
        }
    }
}

impl AnalystConfig {
    pub fn call_delay(&self) -> Duration {
        Duration::from_secs(self.call_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

pub fn default_block_phrases() -> Vec<String> {
    [
        "access denied",
        "security check",
        "challenge-response",
        "verify you are human",
        "cloudflare",
        "403 forbidden",
        "suspected bot activity",
        "enable javascript",
        "captcha",
        "unusual traffic",
        "access to this page has been denied",
        "vpn/proxy",
        "malicious activity detected",
        "malicious behavior detected",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl PipelineConfig {
    /// Load config from an explicit TOML path and apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let mut cfg = Self::parse(&content)?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Load config using env var + fallbacks:
    /// 1) $REGULINK_CONFIG_PATH
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        let mut cfg = Self::default();
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn parse(s: &str) -> Result<Self> {
        let mut cfg: PipelineConfig = toml::from_str(s).context("parsing pipeline config")?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        self.analyst.block_phrases = clean_phrases(std::mem::take(&mut self.analyst.block_phrases));
        if self.analyst.home_market.trim().is_empty() {
            self.analyst.home_market = AnalystConfig::default().home_market;
        }
        if self.http.user_agent.trim().is_empty() {
            self.http.user_agent = DEFAULT_USER_AGENT.to_string();
        }
    }

    /// Environment wins over file values.
    pub fn apply_env(&mut self) {
        if let Some(secs) = std::env::var(ENV_REFINER_DELAY)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.refiner.delay_secs = secs;
        }
        if let Ok(url) = std::env::var(ENV_BROWSERLESS_URL) {
            if !url.trim().is_empty() {
                self.harvester.browserless_url = Some(url.trim().to_string());
            }
        }
        if let Ok(token) = std::env::var(ENV_BROWSERLESS_TOKEN) {
            if !token.trim().is_empty() {
                self.harvester.browserless_token = Some(token.trim().to_string());
            }
        }
    }
}

/// Lowercase, trim, drop empties and duplicates (order kept).
fn clean_phrases(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}
