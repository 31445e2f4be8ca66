// src/refine/source.rs
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::browserless::BrowserlessClient;
use crate::refine::extract::extract_article;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefineError {
    #[error("download failed: {0}")]
    Transport(String),

    #[error("download timed out")]
    Timeout,

    #[error("HTTP {status} downloading article")]
    Http { status: u16 },
}

impl RefineError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Http { status } => *status == 429 || *status >= 500,
        }
    }
}

impl From<reqwest::Error> for RefineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout;
        }
        match e.status() {
            Some(s) => Self::Http { status: s.as_u16() },
            None => Self::Transport(e.to_string()),
        }
    }
}

/// Downloads a page and returns its main text, `None` when nothing could be extracted.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_article(&self, url: &str) -> Result<Option<String>, RefineError>;
}

enum Primary {
    /// Lenient direct GET; any failure just means "try the fallback".
    Direct,
    Browserless(BrowserlessClient),
}

pub struct HttpArticleSource {
    client: reqwest::Client,
    primary: Primary,
}

impl HttpArticleSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            primary: Primary::Direct,
        }
    }

    pub fn with_browserless(client: reqwest::Client, browserless: BrowserlessClient) -> Self {
        Self {
            client,
            primary: Primary::Browserless(browserless),
        }
    }

    async fn primary_html(&self, url: &str) -> Option<String> {
        match &self.primary {
            Primary::Direct => {
                let resp = self.client.get(url).send().await.ok()?;
                if !resp.status().is_success() {
                    debug!(url, status = resp.status().as_u16(), "primary fetch non-success");
                    return None;
                }
                resp.text().await.ok()
            }
            Primary::Browserless(b) => match b.content(url).await {
                Ok(html) => Some(html),
                Err(e) => {
                    warn!(url, error = %e, "browserless fetch failed");
                    None
                }
            },
        }
    }

    /// Strict plain GET: errors surface so the caller's retry policy can act on them.
    async fn fallback_html(&self, url: &str) -> Result<String, RefineError> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl ArticleSource for HttpArticleSource {
    async fn fetch_article(&self, url: &str) -> Result<Option<String>, RefineError> {
        let primary = self.primary_html(url).await;
        let direct_ok = matches!(self.primary, Primary::Direct) && primary.is_some();

        if let Some(text) = primary.as_deref().and_then(|h| extract_article(h, Some(url))) {
            return Ok(Some(text));
        }
        // A direct fetch that succeeded would only download the same bytes again.
        if direct_ok {
            return Ok(None);
        }

        debug!(url, "falling back to plain fetch");
        let html = self.fallback_html(url).await?;
        Ok(extract_article(&html, Some(url)))
    }
}
