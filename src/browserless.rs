// src/browserless.rs
//! HTTP client for a Browserless `/content` endpoint (remote headless Chrome).

use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserlessError {
    #[error("network error: {0}")]
    Network(String),

    #[error("browserless timed out")]
    Timeout,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for BrowserlessError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BrowserlessError::Timeout
        } else {
            BrowserlessError::Network(err.to_string())
        }
    }
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    navigation_timeout: Duration,
}

impl BrowserlessClient {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        navigation_timeout: Duration,
    ) -> Result<Self, BrowserlessError> {
        let client = reqwest::Client::builder()
            .timeout(navigation_timeout + Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            navigation_timeout,
        })
    }

    /// Fully-rendered HTML for a URL.
    pub async fn content(&self, url: &str) -> Result<String, BrowserlessError> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = json!({
            "url": url,
            "gotoOptions": {
                "timeout": self.navigation_timeout.as_millis() as u64,
                "waitUntil": "domcontentloaded"
            }
        });

        let resp = self.client.post(&endpoint).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}
