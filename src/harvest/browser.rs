// src/harvest/browser.rs
//! Page probes for `scrape` rows.
//!
//! `ChromeSession` keeps one local headless Chrome alive for the whole Harvester run:
//! launched on first use, health-checked before each navigation, relaunched if it died,
//! and closed by `shutdown`. `BrowserlessPageProbe` renders through a remote Browserless
//! instance instead.

use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browserless::{BrowserlessClient, BrowserlessError};
use crate::harvest::types::{HarvestError, PageProbe};
use crate::text::{collapse_whitespace, html_title};

struct Running {
    browser: Browser,
    handler: JoinHandle<()>,
}

pub struct ChromeSession {
    user_agent: String,
    navigation_timeout: Duration,
    state: Mutex<Option<Running>>,
}

impl ChromeSession {
    pub fn new(user_agent: &str, navigation_timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            navigation_timeout,
            state: Mutex::new(None),
        }
    }

    async fn launch(&self) -> Result<Running, HarvestError> {
        info!("launching headless browser");
        let mut builder = BrowserConfig::builder()
            .arg(format!("--user-agent={}", self.user_agent))
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .no_sandbox();
        if let Ok(bin) = std::env::var("CHROME_BIN") {
            builder = builder.chrome_executable(bin);
        }
        let config = builder.build().map_err(HarvestError::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_error)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler stopped");
                    break;
                }
            }
        });
        Ok(Running { browser, handler })
    }

    async fn is_alive(run: &Running) -> bool {
        !run.handler.is_finished() && run.browser.version().await.is_ok()
    }

    async fn close(mut run: Running) {
        if let Err(e) = run.browser.close().await {
            debug!(error = %e, "browser close failed");
        }
        if let Err(e) = run.browser.wait().await {
            debug!(error = %e, "browser wait failed");
        }
        run.handler.abort();
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<String, HarvestError> {
        let nav = async {
            page.goto(url).await.map_err(browser_error)?;
            page.wait_for_navigation_response()
                .await
                .map_err(browser_error)
        };
        let response = tokio::time::timeout(self.navigation_timeout, nav)
            .await
            .map_err(|_| HarvestError::Timeout)??;
        if response.is_none() {
            return Err(HarvestError::NoResponse);
        }

        let title = page
            .get_title()
            .await
            .map_err(browser_error)?
            .map(|t| collapse_whitespace(&t))
            .unwrap_or_default();
        if title.is_empty() {
            return Err(HarvestError::EmptyTitle);
        }
        Ok(title)
    }
}

#[async_trait]
impl PageProbe for ChromeSession {
    async fn page_title(&self, url: &str) -> Result<String, HarvestError> {
        let mut guard = self.state.lock().await;

        let healthy = match guard.as_ref() {
            Some(run) => Self::is_alive(run).await,
            None => false,
        };
        if !healthy {
            if let Some(dead) = guard.take() {
                warn!("browser session lost, restarting");
                Self::close(dead).await;
            }
            *guard = Some(self.launch().await?);
        }
        let run = guard
            .as_ref()
            .ok_or_else(|| HarvestError::Browser("browser not running".into()))?;

        let page = run
            .browser
            .new_page("about:blank")
            .await
            .map_err(browser_error)?;
        let result = self.navigate(&page, url).await;
        if let Err(e) = page.close().await {
            debug!(error = %e, "page close failed");
        }
        result
    }

    async fn shutdown(&self) {
        if let Some(run) = self.state.lock().await.take() {
            info!("closing browser");
            Self::close(run).await;
        }
    }
}

fn browser_error(e: CdpError) -> HarvestError {
    match e {
        CdpError::Timeout => HarvestError::Timeout,
        other => HarvestError::Browser(collapse_whitespace(&other.to_string())),
    }
}

/// Remote rendering through Browserless; no local browser state.
pub struct BrowserlessPageProbe {
    client: BrowserlessClient,
}

impl BrowserlessPageProbe {
    pub fn new(client: BrowserlessClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageProbe for BrowserlessPageProbe {
    async fn page_title(&self, url: &str) -> Result<String, HarvestError> {
        let html = self.client.content(url).await.map_err(|e| match e {
            BrowserlessError::Timeout => HarvestError::Timeout,
            BrowserlessError::Network(msg) => HarvestError::Transport(msg),
            BrowserlessError::Api { status, .. } => HarvestError::Http { status },
        })?;
        if html.trim().is_empty() {
            return Err(HarvestError::NoResponse);
        }
        html_title(&html).ok_or(HarvestError::EmptyTitle)
    }

    async fn shutdown(&self) {}
}
