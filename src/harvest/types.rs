// src/harvest/types.rs
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HarvestError {
    #[error("HTTP {status} Error fetching feed")]
    Http { status: u16 },

    #[error("Feed parsed but found no entries (Empty Feed).")]
    EmptyFeed,

    #[error("Malformed feed: {0}")]
    MalformedFeed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No response received from server.")]
    NoResponse,

    #[error("Page load timed out.")]
    Timeout,

    #[error("Page loaded but title was empty.")]
    EmptyTitle,

    #[error("Newest feed entry has no title.")]
    UntitledEntry,

    #[error("Browser error: {0}")]
    Browser(String),
}

impl HarvestError {
    /// Worth another attempt: network trouble, throttling, server errors, browser crashes.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::NoResponse | Self::Browser(_) => true,
            Self::Http { status } => *status == 429 || *status >= 500,
            Self::EmptyFeed | Self::MalformedFeed(_) | Self::EmptyTitle | Self::UntitledEntry => false,
        }
    }
}

/// Liveness signal for `rss` rows: the newest entry's title.
#[async_trait]
pub trait FeedProbe: Send + Sync {
    async fn latest_title(&self, url: &str) -> Result<String, HarvestError>;
}

/// Liveness signal for `scrape` rows: the rendered page title.
/// Implementations own any browser state and must release it in `shutdown`.
#[async_trait]
pub trait PageProbe: Send + Sync {
    async fn page_title(&self, url: &str) -> Result<String, HarvestError>;
    async fn shutdown(&self);
}
