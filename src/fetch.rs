// ===============================
// src/fetch.rs
// ===============================
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::RawPosition;
use crate::okx::LeadTrader;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("api error {code}: {msg}")]
    Api { code: String, msg: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Source of a trader's current positions. An empty list is a valid answer
/// (trader is flat); errors are transient and scoped to one trader.
#[async_trait]
pub trait PositionFetcher: Send + Sync {
    async fn fetch_positions(&self, trader_code: &str) -> Result<Vec<RawPosition>, FetchError>;
}

/// Lookups the admin console needs beyond position polling.
#[async_trait]
pub trait TraderDirectory: Send + Sync {
    /// Code from a code, profile URL or share link; `None` when nothing matches.
    async fn resolve_code(&self, input: &str) -> Option<String>;
    /// Number of open positions, proving the code is a reachable lead trader.
    async fn check_trader(&self, code: &str) -> Result<usize, FetchError>;
    async fn lead_traders(&self, limit: usize) -> Result<Vec<LeadTrader>, FetchError>;
}
