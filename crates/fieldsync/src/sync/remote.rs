//! The remote authority as seen by the sync engine and the connectivity monitor

use async_trait::async_trait;
use fieldsync_api::Asset;
use thiserror::Error;

/// Anything that can go wrong talking to the remote.
///
/// Every variant is transient from the engine's point of view: Pull aborts,
/// Push leaves its batch pending, and the next trigger tries again.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected payload: {0}")]
    Protocol(String),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Canonical asset store reachable over a request/response transport
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Cheap existence check; no body is expected
    async fn probe(&self) -> TransportResult<()>;

    /// Full asset snapshot. Returned assets are always marked synced.
    async fn fetch_snapshot(&self) -> TransportResult<Vec<Asset>>;

    /// Upload a batch of pending assets. Ok means the whole batch was accepted.
    async fn push_batch(&self, assets: &[Asset]) -> TransportResult<()>;

    /// Identifier used in logs (e.g. the base URL)
    fn remote_id(&self) -> &str;
}
