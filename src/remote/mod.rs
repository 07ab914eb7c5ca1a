//! Remote playlist source.
//!
//! One GET per fetch, no pagination, no retry. Any failure (transport, status or
//! payload) is reported as a [`NetworkError`]; partial payloads are never returned.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{NetworkError, NetworkErrorKind};
use crate::models::NetworkCoinContainer;

/// Source of the authoritative playlist.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_all(&self) -> Result<NetworkCoinContainer, NetworkError>;
}

/// [`RemoteSource`] backed by an HTTP endpoint returning `{"coins": [...]}`.
pub struct HttpRemoteSource {
    client: reqwest::Client,
    url: String,
}

impl HttpRemoteSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetworkError::unreachable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn fetch_all(&self) -> Result<NetworkCoinContainer, NetworkError> {
        tracing::debug!("Fetching playlist from {}", self.url);

        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::new(
                NetworkErrorKind::Status(status.as_u16()),
                format!("{} answered {}", self.url, status),
            ));
        }

        // Decode from the raw body so payload errors are classified as malformed.
        let body = response.bytes().await?;
        let container: NetworkCoinContainer = serde_json::from_slice(&body)?;

        tracing::debug!("Fetched {} coins from {}", container.coins.len(), self.url);
        Ok(container)
    }
}
