//! HTTP transport abstraction for document submission.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::trace;

use crate::error::Result;

/// User agent sent with every submission.
const USER_AGENT: &str = concat!("crpt-api/", env!("CARGO_PKG_VERSION"));

/// Trait for the network side of document submission.
///
/// Abstracts over the real HTTP client so the rate-limited client can be
/// driven by an in-memory transport in tests.
#[async_trait]
pub trait DocumentTransport: Send + Sync {
    /// POST a JSON body to `url` and return the HTTP status code.
    async fn post_json(&self, url: &str, body: String) -> Result<u16>;
}

/// [`DocumentTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl DocumentTransport for HttpTransport {
    async fn post_json(&self, url: &str, body: String) -> Result<u16> {
        trace!(url = %url, bytes = body.len(), "Sending document");

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        Ok(response.status().as_u16())
    }
}
