//! Rate-limited document submission client.

use tracing::{debug, instrument, warn};

use super::document::{Document, DocumentRequest};
use super::transport::{DocumentTransport, HttpTransport};
use crate::config::{ClientConfig, CrptConfig, DEFAULT_ENDPOINT};
use crate::error::Result;
use crate::ratelimit::{RateLimiter, TimeWindow};

/// Client for the document creation endpoint.
///
/// Every submission takes one permit from the rate limiter before it is
/// sent. A permit is spent once the request goes out, whether or not the
/// remote side accepts it.
pub struct CrptApi<T: DocumentTransport = HttpTransport> {
    limiter: RateLimiter,
    transport: T,
    endpoint: String,
}

impl CrptApi<HttpTransport> {
    /// Create a client allowing `request_limit` submissions per `window`
    /// against the default endpoint.
    pub fn new(window: TimeWindow, request_limit: u32) -> Result<Self> {
        let limiter = RateLimiter::per(window, request_limit)?;
        let transport = HttpTransport::new(ClientConfig::default().request_timeout())?;
        Ok(Self::with_transport(limiter, transport, DEFAULT_ENDPOINT))
    }

    /// Create a client from the loaded configuration.
    pub fn from_config(config: &CrptConfig) -> Result<Self> {
        let limiter = RateLimiter::from_config(&config.rate_limiting)?;
        let transport = HttpTransport::new(config.client.request_timeout())?;
        Ok(Self::with_transport(
            limiter,
            transport,
            config.client.endpoint.clone(),
        ))
    }
}

impl<T: DocumentTransport> CrptApi<T> {
    /// Create a client from its parts.
    pub fn with_transport(limiter: RateLimiter, transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            limiter,
            transport,
            endpoint: endpoint.into(),
        }
    }

    /// Submit a signed document.
    ///
    /// Waits for rate limiter capacity, then POSTs the document. Returns
    /// `true` when the endpoint answers 200 or 201. The body is serialized
    /// before a permit is taken, so an unserializable document never counts
    /// against the limit.
    #[instrument(skip(self, document, signature), fields(doc_id = %document.doc_id))]
    pub async fn create_document(&self, document: &Document, signature: &str) -> Result<bool> {
        let body = DocumentRequest::new(document, signature).to_json()?;

        self.limiter.acquire().await?;

        let status = self.transport.post_json(&self.endpoint, body).await?;
        let accepted = status == 200 || status == 201;

        if accepted {
            debug!(status = status, "Document accepted");
        } else {
            warn!(status = status, "Document rejected by endpoint");
        }

        Ok(accepted)
    }

    /// The rate limiter guarding this client.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The endpoint documents are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Shut down the rate limiter; later submissions fail without sending.
    pub fn shutdown(&self) {
        self.limiter.shutdown();
    }
}
