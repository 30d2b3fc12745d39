//! HTTP GET seam used by the DoH transport and the RDAP resolver
//!
//! Everything that leaves the process goes through [`HttpFetch`], which keeps
//! the resolution engine independent of the HTTP stack and lets tests replay
//! scripted resolver answers.

use async_trait::async_trait;

use crate::dns::errors::LookupError;

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        HttpReply {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a single HTTP GET
///
/// Implementations neither retry nor apply a timeout; callers wrap the
/// returned future in their own deadline.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str, accept: &str) -> Result<HttpReply, LookupError>;
}

/// `HttpFetch` backed by a shared `reqwest::Client`
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("zonescope/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                log::error!("Failed to create HTTP client: {}, using default", e);
                reqwest::Client::new()
            });

        ReqwestFetcher { client }
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        ReqwestFetcher::new()
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, url: &str, accept: &str) -> Result<HttpReply, LookupError> {
        let response = self
            .client
            .get(url)
            .header("Accept", accept)
            .send()
            .await
            .map_err(|e| LookupError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| LookupError::Http(format!("Failed to read response: {}", e)))?;

        Ok(HttpReply { status, body })
    }
}
