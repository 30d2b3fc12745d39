//! The `LookupContext` holds the state shared by every lookup: configuration,
//! the query budget, the HTTP fetcher and the RDAP server cache

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::dns::errors::LookupError;
use crate::dns::fetch::{HttpFetch, HttpReply, ReqwestFetcher};
use crate::dns::rate_limit::{QueryRateLimiter, RateLimitConfig};
use crate::dns::rdap::RdapServerCache;

/// IANA registry mapping TLDs to RDAP base URLs
pub const IANA_RDAP_BOOTSTRAP_URL: &str = "https://data.iana.org/rdap/dns.json";

#[derive(Debug, Display, From, Error)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
}

/// Well-known public DoH resolvers with a JSON API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DohProvider {
    Cloudflare,
    Google,
}

impl DohProvider {
    pub fn endpoint(&self) -> &'static str {
        match self {
            DohProvider::Cloudflare => "https://cloudflare-dns.com/dns-query",
            DohProvider::Google => "https://dns.google/resolve",
        }
    }
}

/// Lookup configuration
///
/// Every field has a default, so a TOML file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// DoH JSON endpoint used when a call does not name one
    pub endpoint: String,
    /// Per-query timeout in milliseconds
    pub timeout_ms: u64,
    pub rate_limit: RateLimitConfig,
    pub rdap_bootstrap_url: String,
    /// Concurrent copies of each record query in the aggregator
    pub redundant_queries: usize,
    /// Consecutive timeouts after which a hierarchy walk gives up
    pub max_consecutive_timeouts: u32,
}

impl Default for LookupConfig {
    fn default() -> Self {
        LookupConfig {
            endpoint: DohProvider::Cloudflare.endpoint().to_string(),
            timeout_ms: 10_000,
            rate_limit: RateLimitConfig::default(),
            rdap_bootstrap_url: IANA_RDAP_BOOTSTRAP_URL.to_string(),
            redundant_queries: 3,
            max_consecutive_timeouts: 3,
        }
    }
}

impl LookupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

/// Shared lookup state
///
/// Built once per process (or once per test) and handed to each resolver
/// behind an `Arc`.
pub struct LookupContext {
    pub config: LookupConfig,
    pub limiter: Arc<QueryRateLimiter>,
    pub fetcher: Arc<dyn HttpFetch>,
    pub rdap_servers: Arc<RdapServerCache>,
}

impl LookupContext {
    /// Context backed by a real HTTP client
    pub fn new(config: LookupConfig) -> Arc<LookupContext> {
        Self::with_fetcher(config, Arc::new(ReqwestFetcher::new()))
    }

    pub fn with_fetcher(config: LookupConfig, fetcher: Arc<dyn HttpFetch>) -> Arc<LookupContext> {
        let limiter = Arc::new(QueryRateLimiter::new(config.rate_limit.clone()));

        Arc::new(LookupContext {
            config,
            limiter,
            fetcher,
            rdap_servers: Arc::new(RdapServerCache::new()),
        })
    }

    /// Issue one GET against the shared budget and the configured timeout
    ///
    /// `subject` names the domain the request is about, for error reporting.
    pub async fn limited_get(
        &self,
        url: &str,
        accept: &str,
        subject: &str,
    ) -> Result<HttpReply, LookupError> {
        self.limiter.check_and_record()?;

        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, self.fetcher.get(url, accept)).await {
            Ok(reply) => reply,
            Err(_) => {
                log::warn!("Request for {} timed out after {:?}", subject, timeout);
                Err(LookupError::Timeout {
                    domain: subject.to_string(),
                })
            }
        }
    }
}
