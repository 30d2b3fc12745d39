//! Error types for DoH lookups, hierarchy walks and record aggregation

use std::error::Error;
use std::time::Duration;

use derive_more::Display;

/// Lookup error with enough context to render a short user-facing message
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The queried name answered NXDOMAIN
    #[display(fmt = "Domain {} does not exist", domain)]
    DomainNotFound { domain: String },
    /// The shared query budget is spent
    #[display(fmt = "Rate limited, window resets in {}ms", reset_delay_ms)]
    RateLimited { reset_delay_ms: u64 },
    /// A single query exceeded the configured timeout
    #[display(fmt = "Query for {} timed out", domain)]
    Timeout { domain: String },
    /// The resolver answered with a non-success HTTP status
    #[display(fmt = "Resolver returned HTTP status {}", status)]
    Transport { status: u16 },
    /// The request could not be sent or the body could not be read
    #[display(fmt = "HTTP request failed: {}", _0)]
    Http(String),
    /// The response body was not the expected JSON document
    #[display(fmt = "Failed to decode response: {}", _0)]
    Decode(String),
    /// Input could not be turned into a domain name
    #[display(fmt = "Invalid domain name: {:?}", _0)]
    InvalidDomain(String),
    /// Too many consecutive timeouts during a walk
    #[display(fmt = "Resolver stopped answering while walking {}", domain)]
    TransportExhausted { domain: String },
    /// The candidate owns no SOA, so it is part of an enclosing zone.
    /// Only used inside the hierarchy walk.
    #[display(fmt = "{} is not a zone apex", domain)]
    NotAZone { domain: String },
}

impl Error for LookupError {}

impl LookupError {
    /// Short message naming the offending domain and the reason
    pub fn user_message(&self, domain: &str) -> String {
        match self {
            LookupError::DomainNotFound { .. } => format!("{} does not exist", domain),
            LookupError::RateLimited { reset_delay_ms } => {
                let secs = Duration::from_millis(*reset_delay_ms).as_secs_f64().ceil() as u64;
                format!("Rate limited while looking up {}, retry in {}s", domain, secs.max(1))
            }
            LookupError::Timeout { .. } | LookupError::TransportExhausted { .. } => {
                format!("Lookup of {} timed out", domain)
            }
            LookupError::Transport { status } => {
                format!("Resolver rejected the query for {} (HTTP {})", domain, status)
            }
            LookupError::InvalidDomain(_) => format!("{} is not a valid domain name", domain),
            LookupError::Http(_) | LookupError::Decode(_) | LookupError::NotAZone { .. } => {
                format!("Lookup of {} failed", domain)
            }
        }
    }

    /// Whether this error was caused by the per-query timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, LookupError::Timeout { .. })
    }

    /// Errors that end a best-effort walk instead of being absorbed
    pub fn is_fatal_for_walk(&self) -> bool {
        matches!(
            self,
            LookupError::RateLimited { .. } | LookupError::TransportExhausted { .. }
        )
    }
}

/// Result type alias for lookup operations
pub type LookupResult<T> = Result<T, LookupError>;
