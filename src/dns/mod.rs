//! DoH-based zone resolution
//!
//! This module resolves where zone boundaries fall for a domain using only the
//! JSON API of public DNS-over-HTTPS resolvers, fetches detailed record sets,
//! and looks up registration data over RDAP.
//!
//! # Module Structure
//!
//! * `doh` - single DoH JSON queries with timeout
//! * `hierarchy` - label walk that builds the zone tree
//! * `records` - record sets with redundant TTL-maximizing queries
//! * `rdap` - RDAP bootstrap discovery and registration lookups
//! * `context` - configuration and the shared query state

/// Shared configuration, query budget and caches
pub mod context;

/// DNS-over-HTTPS (DoH) JSON client
pub mod doh;

/// Error types for lookups
pub mod errors;

/// HTTP GET seam shared by DoH and RDAP
pub mod fetch;

/// Zone hierarchy resolution
pub mod hierarchy;

/// Domain input normalization
pub mod normalize;

/// Known multi-label public suffixes
pub mod public_suffix;

/// DNS record type definitions
pub mod query_type;

/// Rate limiting for outbound queries
pub mod rate_limit;

/// RDAP registration lookups
pub mod rdap;

/// Detailed record sets
pub mod records;
