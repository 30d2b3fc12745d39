//! Zonescope
//!
//! Explores the DNS delegation hierarchy of a domain using nothing but the
//! JSON API of public DNS-over-HTTPS resolvers.
//!
//! # Features
//!
//! * Zone tree from the root down to the queried name, separating delegated
//!   zones from folded subdomains and CNAME aliases
//! * Record sets (SOA, NS, A, AAAA, CNAME, MX, TXT) with TTLs as close to the
//!   authoritative values as a caching resolver allows
//! * Registration data over RDAP with bootstrap discovery
//! * One shared query budget across all lookups
//!
//! # Example
//!
//! ```no_run
//! use zonescope::dns::context::{LookupConfig, LookupContext};
//! use zonescope::dns::hierarchy::HierarchyResolver;
//!
//! # async fn run() -> Result<(), zonescope::dns::errors::LookupError> {
//! let context = LookupContext::new(LookupConfig::default());
//! let endpoint = context.config.endpoint.clone();
//! let tree = HierarchyResolver::new(context).resolve_hierarchy("www.example.com", &endpoint).await?;
//! println!("deepest zone: {}", tree.deepest().zone_name);
//! # Ok(())
//! # }
//! ```

/// DoH resolution engine
pub mod dns;

pub use dns::context::{LookupConfig, LookupContext};
pub use dns::errors::LookupError;
pub use dns::hierarchy::{HierarchyResolver, ZoneNode};
pub use dns::rdap::{RdapResolver, RegistrationInfo, RegistrationResult};
pub use dns::records::{DetailedRecordSet, RecordAggregator};
