//! DNS-over-HTTPS (DoH) JSON client
//!
//! Issues single `application/dns-json` queries of the form
//! `{endpoint}?name={domain}&type={TYPE}` as exposed by Cloudflare, Google
//! and compatible resolvers. Each query consumes one slot of the shared
//! query budget and is bounded by the configured timeout. There is no retry
//! and no caching here; retry policy belongs to the callers.

use std::sync::Arc;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::dns::context::LookupContext;
use crate::dns::errors::LookupError;
use crate::dns::query_type::QueryType;

/// DoH Content Type for the JSON API
pub const DOH_CONTENT_TYPE_JSON: &str = "application/dns-json";

/// Response codes carried in the `Status` field
pub const STATUS_NOERROR: u32 = 0;
pub const STATUS_SERVFAIL: u32 = 2;
pub const STATUS_NXDOMAIN: u32 = 3;

/// DNS JSON format for application/dns-json responses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DohResponse {
    /// Status (standard DNS response code)
    #[serde(rename = "Status")]
    pub status: u32,
    /// Answer section
    #[serde(rename = "Answer", default, skip_serializing_if = "Vec::is_empty")]
    pub answer: Vec<DohRecord>,
    /// Authority section
    #[serde(rename = "Authority", default, skip_serializing_if = "Vec::is_empty")]
    pub authority: Vec<DohRecord>,
}

impl DohResponse {
    pub fn is_nxdomain(&self) -> bool {
        self.status == STATUS_NXDOMAIN
    }

    /// Answer records of one type
    pub fn answers_of(&self, qtype: QueryType) -> impl Iterator<Item = &DohRecord> {
        let code = qtype.to_num();
        self.answer.iter().filter(move |r| r.rtype == code)
    }

    /// Highest TTL in the answer section
    pub fn max_answer_ttl(&self) -> Option<u32> {
        self.answer.iter().map(|r| r.ttl).max()
    }
}

/// DNS JSON Record format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DohRecord {
    /// Owner name as returned, usually with a trailing dot
    pub name: String,
    /// Record type
    #[serde(rename = "type")]
    pub rtype: u16,
    /// Remaining time to live in the resolver's cache
    #[serde(rename = "TTL", default)]
    pub ttl: u32,
    /// Record data
    #[serde(default)]
    pub data: String,
}

impl DohRecord {
    pub fn record_type(&self) -> QueryType {
        QueryType::from_num(self.rtype)
    }

    /// Owner name lowercased without the trailing dot
    pub fn owner(&self) -> String {
        self.name.trim().trim_end_matches('.').to_ascii_lowercase()
    }
}

/// DoH Client implementation for JSON queries
pub struct DohClient {
    context: Arc<LookupContext>,
}

impl DohClient {
    pub fn new(context: Arc<LookupContext>) -> Self {
        DohClient { context }
    }

    pub fn context(&self) -> &Arc<LookupContext> {
        &self.context
    }

    /// Build the GET URL for a query
    pub fn query_url(endpoint: &str, domain: &str, qtype: QueryType) -> Result<Url, LookupError> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| LookupError::Http(format!("Invalid DoH endpoint {}: {}", endpoint, e)))?;
        url.query_pairs_mut()
            .append_pair("name", domain)
            .append_pair("type", &qtype.mnemonic());
        Ok(url)
    }

    /// Query DNS over HTTPS using the JSON API
    pub async fn query(
        &self,
        domain: &str,
        qtype: QueryType,
        endpoint: &str,
    ) -> Result<DohResponse, LookupError> {
        let url = Self::query_url(endpoint, domain, qtype)?;

        let reply = self
            .context
            .limited_get(url.as_str(), DOH_CONTENT_TYPE_JSON, domain)
            .await?;

        if !reply.is_success() {
            log::debug!("DoH {} {} returned HTTP {}", qtype, domain, reply.status);
            return Err(LookupError::Transport {
                status: reply.status,
            });
        }

        let response: DohResponse = serde_json::from_str(&reply.body)
            .map_err(|e| LookupError::Decode(format!("DoH answer for {}: {}", domain, e)))?;

        log::debug!(
            "DoH {} {} -> status {}, {} answers, {} authority",
            qtype,
            domain,
            response.status,
            response.answer.len(),
            response.authority.len()
        );

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_url() {
        let url = DohClient::query_url("https://dns.google/resolve", "example.com", QueryType::Soa)
            .unwrap();
        assert_eq!(url.as_str(), "https://dns.google/resolve?name=example.com&type=SOA");

        let url = DohClient::query_url("https://doh.example/dns-query?ct=json", ".", QueryType::Ns)
            .unwrap();
        assert_eq!(url.as_str(), "https://doh.example/dns-query?ct=json&name=.&type=NS");

        assert!(DohClient::query_url("not a url", "example.com", QueryType::A).is_err());
    }

    #[test]
    fn test_dns_json_deserialization() {
        let body = r#"{
            "Status": 0, "TC": false, "RD": true, "RA": true, "AD": false, "CD": false,
            "Question": [{"name": "example.com.", "type": 6}],
            "Answer": [{"name": "example.com.", "type": 6, "TTL": 3600,
                        "data": "ns.icann.org. noc.dns.icann.org. 2024 7200 3600 1209600 3600"}]
        }"#;

        let response: DohResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.status, STATUS_NOERROR);
        assert!(response.authority.is_empty());
        assert_eq!(response.answer[0].owner(), "example.com");
        assert_eq!(response.answer[0].record_type(), QueryType::Soa);
        assert_eq!(response.max_answer_ttl(), Some(3600));
    }

    #[test]
    fn test_nxdomain_with_authority() {
        let body = r#"{"Status": 3, "Authority": [{"name": "com.", "type": 6, "TTL": 900,
            "data": "a.gtld-servers.net. nstld.verisign-grs.com. 1 1800 900 604800 86400"}]}"#;

        let response: DohResponse = serde_json::from_str(body).unwrap();
        assert!(response.is_nxdomain());
        assert!(response.answer.is_empty());
        assert_eq!(response.answers_of(QueryType::Soa).count(), 0);
        assert_eq!(response.max_answer_ttl(), None);
    }
}
