//! Detailed record sets with TTL-maximizing redundant queries
//!
//! Public DoH resolvers report the TTL left in their cache, not the TTL the
//! authoritative server hands out. Sending several identical queries at once
//! raises the chance that one lands on a freshly filled cache entry, so every
//! record type is asked `redundant_queries` times concurrently and the answer
//! with the highest TTL wins.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::dns::context::LookupContext;
use crate::dns::doh::{DohClient, DohRecord, DohResponse};
use crate::dns::hierarchy::HierarchyResolver;
use crate::dns::normalize::bare_domain;
use crate::dns::query_type::QueryType;

/// Parsed fields of an SOA record's data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoaData {
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl SoaData {
    /// Parse `MNAME RNAME SERIAL REFRESH RETRY EXPIRE MINIMUM`
    pub fn parse(data: &str) -> Option<SoaData> {
        let fields: Vec<&str> = data.split_whitespace().collect();
        if fields.len() < 7 {
            return None;
        }

        let number = |idx: usize| fields[idx].parse::<u32>().ok();
        Some(SoaData {
            mname: fields[0].to_string(),
            rname: fields[1].to_string(),
            serial: number(2)?,
            refresh: number(3)?,
            retry: number(4)?,
            expire: number(5)?,
            minimum: number(6)?,
        })
    }
}

/// SOA answer as returned, plus its parsed form when well formed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoaRecord {
    pub record: DohRecord,
    pub parsed: Option<SoaData>,
}

/// Record sets of one domain and its zone apex
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedRecordSet {
    pub domain: String,
    pub zone_apex: String,
    pub soa: Option<SoaRecord>,
    pub ns: Option<Vec<DohRecord>>,
    pub a: Option<Vec<DohRecord>>,
    pub aaaa: Option<Vec<DohRecord>>,
    pub cname: Option<Vec<DohRecord>>,
    pub mx: Option<Vec<DohRecord>>,
    pub txt: Option<Vec<DohRecord>>,
}

/// Run `n` copies of a fallible query concurrently and keep the success with
/// the greatest `metric`. Failures are tolerated as long as one succeeds.
pub async fn best_of<F, Fut, T, E, M, K>(n: usize, make_query: F, metric: M) -> Option<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    M: Fn(&T) -> K,
    K: Ord,
{
    let results = join_all((0..n.max(1)).map(|_| make_query())).await;

    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("Redundant query failed: {}", e);
                None
            }
        })
        .max_by_key(|value| metric(value))
}

/// Record aggregator
pub struct RecordAggregator {
    doh: DohClient,
    hierarchy: HierarchyResolver,
}

impl RecordAggregator {
    pub fn new(context: Arc<LookupContext>) -> Self {
        RecordAggregator {
            doh: DohClient::new(context.clone()),
            hierarchy: HierarchyResolver::new(context),
        }
    }

    /// Fetch SOA/NS at the zone apex and A/AAAA/CNAME/MX/TXT at `domain`
    ///
    /// Never fails: record types whose queries all fail are left out.
    pub async fn fetch_detailed_records(
        &self,
        domain: &str,
        endpoint: &str,
        zone_apex: Option<&str>,
    ) -> DetailedRecordSet {
        let domain = match bare_domain(domain) {
            Ok(domain) => domain,
            Err(e) => {
                log::warn!("Not fetching records: {}", e);
                return DetailedRecordSet {
                    domain: domain.to_string(),
                    zone_apex: zone_apex.unwrap_or(domain).to_string(),
                    ..Default::default()
                };
            }
        };

        let zone_apex = match zone_apex.map(bare_domain) {
            Some(Ok(apex)) => apex,
            Some(Err(e)) => {
                log::warn!("Ignoring zone apex: {}", e);
                self.hierarchy.find_zone_apex(&domain, endpoint).await
            }
            None => self.hierarchy.find_zone_apex(&domain, endpoint).await,
        };
        log::info!("Fetching records for {} (zone {})", domain, zone_apex);

        let (soa, ns, a, aaaa, cname, mx, txt) = futures::join!(
            self.best_answers(&zone_apex, QueryType::Soa, endpoint),
            self.best_answers(&zone_apex, QueryType::Ns, endpoint),
            self.best_answers(&domain, QueryType::A, endpoint),
            self.best_answers(&domain, QueryType::Aaaa, endpoint),
            self.best_answers(&domain, QueryType::Cname, endpoint),
            self.best_answers(&domain, QueryType::Mx, endpoint),
            self.best_answers(&domain, QueryType::Txt, endpoint),
        );

        let soa = soa.and_then(|records| records.into_iter().next()).map(|record| SoaRecord {
            parsed: SoaData::parse(&record.data),
            record,
        });

        DetailedRecordSet {
            domain,
            zone_apex,
            soa,
            ns,
            a,
            aaaa,
            cname,
            mx,
            txt,
        }
    }

    /// Records of `qtype` from the highest-TTL response among the redundant queries
    async fn best_answers(
        &self,
        name: &str,
        qtype: QueryType,
        endpoint: &str,
    ) -> Option<Vec<DohRecord>> {
        let copies = self.doh.context().config.redundant_queries;
        let best: DohResponse = best_of(
            copies,
            move || self.doh.query(name, qtype, endpoint),
            |response: &DohResponse| response.answers_of(qtype).map(|r| r.ttl).max(),
        )
        .await?;

        let records: Vec<DohRecord> = best.answers_of(qtype).cloned().collect();
        if records.is_empty() {
            None
        } else {
            Some(records)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soa_parse() {
        let soa = SoaData::parse("ns1.example.com. hostmaster.example.com. 2024010101 7200 3600 1209600 300")
            .unwrap();
        assert_eq!(soa.mname, "ns1.example.com.");
        assert_eq!(soa.rname, "hostmaster.example.com.");
        assert_eq!(soa.serial, 2024010101);
        assert_eq!(soa.refresh, 7200);
        assert_eq!(soa.retry, 3600);
        assert_eq!(soa.expire, 1209600);
        assert_eq!(soa.minimum, 300);
    }

    #[test]
    fn test_soa_parse_malformed() {
        assert_eq!(SoaData::parse("ns1.example.com. hostmaster.example.com. 1 2"), None);
        assert_eq!(SoaData::parse("a b c d e f g"), None);
        assert_eq!(SoaData::parse(""), None);
    }

    #[tokio::test]
    async fn test_best_of_keeps_max() {
        let ttls = parking_lot::Mutex::new(vec![58u32, 60, 59]);
        let best = best_of(
            3,
            || {
                let ttl = ttls.lock().remove(0);
                async move { Ok::<u32, String>(ttl) }
            },
            |ttl| *ttl,
        )
        .await;
        assert_eq!(best, Some(60));
    }

    #[tokio::test]
    async fn test_best_of_tolerates_failures() {
        let outcomes = parking_lot::Mutex::new(vec![Err("timeout"), Ok(7u32), Err("reset")]);
        let best = best_of(
            3,
            || {
                let outcome = outcomes.lock().remove(0);
                async move { outcome.map_err(|e| e.to_string()) }
            },
            |value| *value,
        )
        .await;
        assert_eq!(best, Some(7));

        let none = best_of(2, || async { Err::<u32, &str>("down") }, |value| *value).await;
        assert_eq!(none, None);
    }
}
