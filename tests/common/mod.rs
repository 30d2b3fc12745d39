//! Scripted HTTP backend shared by the integration tests
//!
//! DoH requests are answered by `name|TYPE` key, everything else by exact URL.
//! A key may hold several replies which are handed out in order; the last one
//! keeps being returned. Unscripted DoH keys answer NOERROR with no records,
//! unscripted URLs answer 404.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::{json, Value};

use zonescope::dns::context::{LookupConfig, LookupContext};
use zonescope::dns::errors::LookupError;
use zonescope::dns::fetch::{HttpFetch, HttpReply};

pub const ENDPOINT: &str = "https://doh.test/dns-query";
pub const BOOTSTRAP: &str = "https://bootstrap.test/rdap/dns.json";

#[derive(Clone)]
enum Scripted {
    Reply(HttpReply),
    Fail(LookupError),
    Hang,
}

#[derive(Default)]
pub struct ScriptedFetcher {
    dns: Mutex<HashMap<String, VecDeque<Scripted>>>,
    urls: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

fn dns_key(name: &str, qtype: &str) -> String {
    format!("{}|{}", name.trim_end_matches('.').to_ascii_lowercase(), qtype)
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedFetcher::default())
    }

    fn push(&self, name: &str, qtype: &str, scripted: Scripted) {
        self.dns
            .lock()
            .entry(dns_key(name, qtype))
            .or_default()
            .push_back(scripted);
    }

    /// Queue a DoH JSON body for `name`/`qtype`
    pub fn dns(&self, name: &str, qtype: &str, body: Value) {
        self.push(name, qtype, Scripted::Reply(HttpReply::new(200, body.to_string())));
    }

    pub fn dns_status(&self, name: &str, qtype: &str, status: u16) {
        self.push(name, qtype, Scripted::Reply(HttpReply::new(status, "")));
    }

    pub fn dns_error(&self, name: &str, qtype: &str, error: LookupError) {
        self.push(name, qtype, Scripted::Fail(error));
    }

    /// Never answer `name`/`qtype`
    pub fn hang(&self, name: &str, qtype: &str) {
        self.push(name, qtype, Scripted::Hang);
    }

    pub fn url(&self, url: &str, status: u16, body: Value) {
        self.urls
            .lock()
            .insert(url.to_string(), Scripted::Reply(HttpReply::new(status, body.to_string())));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == needle).count()
    }

    fn next_dns(&self, key: &str) -> Scripted {
        let mut dns = self.dns.lock();
        match dns.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Scripted::Reply(HttpReply::new(200, json!({ "Status": 0 }).to_string())),
        }
    }
}

#[async_trait]
impl HttpFetch for ScriptedFetcher {
    async fn get(&self, url: &str, _accept: &str) -> Result<HttpReply, LookupError> {
        let parsed = Url::parse(url).map_err(|e| LookupError::Http(e.to_string()))?;
        let pairs: HashMap<String, String> = parsed.query_pairs().into_owned().collect();

        let scripted = match (pairs.get("name"), pairs.get("type")) {
            (Some(name), Some(qtype)) => {
                let key = dns_key(name, qtype);
                self.calls.lock().push(key.clone());
                self.next_dns(&key)
            }
            _ => {
                self.calls.lock().push(url.to_string());
                self.urls
                    .lock()
                    .get(url)
                    .cloned()
                    .unwrap_or_else(|| Scripted::Reply(HttpReply::new(404, "")))
            }
        };

        match scripted {
            Scripted::Reply(reply) => Ok(reply),
            Scripted::Fail(error) => Err(error),
            Scripted::Hang => futures::future::pending().await,
        }
    }
}

pub fn config() -> LookupConfig {
    LookupConfig {
        endpoint: ENDPOINT.to_string(),
        rdap_bootstrap_url: BOOTSTRAP.to_string(),
        ..LookupConfig::default()
    }
}

pub fn context(fetcher: &Arc<ScriptedFetcher>) -> Arc<LookupContext> {
    context_with(config(), fetcher)
}

pub fn context_with(config: LookupConfig, fetcher: &Arc<ScriptedFetcher>) -> Arc<LookupContext> {
    LookupContext::with_fetcher(config, fetcher.clone())
}

pub fn record(name: &str, rtype: u16, ttl: u32, data: &str) -> Value {
    json!({ "name": name, "type": rtype, "TTL": ttl, "data": data })
}

pub fn soa_record(owner: &str) -> Value {
    record(
        owner,
        6,
        3600,
        &format!("ns1.{0} hostmaster.{0} 2024010101 7200 3600 1209600 300", owner),
    )
}

/// SOA owned by `owner` in the Answer section
pub fn soa_answer(owner: &str) -> Value {
    json!({ "Status": 0, "Answer": [soa_record(owner)] })
}

/// NOERROR/NODATA with the enclosing zone's SOA in the Authority section
pub fn soa_authority(owner: &str) -> Value {
    json!({ "Status": 0, "Authority": [soa_record(owner)] })
}

pub fn nxdomain(zone: &str) -> Value {
    json!({ "Status": 3, "Authority": [soa_record(zone)] })
}

pub fn ns_answer(owner: &str, hosts: &[&str]) -> Value {
    let answers: Vec<Value> = hosts
        .iter()
        .map(|host| record(owner, 2, 172800, &format!("{}.", host)))
        .collect();
    json!({ "Status": 0, "Answer": answers })
}

pub fn cname_answer(owner: &str, target: &str) -> Value {
    json!({ "Status": 0, "Answer": [record(owner, 5, 300, target)] })
}

/// Root and `com` zones, plus `example.com` served by its own nameservers
pub fn script_example_com(fetcher: &ScriptedFetcher) {
    fetcher.dns(".", "NS", ns_answer(".", &["a.root-servers.net", "b.root-servers.net"]));
    fetcher.dns("com", "SOA", soa_answer("com."));
    fetcher.dns("com", "NS", ns_answer("com.", &["a.gtld-servers.net", "b.gtld-servers.net"]));
    fetcher.dns("example.com", "SOA", soa_answer("example.com."));
    fetcher.dns(
        "example.com",
        "NS",
        ns_answer("example.com.", &["a.iana-servers.net", "b.iana-servers.net"]),
    );
}

/// `staging.example.com` delegated to nameservers disjoint from `example.com`'s
pub fn script_staging(fetcher: &ScriptedFetcher) {
    script_example_com(fetcher);
    fetcher.dns("staging.example.com", "SOA", soa_answer("staging.example.com."));
    fetcher.dns(
        "staging.example.com",
        "NS",
        ns_answer("staging.example.com.", &["ns1.staging-dns.net", "ns2.staging-dns.net"]),
    );
}
