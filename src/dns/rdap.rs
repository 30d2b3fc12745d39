//! RDAP registration lookups with bootstrap discovery
//!
//! The RDAP server for a TLD is found through IANA's bootstrap registry, a
//! JSON document mapping TLD lists to base URL lists. Servers found are kept
//! per TLD for the life of the cache; misses are not cached, so a TLD that
//! gains an RDAP service is picked up on the next lookup.
//!
//! Registration responses are read best-effort: every field that is missing
//! or shaped unexpectedly comes back as `None` instead of failing the lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dns::context::LookupContext;
use crate::dns::normalize::{bare_domain, tld_of};

pub const RDAP_CONTENT_TYPE_JSON: &str = "application/rdap+json";

const SERVER_NOT_FOUND: &str = "RDAP server not found for this TLD";

/// TLD to RDAP base URLs, filled on first successful lookup per TLD
pub struct RdapServerCache {
    servers: RwLock<HashMap<String, Vec<String>>>,
}

impl RdapServerCache {
    pub fn new() -> Self {
        RdapServerCache {
            servers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tld: &str) -> Option<Vec<String>> {
        self.servers.read().get(tld).cloned()
    }

    pub fn insert(&self, tld: &str, servers: Vec<String>) {
        self.servers.write().insert(tld.to_string(), servers);
    }

    pub fn contains(&self, tld: &str) -> bool {
        self.servers.read().contains_key(tld)
    }

    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}

impl Default for RdapServerCache {
    fn default() -> Self {
        RdapServerCache::new()
    }
}

/// Normalized registration metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    pub domain: String,
    pub registrar: Option<String>,
    pub registered: Option<String>,
    pub expires: Option<String>,
    pub last_changed: Option<String>,
    pub status: Vec<String>,
    pub nameservers: Vec<String>,
    pub rdap_server: String,
}

/// Outcome of a registration lookup; failures serialize as `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegistrationResult {
    Found(RegistrationInfo),
    Failed { error: String },
}

impl RegistrationResult {
    fn failed(error: impl Into<String>) -> Self {
        RegistrationResult::Failed {
            error: error.into(),
        }
    }

    pub fn info(&self) -> Option<&RegistrationInfo> {
        match self {
            RegistrationResult::Found(info) => Some(info),
            RegistrationResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RegistrationResult::Found(_) => None,
            RegistrationResult::Failed { error } => Some(error.as_str()),
        }
    }
}

/// Base URLs of the first bootstrap service listing `tld`
pub fn servers_for_tld(bootstrap: &Value, tld: &str) -> Option<Vec<String>> {
    let services = bootstrap.get("services")?.as_array()?;

    services.iter().find_map(|service| {
        let service = service.as_array()?;
        let tlds = service.get(0)?.as_array()?;
        let listed = tlds
            .iter()
            .filter_map(Value::as_str)
            .any(|entry| entry.eq_ignore_ascii_case(tld));
        if !listed {
            return None;
        }

        let urls: Vec<String> = service
            .get(1)?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            None
        } else {
            Some(urls)
        }
    })
}

/// `{server}/domain/{domain}` without a doubled slash
pub fn domain_query_url(server: &str, domain: &str) -> String {
    format!("{}/domain/{}", server.trim_end_matches('/'), domain)
}

/// Formatted name (`fn`) from an entity's jCard
fn vcard_formatted_name(entity: &Value) -> Option<String> {
    let properties = entity.get("vcardArray")?.as_array()?.get(1)?.as_array()?;

    properties.iter().find_map(|property| {
        let property = property.as_array()?;
        if property.get(0)?.as_str()? != "fn" {
            return None;
        }
        property
            .get(3)?
            .as_str()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    })
}

fn has_role(entity: &Value, role: &str) -> bool {
    entity
        .get("roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_str)
                .any(|r| r.eq_ignore_ascii_case(role))
        })
        .unwrap_or(false)
}

/// Registrar name, searching nested entities as well
fn registrar_name(entities: &[Value]) -> Option<String> {
    entities.iter().find_map(|entity| {
        if has_role(entity, "registrar") {
            if let Some(name) = vcard_formatted_name(entity) {
                return Some(name);
            }
        }
        entity
            .get("entities")
            .and_then(Value::as_array)
            .and_then(|nested| registrar_name(nested))
    })
}

fn event_date(events: &[Value], action: &str) -> Option<String> {
    events.iter().find_map(|event| {
        let event_action = event.get("eventAction")?.as_str()?;
        if !event_action.eq_ignore_ascii_case(action) {
            return None;
        }
        event.get("eventDate")?.as_str().map(str::to_string)
    })
}

fn array_of<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Pull registration fields out of an RDAP domain object
pub fn parse_registration(body: &Value, domain: &str, rdap_server: &str) -> RegistrationInfo {
    let events = array_of(body, "events");

    RegistrationInfo {
        domain: body
            .get("ldhName")
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| domain.to_string()),
        registrar: registrar_name(array_of(body, "entities")),
        registered: event_date(events, "registration"),
        expires: event_date(events, "expiration"),
        last_changed: event_date(events, "last changed"),
        status: array_of(body, "status")
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        nameservers: array_of(body, "nameservers")
            .iter()
            .filter_map(|ns| ns.get("ldhName").and_then(Value::as_str))
            .map(|ns| ns.trim_end_matches('.').to_ascii_lowercase())
            .collect(),
        rdap_server: rdap_server.to_string(),
    }
}

/// RDAP resolver
pub struct RdapResolver {
    context: Arc<LookupContext>,
}

impl RdapResolver {
    pub fn new(context: Arc<LookupContext>) -> Self {
        RdapResolver { context }
    }

    /// Look up registration data for `domain`, usually a zone apex
    ///
    /// Failures come back as `RegistrationResult::Failed` and are never raised.
    pub async fn query_registration(&self, domain: &str) -> RegistrationResult {
        let domain = match bare_domain(domain) {
            Ok(domain) => domain,
            Err(e) => return RegistrationResult::failed(e.user_message(domain)),
        };
        let tld = match tld_of(&domain) {
            Some(tld) => tld.to_string(),
            None => return RegistrationResult::failed(SERVER_NOT_FOUND),
        };

        let server = match self.server_for(&tld).await {
            Ok(Some(server)) => server,
            Ok(None) => {
                log::info!("No RDAP service registered for .{}", tld);
                return RegistrationResult::failed(SERVER_NOT_FOUND);
            }
            Err(message) => return RegistrationResult::failed(message),
        };

        let url = domain_query_url(&server, &domain);
        log::debug!("RDAP lookup {}", url);

        let reply = match self
            .context
            .limited_get(&url, RDAP_CONTENT_TYPE_JSON, &domain)
            .await
        {
            Ok(reply) => reply,
            Err(e) => return RegistrationResult::failed(e.user_message(&domain)),
        };
        if !reply.is_success() {
            return RegistrationResult::failed(format!(
                "RDAP query failed with status {}",
                reply.status
            ));
        }

        match serde_json::from_str::<Value>(&reply.body) {
            Ok(body) => RegistrationResult::Found(parse_registration(&body, &domain, &server)),
            Err(e) => {
                log::warn!("Unreadable RDAP response for {}: {}", domain, e);
                RegistrationResult::failed(format!("Invalid RDAP response for {}", domain))
            }
        }
    }

    /// First RDAP base URL for `tld`, consulting the bootstrap registry on a cache miss
    async fn server_for(&self, tld: &str) -> Result<Option<String>, String> {
        if let Some(servers) = self.context.rdap_servers.get(tld) {
            return Ok(servers.into_iter().next());
        }

        let bootstrap_url = &self.context.config.rdap_bootstrap_url;
        let reply = self
            .context
            .limited_get(bootstrap_url, "application/json", tld)
            .await
            .map_err(|e| format!("RDAP bootstrap unavailable: {}", e))?;
        if !reply.is_success() {
            return Err(format!(
                "RDAP bootstrap unavailable: HTTP {}",
                reply.status
            ));
        }

        let bootstrap: Value = serde_json::from_str(&reply.body)
            .map_err(|e| format!("RDAP bootstrap unreadable: {}", e))?;

        Ok(servers_for_tld(&bootstrap, tld).and_then(|servers| {
            let first = servers.first().cloned();
            self.context.rdap_servers.insert(tld, servers);
            first
        }))
    }
}
