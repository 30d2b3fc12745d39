//! Zone hierarchy resolution over DoH
//!
//! Walks a name's labels from the root downward and decides for every suffix
//! whether it starts a zone of its own, belongs to the enclosing zone, or is
//! an alias. Only public DoH answers are available, so zone cuts are inferred:
//!
//! * a name owning an SOA record (in the Answer section, or in the Authority
//!   section for resolvers that answer apex hits that way) is a zone apex,
//! * a zone apex whose NS set shares nothing with the enclosing zone's NS set
//!   is delegated and becomes a new node,
//! * everything else is folded into the `domains` of the enclosing node.
//!
//! The walk is sequential because each step compares against the node the
//! previous step produced. Per-candidate failures degrade the result instead
//! of failing the call; only NXDOMAIN on the queried name, rate limiting, and
//! repeated timeouts reach the caller.

use std::mem;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dns::context::LookupContext;
use crate::dns::doh::{DohClient, DohRecord, DohResponse};
use crate::dns::errors::LookupError;
use crate::dns::normalize::{bare_domain, bare_name, clean_domain};
use crate::dns::public_suffix::public_suffix_of;
use crate::dns::query_type::QueryType;

/// One zone in the resolved hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneNode {
    pub zone_name: String,
    /// The zone name plus every non-delegated name folded into it, in walk order
    pub domains: Vec<String>,
    /// Sorted, lowercased, without trailing dots
    pub nameservers: Vec<String>,
    /// Root is 0; each child is one deeper than its parent
    pub depth: u32,
    pub is_delegated: bool,
    pub is_cname: bool,
    pub cname_target: Option<String>,
    pub children: Vec<ZoneNode>,
}

impl ZoneNode {
    fn new(zone_name: &str, nameservers: Vec<String>, depth: u32) -> Self {
        ZoneNode {
            zone_name: zone_name.to_string(),
            domains: vec![zone_name.to_string()],
            nameservers,
            depth,
            is_delegated: false,
            is_cname: false,
            cname_target: None,
            children: Vec::new(),
        }
    }

    /// Append a name unless it is already listed
    fn add_domain(&mut self, name: &str) {
        if !self.domains.iter().any(|d| d == name) {
            self.domains.push(name.to_string());
        }
    }

    fn mark_cname(&mut self, target: String) {
        self.is_cname = true;
        self.cname_target = Some(target);
    }

    /// Follow the first-child chain to the deepest zone
    pub fn deepest(&self) -> &ZoneNode {
        let mut node = self;
        while let Some(child) = node.children.first() {
            node = child;
        }
        node
    }

    /// Find a node by zone name anywhere below (and including) this one
    pub fn find(&self, zone_name: &str) -> Option<&ZoneNode> {
        if self.zone_name == zone_name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(zone_name))
    }

    /// All nodes in pre-order
    pub fn nodes(&self) -> Vec<&ZoneNode> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.nodes());
        }
        nodes
    }
}

/// SOA owner and nameserver set of a confirmed zone apex
#[derive(Debug)]
struct ZoneInfo {
    name: String,
    nameservers: Vec<String>,
}

/// Names the walk visits, derived from the queried domain
#[derive(Debug, PartialEq, Eq)]
pub struct WalkPlan {
    pub tld: String,
    /// Two-label registration suffix such as `co.uk`
    pub public_suffix: Option<String>,
    /// Possible zone cuts below the TLD (or suffix), shortest first
    pub candidates: Vec<String>,
}

impl WalkPlan {
    /// Plan the walk for a name without trailing dot; `None` for the root
    pub fn for_domain(bare: &str) -> Option<WalkPlan> {
        if bare == "." || bare.is_empty() {
            return None;
        }

        let labels: Vec<&str> = bare.split('.').collect();
        let tld = labels[labels.len() - 1].to_string();
        let public_suffix = public_suffix_of(&labels);

        let registry_labels = if public_suffix.is_some() { 2 } else { 1 };
        let candidates = (registry_labels + 1..=labels.len())
            .map(|n| labels[labels.len() - n..].join("."))
            .collect();

        Some(WalkPlan {
            tld,
            public_suffix,
            candidates,
        })
    }
}

/// A child zone is delegated iff both NS sets are known and disjoint
pub fn is_delegated(parent_ns: &[String], child_ns: &[String]) -> bool {
    !parent_ns.is_empty()
        && !child_ns.is_empty()
        && !child_ns.iter().any(|ns| parent_ns.contains(ns))
}

/// Link the chain of zones found by the walk into a tree
fn assemble(ancestors: Vec<ZoneNode>, deepest: ZoneNode) -> ZoneNode {
    ancestors
        .into_iter()
        .rev()
        .fold(deepest, |child, mut parent| {
            parent.children.push(child);
            parent
        })
}

fn normalize_host(data: &str) -> String {
    data.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Decides which per-candidate errors the walk may absorb
struct WalkBudget {
    consecutive_timeouts: u32,
    max_consecutive_timeouts: u32,
}

impl WalkBudget {
    fn new(max_consecutive_timeouts: u32) -> Self {
        WalkBudget {
            consecutive_timeouts: 0,
            max_consecutive_timeouts,
        }
    }

    fn reset(&mut self) {
        self.consecutive_timeouts = 0;
    }

    fn absorb(&mut self, error: LookupError, name: &str) -> Result<(), LookupError> {
        if error.is_fatal_for_walk() {
            return Err(error);
        }

        if error.is_timeout() {
            self.consecutive_timeouts += 1;
            if self.max_consecutive_timeouts > 0
                && self.consecutive_timeouts >= self.max_consecutive_timeouts
            {
                log::warn!(
                    "{} consecutive timeouts while resolving {}, giving up",
                    self.consecutive_timeouts,
                    name
                );
                return Err(LookupError::TransportExhausted {
                    domain: name.to_string(),
                });
            }
        } else {
            // any other outcome ends a run of timeouts
            self.reset();
        }

        log::debug!("Folding {} into enclosing zone: {}", name, error);
        Ok(())
    }
}

/// Zone hierarchy resolver
pub struct HierarchyResolver {
    doh: DohClient,
}

impl HierarchyResolver {
    pub fn new(context: Arc<LookupContext>) -> Self {
        HierarchyResolver {
            doh: DohClient::new(context),
        }
    }

    /// Resolve the zone tree for `domain`, rooted at "."
    pub async fn resolve_hierarchy(
        &self,
        domain: &str,
        endpoint: &str,
    ) -> Result<ZoneNode, LookupError> {
        let domain = clean_domain(domain)?;
        log::info!("Resolving zone hierarchy for {} via {}", domain, endpoint);

        let probe = self.doh.query(&domain, QueryType::Soa, endpoint).await?;
        if probe.is_nxdomain() {
            log::info!("{} does not exist", domain);
            return Err(LookupError::DomainNotFound { domain });
        }

        let mut budget = WalkBudget::new(self.doh.context().config.max_consecutive_timeouts);
        let target = bare_name(&domain).to_string();

        let plan = match WalkPlan::for_domain(&target) {
            Some(plan) => plan,
            None => {
                let root_ns = self.tolerant_nameservers(".", endpoint, &mut budget).await?;
                return Ok(ZoneNode::new(".", root_ns, 0));
            }
        };

        // the probe already holds the SOA answer of the queried name
        let mut probe = Some(probe);
        let tld_soa = if plan.tld == target { probe.take() } else { None };

        let (root_ns, tld_zone) = futures::join!(
            self.nameservers_of(".", endpoint),
            self.zone_info(&plan.tld, endpoint, tld_soa)
        );

        let root_ns = match root_ns {
            Ok(ns) => ns,
            Err(e) => {
                budget.absorb(e, ".")?;
                Vec::new()
            }
        };
        let mut tld_node = match tld_zone {
            Ok(info) => ZoneNode::new(&info.name, info.nameservers, 1),
            Err(e) => {
                budget.absorb(e, &plan.tld)?;
                ZoneNode::new(&plan.tld, Vec::new(), 1)
            }
        };
        if let Some(suffix) = &plan.public_suffix {
            tld_node.add_domain(suffix);
        }

        let mut ancestors = vec![ZoneNode::new(".", root_ns, 0)];
        let mut current = tld_node;

        for (index, candidate) in plan.candidates.iter().enumerate() {
            let is_target = *candidate == target;

            let known_soa = if is_target { probe.take() } else { None };
            let zone = match self.zone_info(candidate, endpoint, known_soa).await {
                Ok(info) => {
                    budget.reset();
                    Some(info)
                }
                Err(LookupError::DomainNotFound { .. }) => {
                    log::info!(
                        "{} does not exist, stopping walk below {}",
                        candidate,
                        current.zone_name
                    );
                    current.add_domain(&target);
                    break;
                }
                Err(e) => {
                    budget.absorb(e, candidate)?;
                    None
                }
            };

            let cname = if is_target {
                match self.cname_of(candidate, endpoint).await {
                    Ok(cname) => {
                        budget.reset();
                        cname
                    }
                    Err(e) => {
                        budget.absorb(e, candidate)?;
                        None
                    }
                }
            } else {
                None
            };

            match zone {
                // An alias at the queried name never becomes a zone of its own
                Some(info) if cname.is_none() => {
                    let delegated = is_delegated(&current.nameservers, &info.nameservers);
                    if index == 0 || delegated {
                        log::debug!(
                            "{} is a zone below {} (delegated: {})",
                            info.name,
                            current.zone_name,
                            delegated
                        );
                        let mut node = ZoneNode::new(&info.name, info.nameservers, current.depth + 1);
                        node.is_delegated = delegated && index > 0;
                        ancestors.push(mem::replace(&mut current, node));
                    } else {
                        current.add_domain(candidate);
                    }
                }
                _ => current.add_domain(candidate),
            }

            if let Some(cname_target) = cname {
                log::debug!("{} is an alias for {}", candidate, cname_target);
                current.mark_cname(cname_target);
            }
        }

        Ok(assemble(ancestors, current))
    }

    /// Name of the deepest zone enclosing `domain`
    ///
    /// Zone names are lowercase and carry no trailing dot, so the apex of
    /// `"Example.COM."` is `"example.com"`. If the hierarchy cannot be
    /// resolved, `domain` itself is returned in that same form (or verbatim
    /// when it is not a valid name).
    pub async fn find_zone_apex(&self, domain: &str, endpoint: &str) -> String {
        match self.resolve_hierarchy(domain, endpoint).await {
            Ok(root) => root.deepest().zone_name.clone(),
            Err(e) => {
                let fallback = bare_domain(domain).unwrap_or_else(|_| domain.to_string());
                log::warn!("Falling back to {} as zone apex: {}", fallback, e);
                fallback
            }
        }
    }

    /// SOA ownership check followed by the NS set of the zone
    ///
    /// `known_soa` is an SOA answer for `name` fetched earlier, if any.
    async fn zone_info(
        &self,
        name: &str,
        endpoint: &str,
        known_soa: Option<DohResponse>,
    ) -> Result<ZoneInfo, LookupError> {
        let response = match known_soa {
            Some(response) => response,
            None => self.doh.query(name, QueryType::Soa, endpoint).await?,
        };
        if response.is_nxdomain() {
            return Err(LookupError::DomainNotFound {
                domain: name.to_string(),
            });
        }

        let wanted = normalize_host(name);
        let soa_code = QueryType::Soa.to_num();
        let owns_soa = |records: &[DohRecord]| {
            records
                .iter()
                .any(|r| r.rtype == soa_code && r.owner() == wanted)
        };

        if !owns_soa(&response.answer[..]) && !owns_soa(&response.authority[..]) {
            return Err(LookupError::NotAZone {
                domain: name.to_string(),
            });
        }

        let nameservers = self.nameservers_of(name, endpoint).await?;
        Ok(ZoneInfo {
            name: wanted,
            nameservers,
        })
    }

    async fn nameservers_of(&self, name: &str, endpoint: &str) -> Result<Vec<String>, LookupError> {
        let response = self.doh.query(name, QueryType::Ns, endpoint).await?;

        let mut nameservers: Vec<String> = response
            .answers_of(QueryType::Ns)
            .map(|r| normalize_host(&r.data))
            .filter(|ns| !ns.is_empty())
            .collect();
        nameservers.sort();
        nameservers.dedup();

        Ok(nameservers)
    }

    async fn tolerant_nameservers(
        &self,
        name: &str,
        endpoint: &str,
        budget: &mut WalkBudget,
    ) -> Result<Vec<String>, LookupError> {
        match self.nameservers_of(name, endpoint).await {
            Ok(ns) => Ok(ns),
            Err(e) => {
                budget.absorb(e, name)?;
                Ok(Vec::new())
            }
        }
    }

    /// Lowercased CNAME target at `name`, trailing dot kept as returned
    async fn cname_of(&self, name: &str, endpoint: &str) -> Result<Option<String>, LookupError> {
        let response = self.doh.query(name, QueryType::Cname, endpoint).await?;
        let wanted = normalize_host(name);

        let target = response
            .answers_of(QueryType::Cname)
            .find(|r| r.owner() == wanted)
            .map(|r| r.data.trim().to_ascii_lowercase())
            .filter(|target| !target.is_empty());
        Ok(target)
    }
}
