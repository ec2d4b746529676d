//! Address analysis front.
//!
//! The inbound query surface. Support tooling and the chat bot hand an
//! address (or the customer's raw message) to [`AnalysisEngine`] and get
//! back one [`AddressReport`]: the subnet math, the owning pool when the
//! address is managed, and the router recommendation for that pool's
//! region. Analysis never mutates anything.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::addr::{compute_network_info, parse_dotted_quad, validate_address, AddrError, NetworkInfo};
use crate::pool::{CustomerClass, PoolError, PoolRegistry};
use crate::recommend::{RecommendationSource, RegionDirectory, RouterRecommendation, StaticRecommendations};

/// Prefix assumed when neither the query nor a matched pool supplies one
const DEFAULT_PREFIX_LENGTH: u8 = 24;

static CANDIDATE_IP: LazyLock<Regex> = LazyLock::new(||
    Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap()
);

/// Summary of the pool an analyzed address belongs to
#[derive(Debug, Clone, Serialize)]
pub struct PoolMatch {
    pub pool_id: String,
    pub region_id: String,
    /// Resolved from the region directory; absent when the pool references
    /// a region the directory does not know
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    pub customer_class: CustomerClass,
    pub start_ip: Ipv4Addr,
    pub end_ip: Ipv4Addr,
    pub prefix_length: u8,
    pub used_addresses: u64,
    pub available_addresses: u64,
}

/// Everything the support surfaces show for one address query
#[derive(Debug, Clone, Serialize)]
pub struct AddressReport {
    /// The address the report describes
    pub query_ip: Ipv4Addr,
    /// Subnet math at the effective prefix length
    pub network: NetworkInfo,
    /// The pool containing the address, if it is managed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolMatch>,
    /// Router guidance for the matched pool's region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<RouterRecommendation>,
}

/// Read-only query engine over a registry, a region directory, and a
/// recommendation source.
pub struct AnalysisEngine {
    registry: PoolRegistry,
    regions: RegionDirectory,
    recommendations: Arc<dyn RecommendationSource>,
}

impl AnalysisEngine {
    pub fn new(
        registry: PoolRegistry,
        regions: RegionDirectory,
        recommendations: Arc<dyn RecommendationSource>,
    ) -> Self {
        AnalysisEngine {
            registry,
            regions,
            recommendations,
        }
    }

    /// Engine with the built-in region directory and recommendation table
    pub fn with_defaults(registry: PoolRegistry) -> Self {
        Self::new(
            registry,
            RegionDirectory::builtin(),
            Arc::new(StaticRecommendations),
        )
    }

    /// Analyze one address.
    ///
    /// The effective prefix length is the explicit argument when given,
    /// else the matched pool's, else /24. The interface for the
    /// recommendation lookup defaults to the region's configured one. An
    /// address outside every pool still gets its subnet math; only the
    /// pool and recommendation sections are omitted.
    pub fn analyze_address(
        &self,
        ip: &str,
        prefix_length: Option<u8>,
        interface: Option<&str>,
    ) -> Result<AddressReport, PoolError> {
        let addr = parse_dotted_quad(ip)?;
        if let Some(prefix) = prefix_length {
            if prefix > 32 {
                return Err(AddrError::InvalidPrefix(prefix).into());
            }
        }

        let pool = self.registry.find_pool_containing(addr)?;
        let effective_prefix = prefix_length
            .or_else(|| pool.as_ref().map(|p| p.prefix_length))
            .unwrap_or(DEFAULT_PREFIX_LENGTH);
        let network = compute_network_info(addr, effective_prefix)?;

        let (pool_match, recommendation) = match pool {
            Some(pool) => {
                let region = self.regions.get(&pool.region_id);
                if region.is_none() {
                    log::warn!(
                        "Pool {} references unknown region {}",
                        pool.id,
                        pool.region_id
                    );
                }
                let recommendation = region.and_then(|region| {
                    let interface = interface.unwrap_or(&region.default_interface);
                    self.recommendations.recommend(&region.name, interface)
                });
                let matched = PoolMatch {
                    region_name: region.map(|r| r.name.clone()),
                    pool_id: pool.id,
                    region_id: pool.region_id,
                    customer_class: pool.customer_class,
                    start_ip: pool.start_ip,
                    end_ip: pool.end_ip,
                    prefix_length: pool.prefix_length,
                    used_addresses: pool.used_addresses,
                    available_addresses: pool.available_addresses,
                };
                (Some(matched), recommendation)
            }
            None => (None, None),
        };

        log::debug!(
            "Analyzed {} at /{}: pool {}",
            addr,
            effective_prefix,
            pool_match
                .as_ref()
                .map(|p| p.pool_id.as_str())
                .unwrap_or("<none>")
        );

        Ok(AddressReport {
            query_ip: addr,
            network,
            pool: pool_match,
            recommendation,
        })
    }

    /// Registry access, for callers that allocate alongside analysis
    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }
}

/// Pull the first well-formed dotted quad out of free text.
///
/// Customers paste whatever their router status page shows, so the chat
/// intake scans for dotted-quad shaped tokens and lets the strict
/// validator decide: `"my wan ip is 10.129.0.5 thanks"` yields the
/// address, while leading-zero or out-of-range impostors are skipped in
/// favor of a later valid candidate.
pub fn extract_candidate_ip(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    for found in CANDIDATE_IP.find_iter(text) {
        // A digit continuing across a dot on either side means the token
        // is longer than four groups (a version string, usually). A bare
        // trailing dot is just punctuation and stays fair game.
        let continues_after = bytes.get(found.end()) == Some(&b'.')
            && bytes
                .get(found.end() + 1)
                .map_or(false, |b| b.is_ascii_digit());
        let continues_before = found.start() >= 2
            && bytes[found.start() - 1] == b'.'
            && bytes[found.start() - 2].is_ascii_digit();
        if continues_after || continues_before {
            continue;
        }
        let candidate = found.as_str();
        if validate_address(candidate) {
            return Some(candidate);
        }
    }
    None
}
