//! Region directory and router recommendation tables.
//!
//! Support agents answer "which router should this customer buy and how do
//! they set it up" during provisioning calls. The answer depends on the
//! region (what field teams stock and install) and the service interface
//! the customer is on. Lookups are read-only; the engine embeds results in
//! analysis reports verbatim.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One provisioning region in the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    /// Opaque region identifier, referenced by pools
    pub id: String,
    /// Human-facing name, the key recommendation tables use
    pub name: String,
    /// Interface assumed when an analysis query does not name one
    pub default_interface: String,
}

/// Router model plus setup tutorials for one (region, interface) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterRecommendation {
    pub router_model: String,
    pub tutorial_urls: Vec<String>,
}

/// Resolves the `region_id` recorded on pools to region metadata.
#[derive(Debug, Clone)]
pub struct RegionDirectory {
    regions: HashMap<String, RegionInfo>,
}

impl RegionDirectory {
    /// Directory over an explicit region list (normally from config)
    pub fn from_regions(regions: Vec<RegionInfo>) -> Self {
        let regions = regions
            .into_iter()
            .map(|region| (region.id.clone(), region))
            .collect();
        RegionDirectory { regions }
    }

    /// The four regions the service operates in today
    pub fn builtin() -> Self {
        let region = |id: &str, name: &str, interface: &str| RegionInfo {
            id: id.to_string(),
            name: name.to_string(),
            default_interface: interface.to_string(),
        };
        Self::from_regions(vec![
            region("east", "Eastern Region", "pppoe"),
            region("west", "Western Region", "pppoe"),
            region("coast", "Coastal Region", "hotspot"),
            region("central", "Central Region", "pppoe"),
        ])
    }

    pub fn get(&self, region_id: &str) -> Option<&RegionInfo> {
        self.regions.get(region_id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Lookup collaborator the analysis front queries.
///
/// Keyed by region *name* and interface name, both case-insensitive. `None`
/// simply omits the recommendation from the report; it is never an error.
pub trait RecommendationSource: Send + Sync {
    fn recommend(&self, region_name: &str, interface_name: &str) -> Option<RouterRecommendation>;
}

/// The built-in table of stocked router models per region and interface.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticRecommendations;

impl RecommendationSource for StaticRecommendations {
    fn recommend(&self, region_name: &str, interface_name: &str) -> Option<RouterRecommendation> {
        let region = region_name.trim().to_lowercase();
        let interface = interface_name.trim().to_lowercase();
        let (router_model, tutorial_urls) = builtin_entry(&region, &interface)?;
        Some(RouterRecommendation {
            router_model: router_model.to_string(),
            tutorial_urls: tutorial_urls.iter().map(|url| url.to_string()).collect(),
        })
    }
}

/// Static (region, interface) table. Regions field teams do not stock
/// separately share the generic rows at the bottom.
fn builtin_entry(
    region: &str,
    interface: &str,
) -> Option<(&'static str, &'static [&'static str])> {
    match (region, interface) {
        ("eastern region", "pppoe") => Some((
            "MikroTik hAP ac2",
            &[
                "https://guides.wanpool.example/pppoe/mikrotik-hap-ac2",
                "https://guides.wanpool.example/pppoe/troubleshooting",
            ],
        )),
        ("eastern region", "hotspot") => Some((
            "Ubiquiti UniFi AC Lite",
            &["https://guides.wanpool.example/hotspot/unifi-ac-lite"],
        )),
        ("western region", "pppoe") => Some((
            "TP-Link Archer C6",
            &[
                "https://guides.wanpool.example/pppoe/archer-c6",
                "https://guides.wanpool.example/pppoe/troubleshooting",
            ],
        )),
        ("coastal region", "hotspot") => Some((
            "Ubiquiti UniFi AC Lite",
            &[
                "https://guides.wanpool.example/hotspot/unifi-ac-lite",
                "https://guides.wanpool.example/hotspot/captive-portal",
            ],
        )),
        ("coastal region", "pppoe") => Some((
            "TP-Link Archer C6",
            &["https://guides.wanpool.example/pppoe/archer-c6"],
        )),
        ("central region", "pppoe") => Some((
            "Huawei AR617VW",
            &[
                "https://guides.wanpool.example/pppoe/huawei-ar617vw",
                "https://guides.wanpool.example/pppoe/troubleshooting",
            ],
        )),
        // enterprise static circuits get the same gear everywhere
        (_, "static") => Some((
            "MikroTik RB3011UiAS",
            &["https://guides.wanpool.example/static/rb3011"],
        )),
        _ => None,
    }
}
