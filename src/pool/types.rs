//! Pool and assignment data model.
//!
//! These are the two records the engine persists. Everything derivable
//! (masks, totals, statistics) is recomputed from them rather than stored
//! separately, with the counter triple on [`AddressPool`] as the one
//! deliberate exception: it is maintained transactionally so exhaustion
//! checks and statistics never have to walk the assignment table.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::addr::{is_in_range, prefix_to_mask};

// ============================================================================
// Pool Types
// ============================================================================

/// Customer class an address pool serves.
///
/// Gateway derivation differs per class (see `pool::gateway`); the rest of
/// the engine treats the classes uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerClass {
    Residential,
    Enterprise,
}

impl std::fmt::Display for CustomerClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CustomerClass::Residential => write!(f, "residential"),
            CustomerClass::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Ways a pool definition or boundary edit can be inconsistent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolValidationError {
    #[error("Pool {pool_id}: start {start} is above end {end}")]
    RangeInverted {
        pool_id: String,
        start: Ipv4Addr,
        end: Ipv4Addr,
    },

    #[error("Pool {pool_id}: prefix length {prefix_length} is outside 0-32")]
    PrefixOutOfRange { pool_id: String, prefix_length: u8 },

    #[error("Pool {pool_id}: subnet mask {subnet_mask} does not match /{prefix_length}")]
    MaskMismatch {
        pool_id: String,
        subnet_mask: Ipv4Addr,
        prefix_length: u8,
    },

    #[error("Pool {pool_id}: total {total} does not cover the range {start}-{end}")]
    TotalMismatch {
        pool_id: String,
        total: u64,
        start: Ipv4Addr,
        end: Ipv4Addr,
    },

    #[error("Pool {pool_id}: {used} used + {available} available does not equal {total} total")]
    CounterMismatch {
        pool_id: String,
        used: u64,
        available: u64,
        total: u64,
    },

    #[error("Pool {pool_id}: active assignment {assignment_id} at {ip} falls outside the pool range")]
    AssignmentOutOfRange {
        pool_id: String,
        assignment_id: String,
        ip: Ipv4Addr,
    },
}

/// A contiguous inclusive IPv4 range owned by one region and customer class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPool {
    /// Opaque pool identifier
    pub id: String,
    /// Region the pool belongs to
    pub region_id: String,
    /// Customer class served from this pool
    pub customer_class: CustomerClass,
    /// First address of the range (inclusive)
    pub start_ip: Ipv4Addr,
    /// Last address of the range (inclusive)
    pub end_ip: Ipv4Addr,
    /// Prefix length of the enclosing network
    pub prefix_length: u8,
    /// Mask derived from `prefix_length`; [`rebound`](Self::rebound) keeps
    /// it in sync across boundary edits
    pub subnet_mask: Ipv4Addr,
    /// Gateway shown to operators for the pool as a whole. Display only:
    /// the gateway a customer actually receives is derived per assignment.
    pub default_gateway: Ipv4Addr,
    /// Size of the range: `end - start + 1`
    pub total_addresses: u64,
    /// Count of active assignments
    pub used_addresses: u64,
    /// Remaining headroom: `total - used`
    pub available_addresses: u64,
    /// Optimistic-concurrency token. Owned by the store, which bumps it on
    /// every committed write; callers never touch it.
    #[serde(default)]
    pub version: u64,
}

impl AddressPool {
    /// Build an empty pool over `[start_ip, end_ip]`, deriving the mask and
    /// counters. When `default_gateway` is `None` the first usable address
    /// of the enclosing network stands in.
    pub fn new(
        id: impl Into<String>,
        region_id: impl Into<String>,
        customer_class: CustomerClass,
        start_ip: Ipv4Addr,
        end_ip: Ipv4Addr,
        prefix_length: u8,
        default_gateway: Option<Ipv4Addr>,
    ) -> Result<Self, PoolValidationError> {
        let id = id.into();
        let subnet_mask = prefix_to_mask(prefix_length).map_err(|_| {
            PoolValidationError::PrefixOutOfRange {
                pool_id: id.clone(),
                prefix_length,
            }
        })?;
        if u32::from(start_ip) > u32::from(end_ip) {
            return Err(PoolValidationError::RangeInverted {
                pool_id: id,
                start: start_ip,
                end: end_ip,
            });
        }
        let total_addresses = range_size(start_ip, end_ip);
        let default_gateway = match default_gateway {
            Some(gateway) => gateway,
            // prefix_length was checked above, so this cannot fail
            None => {
                crate::addr::compute_network_info(start_ip, prefix_length)
                    .map(|info| info.first_usable)
                    .unwrap_or(start_ip)
            }
        };

        Ok(AddressPool {
            id,
            region_id: region_id.into(),
            customer_class,
            start_ip,
            end_ip,
            prefix_length,
            subnet_mask,
            default_gateway,
            total_addresses,
            used_addresses: 0,
            available_addresses: total_addresses,
            version: 0,
        })
    }

    /// Check the structural invariants of the pool record.
    ///
    /// Range order, prefix bounds, mask/prefix agreement, and the two
    /// counter identities: `total == end - start + 1` and
    /// `used + available == total`.
    pub fn validate(&self) -> Result<(), PoolValidationError> {
        if self.prefix_length > 32 {
            return Err(PoolValidationError::PrefixOutOfRange {
                pool_id: self.id.clone(),
                prefix_length: self.prefix_length,
            });
        }
        if u32::from(self.start_ip) > u32::from(self.end_ip) {
            return Err(PoolValidationError::RangeInverted {
                pool_id: self.id.clone(),
                start: self.start_ip,
                end: self.end_ip,
            });
        }
        // prefix_length is within 0-32 here, so the conversion cannot fail
        if prefix_to_mask(self.prefix_length).ok() != Some(self.subnet_mask) {
            return Err(PoolValidationError::MaskMismatch {
                pool_id: self.id.clone(),
                subnet_mask: self.subnet_mask,
                prefix_length: self.prefix_length,
            });
        }
        if self.total_addresses != range_size(self.start_ip, self.end_ip) {
            return Err(PoolValidationError::TotalMismatch {
                pool_id: self.id.clone(),
                total: self.total_addresses,
                start: self.start_ip,
                end: self.end_ip,
            });
        }
        if self.used_addresses + self.available_addresses != self.total_addresses {
            return Err(PoolValidationError::CounterMismatch {
                pool_id: self.id.clone(),
                used: self.used_addresses,
                available: self.available_addresses,
                total: self.total_addresses,
            });
        }
        Ok(())
    }

    /// True when the address falls inside the pool's inclusive range
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        is_in_range(ip, self.start_ip, self.end_ip)
    }

    /// True when the two inclusive ranges share at least one address
    pub fn overlaps(&self, other: &AddressPool) -> bool {
        u32::from(self.start_ip) <= u32::from(other.end_ip)
            && u32::from(other.start_ip) <= u32::from(self.end_ip)
    }

    /// Apply an operator boundary edit, re-deriving mask and counters.
    ///
    /// Refuses to orphan service: every assignment in `active` must fall
    /// inside the new range or the edit is rejected and the pool is left
    /// untouched.
    pub fn rebound(
        &mut self,
        start_ip: Ipv4Addr,
        end_ip: Ipv4Addr,
        prefix_length: u8,
        active: &[AddressAssignment],
    ) -> Result<(), PoolValidationError> {
        let subnet_mask = prefix_to_mask(prefix_length).map_err(|_| {
            PoolValidationError::PrefixOutOfRange {
                pool_id: self.id.clone(),
                prefix_length,
            }
        })?;
        if u32::from(start_ip) > u32::from(end_ip) {
            return Err(PoolValidationError::RangeInverted {
                pool_id: self.id.clone(),
                start: start_ip,
                end: end_ip,
            });
        }
        for assignment in active {
            if !is_in_range(assignment.assigned_ip, start_ip, end_ip) {
                return Err(PoolValidationError::AssignmentOutOfRange {
                    pool_id: self.id.clone(),
                    assignment_id: assignment.id.clone(),
                    ip: assignment.assigned_ip,
                });
            }
        }

        let total_addresses = range_size(start_ip, end_ip);
        let used_addresses = active.len() as u64;
        // Contained and pairwise-distinct assignments can never outnumber
        // the range, so a shortfall here means the active list is corrupt.
        let available_addresses = total_addresses.checked_sub(used_addresses).ok_or(
            PoolValidationError::CounterMismatch {
                pool_id: self.id.clone(),
                used: used_addresses,
                available: 0,
                total: total_addresses,
            },
        )?;

        self.start_ip = start_ip;
        self.end_ip = end_ip;
        self.prefix_length = prefix_length;
        self.subnet_mask = subnet_mask;
        self.total_addresses = total_addresses;
        self.used_addresses = used_addresses;
        self.available_addresses = available_addresses;
        Ok(())
    }
}

/// Number of addresses in an inclusive range; a full /0 range needs u64
fn range_size(start: Ipv4Addr, end: Ipv4Addr) -> u64 {
    u64::from(u32::from(end)) - u64::from(u32::from(start)) + 1
}

// ============================================================================
// Assignment Types
// ============================================================================

/// The binding of one pool address to one customer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressAssignment {
    /// Opaque assignment identifier
    pub id: String,
    /// Pool the address was taken from
    pub pool_id: String,
    /// Customer account the address is bound to
    pub account_id: String,
    /// The assigned address; unique among a pool's active assignments
    pub assigned_ip: Ipv4Addr,
    /// Gateway derived under the policy in force at assignment time.
    /// Deliberately frozen: policy changes must not reroute live customers.
    pub assigned_gateway: Ipv4Addr,
    /// False once the customer's service has been deprovisioned
    pub is_active: bool,
    /// When the address was handed out
    pub assigned_at: DateTime<Utc>,
    /// When the assignment was released, if it ever was
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub deactivated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Statistics Types
// ============================================================================

/// Aggregate usage across every pool in a registry.
///
/// Recomputed from the pool records on demand; nothing here is cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatistics {
    pub total_pools: usize,
    pub total_addresses: u64,
    pub used_addresses: u64,
    pub available_addresses: u64,
    /// Pool count per region id; BTreeMap so serialized output is stable
    pub pools_per_region: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn sample_pool() -> AddressPool {
        AddressPool::new(
            "pool-east-res",
            "east",
            CustomerClass::Residential,
            addr("10.129.0.1"),
            addr("10.129.47.255"),
            20,
            None,
        )
        .unwrap()
    }

    fn sample_assignment(ip: &str) -> AddressAssignment {
        AddressAssignment {
            id: format!("asg-{}", ip),
            pool_id: "pool-east-res".to_string(),
            account_id: "acct-1".to_string(),
            assigned_ip: addr(ip),
            assigned_gateway: addr("10.129.0.1"),
            is_active: true,
            assigned_at: Utc::now(),
            deactivated_at: None,
        }
    }

    #[test]
    fn test_new_pool_derives_mask_and_counters() {
        let pool = sample_pool();
        assert_eq!(pool.subnet_mask, addr("255.255.240.0"));
        assert_eq!(pool.total_addresses, 12_287);
        assert_eq!(pool.used_addresses, 0);
        assert_eq!(pool.available_addresses, 12_287);
        assert_eq!(pool.version, 0);
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn test_new_pool_rejects_inverted_range() {
        let result = AddressPool::new(
            "bad",
            "east",
            CustomerClass::Residential,
            addr("10.0.1.0"),
            addr("10.0.0.0"),
            24,
            None,
        );
        assert!(matches!(
            result,
            Err(PoolValidationError::RangeInverted { .. })
        ));
    }

    #[test]
    fn test_new_pool_rejects_bad_prefix() {
        let result = AddressPool::new(
            "bad",
            "east",
            CustomerClass::Residential,
            addr("10.0.0.0"),
            addr("10.0.0.255"),
            40,
            None,
        );
        assert!(matches!(
            result,
            Err(PoolValidationError::PrefixOutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_catches_counter_drift() {
        let mut pool = sample_pool();
        pool.used_addresses = 5;
        assert!(matches!(
            pool.validate(),
            Err(PoolValidationError::CounterMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_catches_stale_mask() {
        let mut pool = sample_pool();
        pool.subnet_mask = addr("255.255.255.0");
        assert!(matches!(
            pool.validate(),
            Err(PoolValidationError::MaskMismatch { .. })
        ));
    }

    #[test]
    fn test_overlap_detection() {
        let a = sample_pool();
        let mut b = sample_pool();
        b.id = "other".to_string();
        assert!(a.overlaps(&b));

        // adjacent but disjoint
        b.start_ip = addr("10.129.48.0");
        b.end_ip = addr("10.129.63.255");
        assert!(!a.overlaps(&b));

        // single shared address
        b.start_ip = addr("10.129.47.255");
        assert!(a.overlaps(&b));
    }

    #[test]
    fn test_rebound_rederives_counters() {
        let mut pool = sample_pool();
        let active = vec![sample_assignment("10.129.0.5")];
        pool.rebound(addr("10.129.0.1"), addr("10.129.15.255"), 20, &active)
            .unwrap();
        assert_eq!(pool.total_addresses, 4_095);
        assert_eq!(pool.used_addresses, 1);
        assert_eq!(pool.available_addresses, 4_094);
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn test_rebound_refuses_to_orphan_assignments() {
        let mut pool = sample_pool();
        let before = pool.clone();
        let active = vec![sample_assignment("10.129.40.1")];
        let result = pool.rebound(addr("10.129.0.1"), addr("10.129.15.255"), 20, &active);
        assert!(matches!(
            result,
            Err(PoolValidationError::AssignmentOutOfRange { .. })
        ));
        // rejected edits leave the record untouched
        assert_eq!(pool, before);
    }

    #[test]
    fn test_customer_class_serde_tokens() {
        let yaml = serde_yaml::to_string(&CustomerClass::Enterprise).unwrap();
        assert_eq!(yaml.trim(), "enterprise");
        let parsed: CustomerClass = serde_yaml::from_str("residential").unwrap();
        assert_eq!(parsed, CustomerClass::Residential);
    }
}
