//! Gateway derivation policy.
//!
//! Which router address a customer is pointed at is a provisioning rule,
//! not a property of addressing, so it sits behind a trait the surrounding
//! application can swap without touching the allocator.

use std::net::Ipv4Addr;

use super::types::CustomerClass;

/// Derives the gateway handed out alongside an assigned address
pub trait GatewayPolicy: Send + Sync {
    fn derive_gateway(&self, ip: Ipv4Addr, class: CustomerClass) -> Ipv4Addr;
}

/// The stock offsets used in production.
///
/// Residential gateways sit one below the customer's final octet.
/// Enterprise gateways sit three below, falling back to two when three
/// would go negative. Either way the final octet never drops below 1, so
/// an enterprise customer at `.2` is pointed at `.1` rather than `.0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardGatewayPolicy;

impl GatewayPolicy for StandardGatewayPolicy {
    fn derive_gateway(&self, ip: Ipv4Addr, class: CustomerClass) -> Ipv4Addr {
        let octets = ip.octets();
        let last = i16::from(octets[3]);
        let derived = match class {
            CustomerClass::Residential => last - 1,
            CustomerClass::Enterprise => {
                if last - 3 >= 0 {
                    last - 3
                } else {
                    last - 2
                }
            }
        };
        let clamped = derived.max(1) as u8;
        Ipv4Addr::new(octets[0], octets[1], octets[2], clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_residential_offset() {
        let policy = StandardGatewayPolicy;
        assert_eq!(
            policy.derive_gateway(addr("10.0.0.50"), CustomerClass::Residential),
            addr("10.0.0.49")
        );
    }

    #[test]
    fn test_enterprise_offset() {
        let policy = StandardGatewayPolicy;
        assert_eq!(
            policy.derive_gateway(addr("10.0.0.50"), CustomerClass::Enterprise),
            addr("10.0.0.47")
        );
    }

    #[test]
    fn test_enterprise_falls_back_to_two() {
        let policy = StandardGatewayPolicy;
        // .2 - 3 would be negative, .2 - 2 is zero, and zero clamps to 1
        assert_eq!(
            policy.derive_gateway(addr("192.168.5.2"), CustomerClass::Enterprise),
            addr("192.168.5.1")
        );
    }

    #[test]
    fn test_clamp_floor_is_one() {
        let policy = StandardGatewayPolicy;
        assert_eq!(
            policy.derive_gateway(addr("10.0.0.0"), CustomerClass::Residential),
            addr("10.0.0.1")
        );
        assert_eq!(
            policy.derive_gateway(addr("10.0.0.1"), CustomerClass::Residential),
            addr("10.0.0.1")
        );
        assert_eq!(
            policy.derive_gateway(addr("10.0.0.3"), CustomerClass::Enterprise),
            addr("10.0.0.1")
        );
    }

    #[test]
    fn test_only_final_octet_moves() {
        let policy = StandardGatewayPolicy;
        assert_eq!(
            policy.derive_gateway(addr("172.20.9.100"), CustomerClass::Enterprise),
            addr("172.20.9.97")
        );
    }
}
