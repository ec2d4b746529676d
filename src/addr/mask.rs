//! Prefix-length / subnet-mask conversions.

use std::net::Ipv4Addr;

use super::parse::AddrError;

/// Build the subnet mask whose leading `prefix_length` bits are ones.
///
/// # Arguments
/// * `prefix_length` - CIDR prefix length, 0 through 32
///
/// # Returns
/// The mask (`/24` gives `255.255.255.0`), or `AddrError::InvalidPrefix`
pub fn prefix_to_mask(prefix_length: u8) -> Result<Ipv4Addr, AddrError> {
    if prefix_length > 32 {
        return Err(AddrError::InvalidPrefix(prefix_length));
    }
    // Shifting a u32 by 32 overflows, so /0 is its own case.
    let bits = if prefix_length == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_length))
    };
    Ok(Ipv4Addr::from(bits))
}

/// Count the leading one-bits of a subnet mask.
///
/// Non-contiguous masks are truncated at the first zero bit rather than
/// rejected: `255.0.255.0` counts as `/8`. Masks produced by
/// [`prefix_to_mask`] always round-trip exactly. Callers that must refuse
/// the non-contiguous case can check [`is_canonical_mask`] first.
pub fn mask_to_prefix(mask: Ipv4Addr) -> u8 {
    (!u32::from(mask)).leading_zeros() as u8
}

/// True when the mask is one run of one-bits followed only by zero-bits
pub fn is_canonical_mask(mask: Ipv4Addr) -> bool {
    let inverted = !u32::from(mask);
    // The inverse of a canonical mask is an all-ones suffix.
    inverted & inverted.wrapping_add(1) == 0
}
