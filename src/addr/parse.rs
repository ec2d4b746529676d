//! Dotted-quad parsing and validation.
//!
//! Every address enters the engine as a string (support tooling, config
//! files, raw chat text) and is converted to an `Ipv4Addr` exactly once,
//! here. The grammar is stricter than `Ipv4Addr::from_str`: exactly four
//! dot-separated decimal groups, each 0-255, with no leading zeros.

use std::net::Ipv4Addr;

/// Errors from address parsing and prefix handling
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddrError {
    #[error("Invalid IPv4 address: '{0}'")]
    InvalidAddress(String),

    #[error("Invalid prefix length {0}: must be between 0 and 32")]
    InvalidPrefix(u8),
}

/// Parse a dotted-quad IPv4 string.
///
/// Accepts exactly four dot-separated decimal groups in the range 0-255.
/// Groups with leading zeros are rejected (`"192.168.01.5"` fails), as is
/// anything with surrounding whitespace; callers own cleanup of raw input.
///
/// # Arguments
/// * `input` - The candidate address string
///
/// # Returns
/// The parsed address, or `AddrError::InvalidAddress` echoing the input
pub fn parse_dotted_quad(input: &str) -> Result<Ipv4Addr, AddrError> {
    let invalid = || AddrError::InvalidAddress(input.to_string());

    let mut octets = [0u8; 4];
    let mut count = 0usize;

    for group in input.split('.') {
        if count == 4 {
            return Err(invalid());
        }
        if group.is_empty() || group.len() > 3 {
            return Err(invalid());
        }
        if !group.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        // "0" is a valid group; "00" and "05" are not
        if group.len() > 1 && group.starts_with('0') {
            return Err(invalid());
        }
        octets[count] = group.parse::<u8>().map_err(|_| invalid())?;
        count += 1;
    }

    if count != 4 {
        return Err(invalid());
    }

    Ok(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
}

/// Check whether a string is a well-formed dotted-quad IPv4 address
pub fn validate_address(input: &str) -> bool {
    parse_dotted_quad(input).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_addresses() {
        assert_eq!(
            parse_dotted_quad("192.168.1.1").unwrap(),
            Ipv4Addr::new(192, 168, 1, 1)
        );
        assert_eq!(
            parse_dotted_quad("0.0.0.0").unwrap(),
            Ipv4Addr::new(0, 0, 0, 0)
        );
        assert_eq!(
            parse_dotted_quad("255.255.255.255").unwrap(),
            Ipv4Addr::new(255, 255, 255, 255)
        );
        assert_eq!(
            parse_dotted_quad("10.129.0.5").unwrap(),
            Ipv4Addr::new(10, 129, 0, 5)
        );
    }

    #[test]
    fn test_reject_wrong_group_count() {
        assert!(parse_dotted_quad("192.168.1").is_err());
        assert!(parse_dotted_quad("192.168.1.1.1").is_err());
        assert!(parse_dotted_quad("192").is_err());
        assert!(parse_dotted_quad("").is_err());
    }

    #[test]
    fn test_reject_out_of_range_groups() {
        assert!(parse_dotted_quad("256.1.1.1").is_err());
        assert!(parse_dotted_quad("1.1.1.999").is_err());
        assert!(parse_dotted_quad("300.300.300.300").is_err());
    }

    #[test]
    fn test_reject_leading_zeros() {
        assert!(parse_dotted_quad("01.2.3.4").is_err());
        assert!(parse_dotted_quad("192.168.001.1").is_err());
        assert!(parse_dotted_quad("00.0.0.0").is_err());
        // a bare zero group is still fine
        assert!(parse_dotted_quad("10.0.0.1").is_ok());
    }

    #[test]
    fn test_reject_malformed_input() {
        assert!(parse_dotted_quad("192.168.1.a").is_err());
        assert!(parse_dotted_quad("192.168..1").is_err());
        assert!(parse_dotted_quad(".192.168.1.1").is_err());
        assert!(parse_dotted_quad("192.168.1.1.").is_err());
        assert!(parse_dotted_quad(" 192.168.1.1").is_err());
        assert!(parse_dotted_quad("192.168.1.1 ").is_err());
        assert!(parse_dotted_quad("192,168,1,1").is_err());
        assert!(parse_dotted_quad("1.2.3.-4").is_err());
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("197.156.64.10"));
        assert!(!validate_address("197.156.64"));
        assert!(!validate_address("not an ip"));
    }

    #[test]
    fn test_error_echoes_input() {
        let err = parse_dotted_quad("999.1.1.1").unwrap_err();
        assert_eq!(err, AddrError::InvalidAddress("999.1.1.1".to_string()));
    }
}
