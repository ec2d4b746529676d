//! IPv4 arithmetic core: parsing, mask conversions, subnet math.

pub mod mask;
pub mod parse;
pub mod subnet;

pub use mask::{is_canonical_mask, mask_to_prefix, prefix_to_mask};
pub use parse::{parse_dotted_quad, validate_address, AddrError};
pub use subnet::{compute_network_info, is_in_range, NetworkInfo};
