pub mod long_buffer;

pub(crate) use long_buffer::read_u64;
pub use long_buffer::{LongBuffer, Replay};

pub const fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Parse an object id given either in hex (`0x` prefixed) or in decimal
pub fn parse_object_id(s: &str) -> Result<u64, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(16, 8), 16);
        assert_eq!(align_up(17, 8), 24);
    }

    #[test]
    fn test_parse_object_id() {
        assert_eq!(parse_object_id("0x1f").unwrap(), 31);
        assert_eq!(parse_object_id("31").unwrap(), 31);
        assert!(parse_object_id("0xzz").is_err());
    }
}
