/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
///
/// An empty payload renders as an empty string.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    let mut rendered = String::with_capacity(bytes.len().saturating_mul(3));
    for (index, value) in bytes.iter().enumerate() {
        if index > 0 {
            rendered.push(' ');
        }
        rendered.push(nibble_to_hex(value >> 4));
        rendered.push(nibble_to_hex(value & 0x0F));
    }
    rendered
}

/// Formats an optional RSSI for terminal output.
pub(crate) fn format_rssi(rssi: Option<i16>) -> String {
    match rssi {
        Some(value) => value.to_string(),
        None => "-".to_string(),
    }
}

/// Formats a coordinate with six decimal places.
pub(crate) fn format_coordinate(value: f64) -> String {
    format!("{value:.6}")
}

fn nibble_to_hex(value: u8) -> char {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    HEX[usize::from(value)] as char
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn format_hex_handles_empty_payload() {
        assert_eq!("", format_hex(&[]));
    }

    #[test]
    fn format_hex_formats_uppercase_pairs() {
        assert_eq!("05 00 A1 FF", format_hex(&[0x05, 0x00, 0xA1, 0xFF]));
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(64)]
    fn format_hex_length_is_three_per_byte_minus_one(#[case] len: usize) {
        let payload = vec![0x1F; len];
        assert_eq!(3 * len - 1, format_hex(&payload).len());
    }

    #[test]
    fn format_rssi_handles_unknown() {
        assert_eq!("-", format_rssi(None));
    }

    #[rstest]
    #[case(45.2, "45.200000")]
    #[case(-75.3, "-75.300000")]
    #[case(0.0, "0.000000")]
    fn format_coordinate_uses_six_decimals(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(expected, format_coordinate(value));
    }
}
