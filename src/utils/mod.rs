// Thu Oct 15 2026 - Alex

pub mod logging;

pub use logging::LoggingUtils;

pub fn hex_string_spaced(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ")
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Parses `0x`-prefixed hex or plain decimal, allowing `_` and `` ` ``
/// digit separators as printed by debuggers.
pub fn parse_address(text: &str) -> Option<u64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != '_' && *c != '`').collect();
    match cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => cleaned.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x1_4000_0000"), Some(0x1_4000_0000));
        assert_eq!(parse_address("0x00000001`40001000"), Some(0x1_4000_1000));
        assert_eq!(parse_address("4096"), Some(4096));
        assert_eq!(parse_address("zz"), None);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(hex_string_spaced(&[0xde, 0xad]), "de ad");
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
    }
}
