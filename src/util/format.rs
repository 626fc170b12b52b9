const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Binary-prefixed size with two decimals, plain bytes below 1 KB.
pub fn pretty_size_from_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(pretty_size_from_bytes(0), "0 B");
        assert_eq!(pretty_size_from_bytes(1023), "1023 B");
        assert_eq!(pretty_size_from_bytes(512 * 2048), "1.00 MB");
        assert_eq!(pretty_size_from_bytes(1536), "1.50 KB");
        assert_eq!(pretty_size_from_bytes(3 << 40), "3.00 TB");
    }
}
