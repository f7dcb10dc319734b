//! Scalar value parsers shared by all sections.

/// Parse a boolean option value.
///
/// Accepts `yes/no`, `true/false`, `on/off` and `1/0`, ignoring case.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Some(true),
        "no" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Parse a size value: a decimal integer optionally suffixed with `k`
/// (x1000) or `m` (x1,000,000). Scaling is decimal, not binary.
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, factor) = match value.char_indices().last()? {
        (idx, 'k' | 'K') => (&value[..idx], 1_000),
        (idx, 'm' | 'M') => (&value[..idx], 1_000_000),
        _ => (value, 1),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse::<u64>().ok()?.checked_mul(factor)
}

/// Parse a non-negative integer (seconds, TTLs, day counts).
pub fn parse_u64(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bool_spellings() {
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("On"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_size_suffixes_are_decimal() {
        assert_eq!(parse_size("2394"), Some(2394));
        assert_eq!(parse_size("4k"), Some(4000));
        assert_eq!(parse_size("1m"), Some(1_000_000));
        assert_eq!(parse_size("1M"), Some(1_000_000));
    }

    #[test]
    fn test_size_rejects_garbage() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("k"), None);
        assert_eq!(parse_size("4kb"), None);
        assert_eq!(parse_size("-1"), None);
        assert_eq!(parse_size("1.5k"), None);
        assert_eq!(parse_size("99999999999999999999m"), None);
    }

    proptest! {
        #[test]
        fn prop_size_scaling(n in 0u64..1_000_000) {
            prop_assert_eq!(parse_size(&n.to_string()), Some(n));
            prop_assert_eq!(parse_size(&format!("{n}k")), Some(n * 1_000));
            prop_assert_eq!(parse_size(&format!("{n}m")), Some(n * 1_000_000));
        }
    }
}
