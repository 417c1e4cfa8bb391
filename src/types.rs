// src/types.rs

use std::time::Duration;

/// Longest duration a config value may hold. Anything above is a typo.
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Parse `<integer><unit>` with unit `ms`, `s`, `m` or `h`, e.g. `"250ms"`.
///
/// Values too large to represent in milliseconds are rejected instead of
/// wrapping.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let digits = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (amount, unit) = input.split_at(digits);

    if amount.is_empty() {
        return Err(format!("duration '{input}' must start with a number"));
    }
    let unit = unit.trim().to_ascii_lowercase();
    if unit.is_empty() {
        return Err(format!("duration '{input}' needs a unit (ms, s, m or h)"));
    }

    let millis_per_unit: u64 = match unit.as_str() {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        other => {
            return Err(format!(
                "unknown duration unit '{other}' in '{input}'; use ms, s, m or h"
            ));
        }
    };

    // Only digits remain, so a parse failure means the number overflowed.
    amount
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(millis_per_unit))
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration '{input}' is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("10m"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_duration("2H"), Ok(Duration::from_secs(7200)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_overflow() {
        for input in [
            "307445734561825861m",
            "18446744073709551615s",
            "5124095576030432h",
            "99999999999999999999999ms",
        ] {
            let err = parse_duration(input).unwrap_err();
            assert!(err.contains("too large"), "{input}: {err}");
        }
        assert_eq!(
            parse_duration("18446744073709551615ms"),
            Ok(Duration::from_millis(u64::MAX))
        );
    }
}
