use anyhow::{bail, Context, Result};
use std::time::Duration;

/// Milliseconds per unit suffix accepted on the command line.
fn unit_millis(unit: &str) -> Option<f64> {
    let millis = match unit {
        "" | "ms" | "msec" | "millis" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        _ => return None,
    };
    Some(millis)
}

/// Parse a timeout such as `500ms`, `3s`, `1.5m` or `2h`.
/// A bare number is milliseconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let text = input.trim();
    let unit_start = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (amount, unit) = text.split_at(unit_start);
    let amount = amount.trim();
    if amount.is_empty() {
        bail!("{input:?} has no amount; expected something like 500ms or 3s");
    }

    let unit = unit.trim().to_ascii_lowercase();
    let Some(scale) = unit_millis(&unit) else {
        bail!("{input:?} has an unsupported unit {unit:?}; use ms, s, m or h");
    };
    let amount: f64 = amount
        .parse()
        .with_context(|| format!("{input:?} does not start with a number"))?;

    Duration::try_from_secs_f64(amount * scale / 1_000.0)
        .with_context(|| format!("{input:?} is not a usable timeout"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_numbers_are_milliseconds() {
        assert_eq!(parse_duration("500").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration(" 250 ").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_units() {
        assert_eq!(parse_duration("1000ms").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("2.5s").unwrap(), Duration::from_millis(2500));
        assert_eq!(parse_duration("2min").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("0.5h").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("10 seconds").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("3S").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5 fortnights").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-3s").is_err());
        assert!(parse_duration("NaNs").is_err());
    }
}
