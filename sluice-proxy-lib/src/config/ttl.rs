use std::time::Duration;

use crate::error::{ProxyError, Result};

/// Parse a human cache duration such as `"10 seconds"`, `"5 min"` or `"1 hour"`.
///
/// A bare number is read as milliseconds.
pub fn parse_ttl(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ProxyError::Config("Cache TTL must not be empty".to_string()));
    }

    let split_at = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (amount, unit) = trimmed.split_at(split_at);

    let amount: f64 = amount
        .parse()
        .map_err(|_| ProxyError::Config(format!("Invalid cache TTL amount in '{input}'")))?;

    let unit_ms = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "ms" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "week" | "weeks" => 604_800_000.0,
        other => {
            return Err(ProxyError::Config(format!(
                "Unknown cache TTL unit '{other}' in '{input}'"
            )))
        }
    };

    let millis = amount * unit_ms;
    if !millis.is_finite() || millis < 1.0 {
        return Err(ProxyError::Config(format!("Cache TTL '{input}' must be at least 1ms")));
    }

    Ok(Duration::from_millis(millis as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

    #[test]
    fn parses_common_forms() -> TestResult {
        assert_eq!(parse_ttl("10 seconds")?, Duration::from_secs(10));
        assert_eq!(parse_ttl("1 second")?, Duration::from_secs(1));
        assert_eq!(parse_ttl("5 minutes")?, Duration::from_secs(300));
        assert_eq!(parse_ttl("2 hours")?, Duration::from_secs(7200));
        assert_eq!(parse_ttl("1 day")?, Duration::from_secs(86_400));
        assert_eq!(parse_ttl("30s")?, Duration::from_secs(30));
        assert_eq!(parse_ttl("1.5 min")?, Duration::from_secs(90));
        Ok(())
    }

    #[test]
    fn bare_number_is_milliseconds() -> TestResult {
        assert_eq!(parse_ttl("250")?, Duration::from_millis(250));
        assert_eq!(parse_ttl(" 500 ms ")?, Duration::from_millis(500));
        Ok(())
    }

    #[test]
    fn unit_is_case_insensitive() -> TestResult {
        assert_eq!(parse_ttl("10 Seconds")?, Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_ttl("").is_err());
        assert!(parse_ttl("soon").is_err());
        assert!(parse_ttl("10 fortnights").is_err());
        assert!(parse_ttl("0 seconds").is_err());
    }
}
