//! Human-readable duration parsing for command-line options.

use std::time::Duration;

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use pvvx_listener::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (num, unit, scale): (&str, &str, fn(u64) -> Duration) =
        if let Some(num) = src.strip_suffix("ms") {
            (num, "milliseconds", Duration::from_millis)
        } else if let Some(num) = src.strip_suffix('h') {
            (num, "hours", |n| Duration::from_secs(n.saturating_mul(3600)))
        } else if let Some(num) = src.strip_suffix('m') {
            (num, "minutes", |n| Duration::from_secs(n.saturating_mul(60)))
        } else if let Some(num) = src.strip_suffix('s') {
            (num, "seconds", Duration::from_secs)
        } else {
            (src, "duration", Duration::from_secs)
        };

    let value: u64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid {}: {}", unit, num))?;
    Ok(scale(value))
}

/// Parse a scan window length. Like [`parse_duration`], but zero is rejected:
/// an empty window closes before any frame can be observed.
pub fn parse_scan_window(src: &str) -> Result<Duration, String> {
    let window = parse_duration(src)?;
    if window.is_zero() {
        return Err("scan window must be longer than zero".to_string());
    }
    Ok(window)
}
