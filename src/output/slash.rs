//! Slash-separated line format.

use crate::measurement::Measurement;
use crate::output::OutputFormatter;
use std::fmt::Write;

/// Formats `mac/name/rssi/temperature/humidity/battery_percent`.
///
/// Temperature and humidity carry two decimals; a missing name or RSSI is
/// left empty so the field count stays fixed. A `/` in an advertised name is
/// written as `_`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SlashFormatter;

impl OutputFormatter for SlashFormatter {
    fn format(&self, m: &Measurement, name: Option<&str>) -> String {
        let mut line = String::with_capacity(64);
        let _ = write!(line, "{}/", m.mac);
        for c in name.unwrap_or_default().chars() {
            line.push(if c == '/' { '_' } else { c });
        }
        line.push('/');
        if let Some(rssi) = m.rssi {
            let _ = write!(line, "{rssi}");
        }
        let _ = write!(
            line,
            "/{:.2}/{:.2}/{}",
            m.temperature, m.humidity, m.battery_percent
        );
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_MAC, base_measurement};
    use std::time::SystemTime;

    #[test]
    fn test_format_full_line() {
        let mut m = base_measurement(TEST_MAC, SystemTime::UNIX_EPOCH);
        m.rssi = Some(-67);

        assert_eq!(
            SlashFormatter.format(&m, Some("ATC_DDEEFF")),
            "AA:BB:CC:DD:EE:FF/ATC_DDEEFF/-67/25.00/49.12/85"
        );
    }

    #[test]
    fn test_format_missing_name_and_rssi() {
        let m = base_measurement(TEST_MAC, SystemTime::UNIX_EPOCH);
        assert_eq!(
            SlashFormatter.format(&m, None),
            "AA:BB:CC:DD:EE:FF///25.00/49.12/85"
        );
    }

    #[test]
    fn test_format_negative_temperature() {
        let mut m = base_measurement(TEST_MAC, SystemTime::UNIX_EPOCH);
        m.temperature = -0.5;
        let line = SlashFormatter.format(&m, Some("Freezer"));
        assert_eq!(line.split('/').nth(3), Some("-0.50"));
    }

    #[test]
    fn test_format_has_six_fields() {
        let m = base_measurement(TEST_MAC, SystemTime::UNIX_EPOCH);
        assert_eq!(SlashFormatter.format(&m, Some("x")).split('/').count(), 6);
    }

    #[test]
    fn test_format_replaces_separator_in_name() {
        let m = base_measurement(TEST_MAC, SystemTime::UNIX_EPOCH);
        let line = SlashFormatter.format(&m, Some("Hall/Up"));
        assert_eq!(line, "AA:BB:CC:DD:EE:FF/Hall_Up//25.00/49.12/85");
        assert_eq!(line.split('/').count(), 6);
    }
}
