//! Output formatters for measurements.
//!
//! The default `slash` format is the `mac/name/rssi/temperature/humidity/battery`
//! line consumed by existing home-automation wrappers; `influxdb` produces
//! line protocol for Telegraf's `execd` input.

pub mod influxdb;
pub mod slash;

use crate::measurement::Measurement;

/// Trait for formatting measurements into output lines.
pub trait OutputFormatter: Send + Sync {
    /// Format a measurement as a single line, without a line terminator.
    ///
    /// `name` is the resolved display name (alias or advertised name), if any.
    fn format(&self, measurement: &Measurement, name: Option<&str>) -> String;
}

/// Selectable output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// mac/name/rssi/temperature/humidity/battery
    #[default]
    Slash,
    /// InfluxDB line protocol
    Influxdb,
}

impl Format {
    pub fn formatter(self, influxdb_measurement: String) -> Box<dyn OutputFormatter> {
        match self {
            Format::Slash => Box::new(slash::SlashFormatter),
            Format::Influxdb => Box::new(influxdb::InfluxDbFormatter::new(influxdb_measurement)),
        }
    }
}
