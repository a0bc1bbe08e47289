//! Core application runner for `pvvx-listener`.
//!
//! Decoupled from process exit codes and the real Bluetooth stack so it can
//! be tested deterministically with an injected scan service and output
//! stream.

use crate::alias::Alias;
use crate::discovery::{
    DiscoveryConfig, DiscoveryError, DiscoveryLoop, DiscoveryStats, RetryPolicy,
};
use crate::duration::{parse_duration, parse_scan_window};
use crate::mac_address::MacAddress;
use crate::measurement::Calibration;
use crate::output::Format;
use crate::report::LineReporter;
use crate::scanner::{Backend, ScanError, ScanService};
use clap::Parser;
use log::info;
use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Command-line configuration.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Output format.
    #[arg(long, default_value_t, value_enum)]
    pub format: Format,

    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "pvvx_measurement")]
    pub influxdb_measurement: String,

    /// Specify human-readable alias for a sensor.
    /// Format: --alias A4:C1:38:0B:EE:FF=Bedroom
    #[arg(long = "alias", value_parser = crate::alias::parse_alias, value_name = "ALIAS")]
    pub aliases: Vec<Alias>,

    /// Only report these sensors (payload MAC address). Repeatable.
    #[arg(long = "address", value_name = "MAC")]
    pub addresses: Vec<MacAddress>,

    /// Added to every temperature reading, in degrees Celsius.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub temperature_offset: f64,

    /// Added to every humidity reading, in percent.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub humidity_offset: f64,

    /// Length of each scan window before scanning is restarted.
    /// Accepts duration with suffix: 500ms, 3s, 1m, 2h.
    #[arg(long, default_value = "1s", value_parser = parse_scan_window)]
    pub scan_window: Duration,

    /// Retries for a failed scan start/stop before giving up.
    #[arg(long, default_value_t = 0)]
    pub scan_retries: u32,

    /// Initial delay between scan retries, doubled on each attempt.
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub retry_backoff: Duration,

    /// Verbose output, log scan windows and retries
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

impl Options {
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            window: self.scan_window,
            retry: RetryPolicy {
                max_retries: self.scan_retries,
                initial_backoff: self.retry_backoff,
                ..RetryPolicy::default()
            },
        }
    }

    pub fn calibration(&self) -> Calibration {
        Calibration {
            temperature_offset: self.temperature_offset,
            humidity_offset: self.humidity_offset,
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Run discovery against `service`, writing one line per reading to `out`.
///
/// Returns when `cancel` fires or the scan service fails.
pub async fn run_with_io(
    options: Options,
    service: &mut dyn ScanService,
    out: &mut dyn Write,
    cancel: CancellationToken,
) -> Result<DiscoveryStats, RunError> {
    let config = options.discovery_config();
    let calibration = options.calibration();
    if !calibration.is_identity() {
        info!("Applying calibration {calibration:?}");
    }

    let formatter = options.format.formatter(options.influxdb_measurement);
    let mut reporter = LineReporter::new(formatter, out)
        .with_aliases(crate::alias::to_map(&options.aliases))
        .with_addresses(options.addresses)
        .with_calibration(calibration);

    let stats = DiscoveryLoop::new(config, cancel)
        .run(service, &mut reporter)
        .await?;
    Ok(stats)
}

/// Open the configured backend and run until `cancel` fires.
pub async fn run(
    options: Options,
    out: &mut dyn Write,
    cancel: CancellationToken,
) -> Result<DiscoveryStats, RunError> {
    info!("Opening {} scanner backend", options.backend);
    let mut service = crate::scanner::open(options.backend).await?;
    run_with_io(options, service.as_mut(), out, cancel).await
}
