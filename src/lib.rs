//! `pvvx-listener` library.
//!
//! Passively listens for BLE advertisements from thermometers running the
//! pvvx custom firmware and turns them into measurement lines.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. The scan loop lives in [`crate::discovery`] and the
//! wiring in [`crate::app`], both testable with an injected scan service and
//! output stream.

pub mod alias;
pub mod app;
pub mod discovery;
pub mod duration;
pub mod filter;
pub mod frame;
pub mod mac_address;
pub mod measurement;
pub mod output;
pub mod payload;
pub mod report;
pub mod scanner;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use alias::{Alias, AliasMap, parse_alias, to_map};
pub use discovery::{DiscoveryConfig, DiscoveryError, DiscoveryLoop, DiscoveryStats, RetryPolicy};
pub use frame::BroadcastFrame;
pub use mac_address::MacAddress;
pub use measurement::{Calibration, Measurement};
pub use output::OutputFormatter;
pub use output::influxdb::InfluxDbFormatter;
pub use payload::{DecodeError, DeviceFlags, SensorReading, decode};
pub use report::{LineReporter, Reporter};
pub use scanner::{Backend, ScanError, ScanService};
