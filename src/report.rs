//! Reporter sinks for decoded measurements.

use crate::alias::{self, AliasMap};
use crate::mac_address::MacAddress;
use crate::measurement::{Calibration, Measurement};
use crate::output::OutputFormatter;
use log::trace;
use std::collections::HashSet;
use std::io::{self, Write};

/// Receives every measurement the discovery loop decodes.
pub trait Reporter {
    fn report(&mut self, measurement: Measurement) -> io::Result<()>;
}

/// Collects measurements in memory.
impl Reporter for Vec<Measurement> {
    fn report(&mut self, measurement: Measurement) -> io::Result<()> {
        self.push(measurement);
        Ok(())
    }
}

/// Formats measurements one per line and flushes after each line, so a
/// reading reaches the consumer as soon as it is decoded.
pub struct LineReporter<'a> {
    formatter: Box<dyn OutputFormatter>,
    aliases: AliasMap,
    /// Devices to report; empty means all
    addresses: HashSet<MacAddress>,
    calibration: Calibration,
    out: &'a mut dyn Write,
}

impl<'a> LineReporter<'a> {
    pub fn new(formatter: Box<dyn OutputFormatter>, out: &'a mut dyn Write) -> Self {
        Self {
            formatter,
            aliases: AliasMap::new(),
            addresses: HashSet::new(),
            calibration: Calibration::default(),
            out,
        }
    }

    pub fn with_aliases(mut self, aliases: AliasMap) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_addresses(mut self, addresses: impl IntoIterator<Item = MacAddress>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }
}

impl Reporter for LineReporter<'_> {
    fn report(&mut self, mut measurement: Measurement) -> io::Result<()> {
        if !self.addresses.is_empty() && !self.addresses.contains(&measurement.mac) {
            trace!("Ignoring {}: not in address list", measurement.mac);
            return Ok(());
        }

        self.calibration.apply(&mut measurement);

        let advertised = measurement.name.as_deref();
        let name = alias::resolve_name(&measurement.mac, advertised, &self.aliases);
        let line = self.formatter.format(&measurement, name);
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }
}
