//! Measurement handed to reporters.

use crate::frame::BroadcastFrame;
use crate::mac_address::MacAddress;
use crate::payload::{DeviceFlags, SensorReading};
use std::time::SystemTime;

/// A decoded reading combined with the metadata of the frame that carried it.
///
/// Values are in display units:
/// - Temperature in Celsius
/// - Humidity in percent (0-100)
/// - Battery voltage in Volts
/// - RSSI in dBm
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// MAC address from the payload
    pub mac: MacAddress,
    /// Advertised local name
    pub name: Option<String>,
    /// Received signal strength in dBm
    pub rssi: Option<i16>,
    /// Wall-clock time the frame was processed
    pub timestamp: SystemTime,
    pub temperature: f64,
    pub humidity: f64,
    pub battery_voltage: f64,
    pub battery_percent: u8,
    pub frame_counter: u8,
    pub flags: DeviceFlags,
}

impl Measurement {
    pub fn new(frame: &BroadcastFrame, reading: &SensorReading) -> Self {
        Self {
            mac: reading.mac_address,
            name: frame.local_name.clone(),
            rssi: frame.rssi,
            timestamp: SystemTime::now(),
            temperature: reading.temperature_celsius(),
            humidity: reading.humidity_percent(),
            battery_voltage: f64::from(reading.battery_millivolts) / 1000.0,
            battery_percent: reading.battery_percent,
            frame_counter: reading.frame_counter,
            flags: reading.flags,
        }
    }
}

/// Per-installation offsets added to temperature and humidity before output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Calibration {
    pub temperature_offset: f64,
    pub humidity_offset: f64,
}

impl Calibration {
    pub fn is_identity(&self) -> bool {
        self.temperature_offset == 0.0 && self.humidity_offset == 0.0
    }

    pub fn apply(&self, measurement: &mut Measurement) {
        measurement.temperature += self.temperature_offset;
        measurement.humidity += self.humidity_offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::decode;
    use crate::test_utils::{TEST_MAC, base_measurement, sample_frame, sample_payload};

    #[test]
    fn test_new_converts_units() {
        let frame = sample_frame();
        let reading = decode(&sample_payload()).unwrap();
        let m = Measurement::new(&frame, &reading);

        assert_eq!(m.mac, TEST_MAC);
        assert_eq!(m.name.as_deref(), Some("ATC_DDEEFF"));
        assert_eq!(m.rssi, Some(-67));
        assert_eq!(m.temperature, 25.0);
        assert_eq!(m.humidity, 49.12);
        assert_eq!(m.battery_voltage, 3.784);
        assert_eq!(m.battery_percent, 85);
        assert_eq!(m.frame_counter, 7);
        assert!(m.timestamp.elapsed().is_ok());
    }

    #[test]
    fn test_mac_comes_from_payload() {
        let mut frame = sample_frame();
        frame.address = MacAddress([0x11; 6]);
        let reading = decode(&sample_payload()).unwrap();

        assert_eq!(Measurement::new(&frame, &reading).mac, TEST_MAC);
    }

    #[test]
    fn test_calibration_offsets() {
        let calibration = Calibration {
            temperature_offset: -0.5,
            humidity_offset: 2.0,
        };
        let mut m = base_measurement(TEST_MAC, SystemTime::UNIX_EPOCH);
        calibration.apply(&mut m);

        assert_eq!(m.temperature, 24.5);
        assert!((m.humidity - 51.12).abs() < 1e-9);
        assert!(!calibration.is_identity());
        assert!(Calibration::default().is_identity());
    }
}
