//! Decoder for the pvvx custom firmware advertisement payload.
//!
//! The firmware broadcasts a fixed 15-byte blob as service data under the
//! Environmental Sensing service UUID (0x181A). All multi-byte integers are
//! little-endian:
//!
//! ```text
//! offset 0-5   : device MAC address
//! offset 6-7   : temperature, i16, 0.01 °C
//! offset 8-9   : humidity, u16, 0.01 %
//! offset 10-11 : battery, u16, mV
//! offset 12    : battery, u8, %
//! offset 13    : frame counter, u8
//! offset 14    : flags (bits 0-4, bits 5-7 reserved)
//! ```

use crate::mac_address::MacAddress;
use thiserror::Error;

/// Exact length of a pvvx payload in bytes.
pub const PAYLOAD_LEN: usize = 15;

/// Byte offsets of each field within the payload.
pub mod layout {
    use std::ops::Range;

    pub const MAC: Range<usize> = 0..6;
    pub const TEMPERATURE: usize = 6;
    pub const HUMIDITY: usize = 8;
    pub const BATTERY_MILLIVOLTS: usize = 10;
    pub const BATTERY_PERCENT: usize = 12;
    pub const FRAME_COUNTER: usize = 13;
    pub const FLAGS: usize = 14;
}

/// Error types for decoding pvvx payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is not exactly [`PAYLOAD_LEN`] bytes
    #[error("Invalid payload length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    /// A field accessor reached past the end of the payload
    #[error("Field at offset {offset} (length {len}) is out of bounds")]
    OutOfBounds { offset: usize, len: usize },
}

/// Event flags reported by the firmware in the last payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFlags {
    pub reed_switch: bool,
    pub gpio_trg: bool,
    pub output_gpio_trg: bool,
    pub temperature_triggered: bool,
    pub humidity_triggered: bool,
}

impl DeviceFlags {
    const REED_SWITCH: u8 = 0x01;
    const GPIO_TRG: u8 = 0x02;
    const OUTPUT_GPIO_TRG: u8 = 0x04;
    const TEMPERATURE_TRIGGERED: u8 = 0x08;
    const HUMIDITY_TRIGGERED: u8 = 0x10;

    /// Decode the flags byte. Reserved bits 5-7 are discarded.
    pub fn from_bits(byte: u8) -> Self {
        Self {
            reed_switch: byte & Self::REED_SWITCH != 0,
            gpio_trg: byte & Self::GPIO_TRG != 0,
            output_gpio_trg: byte & Self::OUTPUT_GPIO_TRG != 0,
            temperature_triggered: byte & Self::TEMPERATURE_TRIGGERED != 0,
            humidity_triggered: byte & Self::HUMIDITY_TRIGGERED != 0,
        }
    }

    /// The five meaningful bits packed back into a byte.
    pub fn bits(&self) -> u8 {
        [
            (self.reed_switch, Self::REED_SWITCH),
            (self.gpio_trg, Self::GPIO_TRG),
            (self.output_gpio_trg, Self::OUTPUT_GPIO_TRG),
            (self.temperature_triggered, Self::TEMPERATURE_TRIGGERED),
            (self.humidity_triggered, Self::HUMIDITY_TRIGGERED),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .fold(0, |acc, (_, mask)| acc | mask)
    }
}

/// A decoded pvvx payload, in the firmware's raw units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReading {
    pub mac_address: MacAddress,
    /// Hundredths of a degree Celsius
    pub temperature: i16,
    /// Hundredths of a percent relative humidity
    pub humidity: u16,
    pub battery_millivolts: u16,
    pub battery_percent: u8,
    /// Incremented by the device on each new measurement, wraps at 256
    pub frame_counter: u8,
    pub flags: DeviceFlags,
}

impl SensorReading {
    pub fn temperature_celsius(&self) -> f64 {
        f64::from(self.temperature) / 100.0
    }

    pub fn humidity_percent(&self) -> f64 {
        f64::from(self.humidity) / 100.0
    }
}

fn field(data: &[u8], offset: usize, len: usize) -> Result<&[u8], DecodeError> {
    data.get(offset..offset + len)
        .ok_or(DecodeError::OutOfBounds { offset, len })
}

fn read_u8(data: &[u8], offset: usize) -> Result<u8, DecodeError> {
    Ok(field(data, offset, 1)?[0])
}

fn read_le<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], DecodeError> {
    let bytes = field(data, offset, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Decode a pvvx payload into a [`SensorReading`].
///
/// The payload must be exactly [`PAYLOAD_LEN`] bytes; anything else is
/// rejected rather than truncated or padded.
pub fn decode(data: &[u8]) -> Result<SensorReading, DecodeError> {
    if data.len() != PAYLOAD_LEN {
        return Err(DecodeError::InvalidLength {
            expected: PAYLOAD_LEN,
            actual: data.len(),
        });
    }

    let mac: [u8; 6] = read_le(data, layout::MAC.start)?;

    Ok(SensorReading {
        mac_address: MacAddress(mac),
        temperature: i16::from_le_bytes(read_le(data, layout::TEMPERATURE)?),
        humidity: u16::from_le_bytes(read_le(data, layout::HUMIDITY)?),
        battery_millivolts: u16::from_le_bytes(read_le(data, layout::BATTERY_MILLIVOLTS)?),
        battery_percent: read_u8(data, layout::BATTERY_PERCENT)?,
        frame_counter: read_u8(data, layout::FRAME_COUNTER)?,
        flags: DeviceFlags::from_bits(read_u8(data, layout::FLAGS)?),
    })
}
