//! Broadcast frames as reported by a scan backend.

use crate::mac_address::MacAddress;
use std::collections::HashMap;
use uuid::Uuid;

/// The Bluetooth base UUID, `00000000-0000-1000-8000-00805f9b34fb`.
///
/// 16-bit SIG-assigned UUIDs are shorthand for this value with the short
/// UUID placed in bits 96..112.
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expand a 16-bit SIG-assigned UUID into its full 128-bit form.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// A single advertisement observation.
///
/// Built by a scan backend for each advertisement it receives, consumed once
/// by the discovery loop and then dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastFrame {
    /// Address of the advertising device
    pub address: MacAddress,
    /// Received signal strength in dBm, when the backend reports it
    pub rssi: Option<i16>,
    /// Advertised local name, when present
    pub local_name: Option<String>,
    /// Service data keyed by service UUID
    pub service_data: HashMap<Uuid, Vec<u8>>,
}

impl BroadcastFrame {
    pub fn new(address: MacAddress) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    pub fn with_service_data(mut self, uuid: Uuid, data: impl Into<Vec<u8>>) -> Self {
        self.service_data.insert(uuid, data.into());
        self
    }

    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }
}
