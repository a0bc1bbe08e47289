//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{ScanError, ScanFuture, ScanService};
use crate::frame::BroadcastFrame;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::StreamExt;
use log::{debug, trace};
use std::collections::HashSet;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Scan service backed by a BlueZ discovery session on the default adapter.
pub struct BluerScanner {
    // Keeps the D-Bus connection alive for the adapter handle
    _session: Session,
    adapter: Adapter,
    discovery: Option<JoinHandle<()>>,
}

impl BluerScanner {
    /// Connect to bluetoothd, power on the default adapter and configure an
    /// LE-only discovery filter that reports every advertisement, including
    /// repeats from known devices.
    pub async fn open() -> Result<Self, ScanError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                duplicate_data: true,
                ..Default::default()
            })
            .await?;

        debug!("Using Bluetooth adapter {}", adapter.name());

        Ok(Self {
            _session: session,
            adapter,
            discovery: None,
        })
    }
}

impl ScanService for BluerScanner {
    fn start(&mut self, frames: mpsc::Sender<BroadcastFrame>) -> ScanFuture<'_> {
        Box::pin(async move {
            if let Some(previous) = self.discovery.take() {
                previous.abort();
            }

            let adapter = self.adapter.clone();
            let mut cached = CachedDevices::new(adapter.device_addresses().await?);
            let (ready_tx, ready_rx) = oneshot::channel();

            // The discovery stream borrows the adapter, so it is created and
            // consumed inside the task that owns the adapter clone.
            self.discovery = Some(tokio::spawn(async move {
                let events = match adapter.discover_devices_with_changes().await {
                    Ok(events) => {
                        let _ = ready_tx.send(Ok(()));
                        events
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let mut events = std::pin::pin!(events);

                while let Some(event) = events.next().await {
                    let AdapterEvent::DeviceAdded(address) = event else {
                        continue;
                    };
                    if !cached.is_live(address) {
                        trace!("Skipping cached properties of {address}");
                        continue;
                    }
                    match read_frame(&adapter, address).await {
                        Ok(frame) => {
                            if frames.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => trace!("Skipping {address}: {e}"),
                    }
                }
            }));

            match ready_rx.await {
                Ok(result) => result.map_err(ScanError::from),
                Err(_) => Err(ScanError::Bluetooth(
                    "discovery task ended before starting".into(),
                )),
            }
        })
    }

    fn stop(&mut self) -> ScanFuture<'_> {
        Box::pin(async move {
            // Dropping the discovery stream ends the BlueZ discovery session.
            if let Some(discovery) = self.discovery.take() {
                discovery.abort();
                if let Err(e) = discovery.await
                    && !e.is_cancelled()
                {
                    return Err(ScanError::Bluetooth(format!("discovery task failed: {e}")));
                }
            }
            Ok(())
        })
    }
}

/// Devices BlueZ already knew when discovery started.
///
/// A new discovery stream first replays one `DeviceAdded` per known device,
/// carrying properties from an earlier advertisement. Later events for the
/// same device come from fresh advertisements.
#[derive(Debug, Default)]
struct CachedDevices {
    pending: HashSet<Address>,
}

impl CachedDevices {
    fn new(known: impl IntoIterator<Item = Address>) -> Self {
        Self {
            pending: known.into_iter().collect(),
        }
    }

    /// Whether a `DeviceAdded` event for `address` reflects a live advertisement.
    fn is_live(&mut self, address: Address) -> bool {
        !self.pending.remove(&address)
    }
}

/// Snapshot the advertisement properties BlueZ holds for a device.
async fn read_frame(adapter: &Adapter, address: Address) -> bluer::Result<BroadcastFrame> {
    let device = adapter.device(address)?;
    Ok(BroadcastFrame {
        address: address.into(),
        rssi: device.rssi().await?,
        local_name: device.name().await?,
        service_data: device.service_data().await?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac_address::MacAddress;

    #[test]
    fn test_address_to_mac_address() {
        let addr = Address([0xA4, 0xC1, 0x38, 0x0B, 0xEE, 0xFF]);
        let mac: MacAddress = addr.into();
        assert_eq!(mac, MacAddress([0xA4, 0xC1, 0x38, 0x0B, 0xEE, 0xFF]));
    }

    #[test]
    fn test_cached_devices_skip_initial_replay() {
        let known = Address([0xA4, 0xC1, 0x38, 0x0B, 0xEE, 0xFF]);
        let new = Address([0xA4, 0xC1, 0x38, 0x00, 0x00, 0x01]);
        let mut cached = CachedDevices::new([known]);

        assert!(!cached.is_live(known));
        assert!(cached.is_live(known));
        assert!(cached.is_live(new));
        assert!(cached.is_live(new));
    }

    #[test]
    fn test_cached_devices_empty_adapter() {
        let mut cached = CachedDevices::default();
        assert!(cached.is_live(Address([0x11; 6])));
    }
}
