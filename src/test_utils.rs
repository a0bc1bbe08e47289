use crate::filter::ENVIRONMENTAL_SENSING_UUID;
use crate::frame::BroadcastFrame;
use crate::mac_address::MacAddress;
use crate::measurement::Measurement;
use crate::payload::{DeviceFlags, PAYLOAD_LEN};
use crate::scanner::{ScanError, ScanFuture, ScanService};
use std::collections::VecDeque;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Reference payload: 25.00 °C, 49.12 %, 3784 mV, 85 %, frame 7, no flags.
pub fn sample_payload() -> [u8; PAYLOAD_LEN] {
    [
        0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, // MAC
        0xC4, 0x09, // Temperature: 2500
        0x30, 0x13, // Humidity: 4912
        0xC8, 0x0E, // Battery: 3784 mV
        0x55, // Battery: 85 %
        0x07, // Frame counter
        0x00, // Flags
    ]
}

/// A frame carrying [`sample_payload`] with a name and RSSI.
pub fn sample_frame() -> BroadcastFrame {
    BroadcastFrame::new(TEST_MAC)
        .with_local_name("ATC_DDEEFF")
        .with_rssi(-67)
        .with_service_data(ENVIRONMENTAL_SENSING_UUID, sample_payload())
}

/// Build a `Measurement` matching [`sample_payload`].
///
/// Tests can override just the fields they care about.
pub fn base_measurement(mac: MacAddress, timestamp: SystemTime) -> Measurement {
    Measurement {
        mac,
        name: None,
        rssi: None,
        timestamp,
        temperature: 25.0,
        humidity: 49.12,
        battery_voltage: 3.784,
        battery_percent: 85,
        frame_counter: 7,
        flags: DeviceFlags::default(),
    }
}

/// Scripted scan service.
///
/// Each `start` pops a batch of frames to deliver (sent before `start`
/// resolves) and a scripted result; once the script is empty starts
/// succeed with no frames. Each `stop` likewise sends one of
/// `stop_batches`, as a radio does with frames in flight when scanning is
/// disabled. The token is cancelled after `cancel_after` stops.
#[derive(Default)]
pub struct FakeScanService {
    pub start_results: VecDeque<Result<(), ScanError>>,
    pub stop_results: VecDeque<Result<(), ScanError>>,
    pub batches: VecDeque<Vec<BroadcastFrame>>,
    pub stop_batches: VecDeque<Vec<BroadcastFrame>>,
    pub starts: u32,
    pub stops: u32,
    pub cancel_after: Option<(u32, CancellationToken)>,
    sender: Option<mpsc::Sender<BroadcastFrame>>,
}

impl FakeScanService {
    pub fn with_batches(batches: Vec<Vec<BroadcastFrame>>) -> Self {
        Self {
            batches: batches.into(),
            ..Default::default()
        }
    }

    pub fn cancel_after(mut self, stops: u32, token: &CancellationToken) -> Self {
        self.cancel_after = Some((stops, token.clone()));
        self
    }
}

impl ScanService for FakeScanService {
    fn start(&mut self, frames: mpsc::Sender<BroadcastFrame>) -> ScanFuture<'_> {
        Box::pin(async move {
            self.starts += 1;
            self.start_results.pop_front().unwrap_or(Ok(()))?;
            for frame in self.batches.pop_front().unwrap_or_default() {
                frames.send(frame).await.unwrap();
            }
            self.sender = Some(frames);
            Ok(())
        })
    }

    fn stop(&mut self) -> ScanFuture<'_> {
        Box::pin(async move {
            self.stops += 1;
            if let Some(frames) = self.sender.take() {
                for frame in self.stop_batches.pop_front().unwrap_or_default() {
                    frames.send(frame).await.unwrap();
                }
            }
            if let Some((after, token)) = &self.cancel_after
                && self.stops >= *after
            {
                token.cancel();
            }
            self.stop_results.pop_front().unwrap_or(Ok(()))
        })
    }
}
