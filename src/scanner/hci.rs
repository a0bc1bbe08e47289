//! Raw HCI socket backend.
//!
//! This backend uses raw Linux HCI sockets to scan for BLE advertisements
//! without requiring the BlueZ daemon. It requires CAP_NET_RAW and
//! CAP_NET_ADMIN capabilities or root privileges.

use super::{ScanError, ScanFuture, ScanService};
use crate::frame::{BroadcastFrame, uuid_from_u16};
use crate::mac_address::MacAddress;
use libc::{
    AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_NONBLOCK, SOCK_RAW, c_int, c_void, sockaddr, socklen_t,
};
use log::{debug, warn};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const SOL_HCI: c_int = 0;
const HCI_FILTER: c_int = 2;
const HCI_CHANNEL_RAW: u16 = 0;

// HCI packet types
const HCI_COMMAND_PKT: u8 = 0x01;
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_CMD_COMPLETE: u8 = 0x0E;
const EVT_CMD_STATUS: u8 = 0x0F;
const EVT_LE_META_EVENT: u8 = 0x3E;
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

// Scan parameters, in 0.625 ms units
const LE_SCAN_PASSIVE: u8 = 0x00;
const LE_SCAN_INTERVAL: u16 = 0x0010;
const LE_SCAN_WINDOW: u16 = 0x0010;
const LE_PUBLIC_ADDRESS: u8 = 0x00;
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

// AD types
const AD_TYPE_SHORT_LOCAL_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
const AD_TYPE_SERVICE_DATA_128: u8 = 0x21;

/// RSSI value meaning "not available"
const RSSI_UNAVAILABLE: i8 = 127;

const HCI_MAX_EVENT_SIZE: usize = 260;

/// How long to wait for the controller to answer a command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn new() -> Self {
        Self {
            type_mask: 0,
            event_mask: [0, 0],
            opcode: 0,
        }
    }

    fn set_ptype(&mut self, ptype: u8) {
        self.type_mask |= 1 << (ptype as u32);
    }

    fn set_event(&mut self, event: u8) {
        let bit = event as usize;
        self.event_mask[bit / 32] |= 1 << (bit % 32);
    }
}

fn opcode(ogf: u16, ocf: u16) -> u16 {
    (ogf << 10) | ocf
}

/// Create an HCI command packet
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = opcode(ogf, ocf);
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(HCI_COMMAND_PKT);
    packet.extend_from_slice(&opcode.to_le_bytes());
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// Parameters for LE Set Scan Parameters: passive, accept all advertisers.
fn scan_parameters() -> [u8; 7] {
    let [interval_lo, interval_hi] = LE_SCAN_INTERVAL.to_le_bytes();
    let [window_lo, window_hi] = LE_SCAN_WINDOW.to_le_bytes();
    [
        LE_SCAN_PASSIVE,
        interval_lo,
        interval_hi,
        window_lo,
        window_hi,
        LE_PUBLIC_ADDRESS,
        FILTER_POLICY_ACCEPT_ALL,
    ]
}

/// Parameters for LE Set Scan Enable. Duplicates are never filtered, since
/// every repeat carries a fresh reading.
fn scan_enable(enable: bool) -> [u8; 2] {
    [u8::from(enable), 0x00]
}

fn os_error(context: &str) -> ScanError {
    ScanError::Bluetooth(format!("{context}: {}", io::Error::last_os_error()))
}

/// Open a raw HCI socket
fn open_hci_socket() -> Result<OwnedFd, ScanError> {
    // SOCK_NONBLOCK is required for AsyncFd to work properly
    let flags = SOCK_RAW | SOCK_CLOEXEC | SOCK_NONBLOCK;
    let fd = unsafe { libc::socket(AF_BLUETOOTH, flags, BTPROTO_HCI) };

    if fd < 0 {
        return Err(os_error("Failed to create HCI socket"));
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bind HCI socket to a device
fn bind_hci_socket(fd: &OwnedFd, dev_id: u16) -> Result<(), ScanError> {
    let addr = SockaddrHci {
        hci_family: AF_BLUETOOTH as u16,
        hci_dev: dev_id,
        hci_channel: HCI_CHANNEL_RAW,
    };

    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const SockaddrHci as *const sockaddr,
            mem::size_of::<SockaddrHci>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(os_error("Failed to bind HCI socket"));
    }

    Ok(())
}

/// Only deliver the given HCI events to the socket
fn set_hci_filter(fd: &OwnedFd, events: &[u8]) -> Result<(), ScanError> {
    let mut filter = HciFilter::new();
    filter.set_ptype(HCI_EVENT_PKT);
    for &event in events {
        filter.set_event(event);
    }

    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            SOL_HCI,
            HCI_FILTER,
            &filter as *const HciFilter as *const c_void,
            mem::size_of::<HciFilter>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(os_error("Failed to set HCI filter"));
    }

    Ok(())
}

/// Status the controller returned for `opcode`, if `event` is the Command
/// Complete or Command Status event answering it.
///
/// `event` starts at the HCI packet type byte.
fn command_status(event: &[u8], opcode: u16) -> Option<u8> {
    let (answered, status) = match *event {
        [HCI_EVENT_PKT, EVT_CMD_COMPLETE, _, _, lo, hi, status, ..] => {
            (u16::from_le_bytes([lo, hi]), status)
        }
        [HCI_EVENT_PKT, EVT_CMD_STATUS, _, status, _, lo, hi, ..] => {
            (u16::from_le_bytes([lo, hi]), status)
        }
        _ => return None,
    };
    (answered == opcode).then_some(status)
}

fn check_status(opcode: u16, status: u8) -> Result<(), ScanError> {
    match status {
        0x00 => Ok(()),
        status => Err(ScanError::Bluetooth(format!(
            "HCI command 0x{opcode:04X} failed with status 0x{status:02X}"
        ))),
    }
}

/// Read one packet from a non-blocking HCI socket.
async fn read_packet(async_fd: &AsyncFd<OwnedFd>, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let mut guard = async_fd.readable().await?;
        let read = guard.try_io(|inner| {
            let ret = unsafe {
                libc::read(inner.as_raw_fd(), buf.as_mut_ptr() as *mut c_void, buf.len())
            };
            if ret < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(ret as usize)
            }
        });
        match read {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

/// Wait for the controller's answer to `opcode`.
async fn await_command_status(async_fd: &AsyncFd<OwnedFd>, opcode: u16) -> io::Result<u8> {
    let mut buf = [0u8; HCI_MAX_EVENT_SIZE];
    loop {
        let n = read_packet(async_fd, &mut buf).await?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        if let Some(status) = command_status(&buf[..n], opcode) {
            return Ok(status);
        }
    }
}

/// Send an LE controller command and wait until the controller accepts it.
async fn send_le_command(
    cmd_fd: &AsyncFd<OwnedFd>,
    ocf: u16,
    params: &[u8],
) -> Result<(), ScanError> {
    let packet = hci_command_packet(OGF_LE_CTL, ocf, params);
    let ret = unsafe {
        libc::write(
            cmd_fd.get_ref().as_raw_fd(),
            packet.as_ptr() as *const c_void,
            packet.len(),
        )
    };

    if ret < 0 {
        return Err(os_error("Failed to send HCI command"));
    }

    let opcode = opcode(OGF_LE_CTL, ocf);
    let status = tokio::time::timeout(COMMAND_TIMEOUT, await_command_status(cmd_fd, opcode))
        .await
        .map_err(|_| ScanError::Bluetooth(format!("HCI command 0x{opcode:04X} timed out")))?
        .map_err(|e| ScanError::Bluetooth(format!("Failed to read HCI command status: {e}")))?;

    check_status(opcode, status)
}

/// Iterate over the `(type, value)` AD structures of an advertisement.
///
/// Stops at the first zero-length or truncated structure.
fn ad_structures(mut data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    std::iter::from_fn(move || {
        let (&len, rest) = data.split_first()?;
        let len = len as usize;
        if len == 0 || rest.len() < len {
            return None;
        }
        let (structure, remaining) = rest.split_at(len);
        data = remaining;
        let (&ad_type, value) = structure.split_first()?;
        Some((ad_type, value))
    })
}

/// Parse a single advertising report. Returns the frame and the number of
/// bytes consumed.
///
/// Layout: event type (1), address type (1), address (6, little-endian),
/// data length (1), data, RSSI (1).
fn parse_report(report: &[u8]) -> Option<(BroadcastFrame, usize)> {
    let mut addr = [0u8; 6];
    addr.copy_from_slice(report.get(2..8)?);
    addr.reverse();

    let data_len = *report.get(8)? as usize;
    let ad_data = report.get(9..9 + data_len)?;
    let rssi = *report.get(9 + data_len)? as i8;

    let mut frame = BroadcastFrame::new(MacAddress(addr));
    if rssi != RSSI_UNAVAILABLE {
        frame.rssi = Some(i16::from(rssi));
    }

    for (ad_type, value) in ad_structures(ad_data) {
        match ad_type {
            AD_TYPE_SERVICE_DATA_16 if value.len() >= 2 => {
                let uuid = uuid_from_u16(u16::from_le_bytes([value[0], value[1]]));
                frame.service_data.insert(uuid, value[2..].to_vec());
            }
            AD_TYPE_SERVICE_DATA_128 if value.len() >= 16 => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(&value[..16]);
                bytes.reverse();
                frame
                    .service_data
                    .insert(Uuid::from_bytes(bytes), value[16..].to_vec());
            }
            AD_TYPE_COMPLETE_LOCAL_NAME => {
                frame.local_name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_TYPE_SHORT_LOCAL_NAME if frame.local_name.is_none() => {
                frame.local_name = Some(String::from_utf8_lossy(value).into_owned());
            }
            _ => {}
        }
    }

    Some((frame, 10 + data_len))
}

/// Parse an LE Advertising Report event into frames.
///
/// `event` starts at the HCI packet type byte.
fn parse_advertising_report(event: &[u8]) -> Vec<BroadcastFrame> {
    if event.len() < 5
        || event[0] != HCI_EVENT_PKT
        || event[1] != EVT_LE_META_EVENT
        || event[3] != EVT_LE_ADVERTISING_REPORT
    {
        return Vec::new();
    }

    let num_reports = event[4] as usize;
    let mut frames = Vec::with_capacity(num_reports);
    let mut rest = &event[5..];

    for _ in 0..num_reports {
        let Some((frame, consumed)) = parse_report(rest) else {
            break;
        };
        frames.push(frame);
        rest = &rest[consumed..];
    }

    frames
}

/// Read HCI events until the socket fails or the frame queue closes.
async fn read_events(async_fd: AsyncFd<OwnedFd>, frames: mpsc::Sender<BroadcastFrame>) {
    let mut buf = [0u8; HCI_MAX_EVENT_SIZE];

    loop {
        let n = match read_packet(&async_fd, &mut buf).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                warn!("HCI read failed: {e}");
                return;
            }
        };

        for frame in parse_advertising_report(&buf[..n]) {
            if frames.send(frame).await.is_err() {
                return;
            }
        }
    }
}

fn async_fd(fd: OwnedFd) -> Result<AsyncFd<OwnedFd>, ScanError> {
    AsyncFd::new(fd).map_err(|e| ScanError::Bluetooth(format!("Failed to create async fd: {e}")))
}

/// Scan service using raw HCI sockets on a single controller.
pub struct HciScanner {
    dev_id: u16,
    /// Sends commands and receives their Command Complete/Status events
    cmd_fd: AsyncFd<OwnedFd>,
    reader: Option<JoinHandle<()>>,
}

impl HciScanner {
    /// Open a command socket on `hci<dev_id>`. Must be called within a
    /// Tokio runtime.
    pub fn open(dev_id: u16) -> Result<Self, ScanError> {
        let cmd_fd = open_hci_socket()?;
        bind_hci_socket(&cmd_fd, dev_id)?;
        set_hci_filter(&cmd_fd, &[EVT_CMD_COMPLETE, EVT_CMD_STATUS])?;
        let cmd_fd = async_fd(cmd_fd)?;
        debug!("Using HCI device hci{dev_id}");

        Ok(Self {
            dev_id,
            cmd_fd,
            reader: None,
        })
    }
}

impl ScanService for HciScanner {
    fn start(&mut self, frames: mpsc::Sender<BroadcastFrame>) -> ScanFuture<'_> {
        Box::pin(async move {
            if let Some(previous) = self.reader.take() {
                previous.abort();
            }

            let event_fd = open_hci_socket()?;
            bind_hci_socket(&event_fd, self.dev_id)?;
            set_hci_filter(&event_fd, &[EVT_LE_META_EVENT])?;
            let event_fd = async_fd(event_fd)?;

            send_le_command(&self.cmd_fd, OCF_LE_SET_SCAN_PARAMETERS, &scan_parameters()).await?;
            send_le_command(&self.cmd_fd, OCF_LE_SET_SCAN_ENABLE, &scan_enable(true)).await?;

            self.reader = Some(tokio::spawn(read_events(event_fd, frames)));
            Ok(())
        })
    }

    fn stop(&mut self) -> ScanFuture<'_> {
        Box::pin(async move {
            let disabled =
                send_le_command(&self.cmd_fd, OCF_LE_SET_SCAN_ENABLE, &scan_enable(false)).await;

            if let Some(reader) = self.reader.take() {
                reader.abort();
                if let Err(e) = reader.await
                    && !e.is_cancelled()
                {
                    return Err(ScanError::Bluetooth(format!("HCI reader failed: {e}")));
                }
            }

            disabled
        })
    }
}
