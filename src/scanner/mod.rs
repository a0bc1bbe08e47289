//! BLE scan backends.
//!
//! A backend is a [`ScanService`]: something that can be started and stopped,
//! and that pushes every advertisement it sees into a frame queue while
//! running. The discovery loop owns the start/stop cycle.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::frame::BroadcastFrame;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// Channel buffer size for observed frames.
pub const FRAME_CHANNEL_BUFFER_SIZE: usize = 100;

/// Future returned by [`ScanService`] operations.
pub type ScanFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ScanError>> + Send + 'a>>;

/// External advertisement scanner driven by the discovery loop.
pub trait ScanService: Send {
    /// Begin observation. Every advertisement received until [`stop`](Self::stop)
    /// is sent to `frames`.
    fn start(&mut self, frames: mpsc::Sender<BroadcastFrame>) -> ScanFuture<'_>;

    /// End observation. No frames are sent after this resolves.
    fn stop(&mut self) -> ScanFuture<'_>;
}

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Open the selected backend.
///
/// Acquiring the adapter can fail (no controller, no daemon, missing
/// capabilities); scanning itself does not begin until the discovery loop
/// calls [`ScanService::start`].
pub async fn open(backend: Backend) -> Result<Box<dyn ScanService>, ScanError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => Ok(Box::new(bluer::BluerScanner::open().await?)),
        #[cfg(feature = "hci")]
        Backend::Hci => Ok(Box::new(hci::HciScanner::open(0)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::Bluetooth("adapter not found".to_string());
        assert_eq!(err.to_string(), "Bluetooth error: adapter not found");
    }

    #[test]
    fn test_backend_from_str() {
        #[cfg(feature = "bluer")]
        {
            assert_eq!(Backend::from_str("bluer").unwrap(), Backend::Bluer);
            assert_eq!(Backend::from_str("BlueZ").unwrap(), Backend::Bluer);
        }
        #[cfg(feature = "hci")]
        {
            assert_eq!(Backend::from_str("hci").unwrap(), Backend::Hci);
            assert_eq!(Backend::from_str("raw").unwrap(), Backend::Hci);
        }
        assert!(Backend::from_str("invalid").is_err());
    }

    #[test]
    fn test_backend_display() {
        #[cfg(feature = "bluer")]
        assert_eq!(Backend::Bluer.to_string(), "bluer");
        #[cfg(feature = "hci")]
        assert_eq!(Backend::Hci.to_string(), "hci");
    }

    #[test]
    fn test_default_backend() {
        #[cfg(feature = "bluer")]
        assert_eq!(Backend::default(), Backend::Bluer);
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        assert_eq!(Backend::default(), Backend::Hci);
    }
}
