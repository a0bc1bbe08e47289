//! Continuous discovery loop.
//!
//! Some radio stacks silently stop delivering advertisements after a long
//! continuous scan, so the loop cycles the scan service through short
//! start / observe / stop windows until it is cancelled:
//!
//! ```text
//!   idle --start--> scanning --window elapsed--> stop --> idle --> ...
//!    |
//!    +-- cancelled: return
//! ```
//!
//! Frames arrive on a bounded queue filled by the scan service and are
//! consumed here one at a time: filter, decode, report.

use crate::filter;
use crate::frame::BroadcastFrame;
use crate::measurement::Measurement;
use crate::payload::{self, DecodeError};
use crate::report::Reporter;
use crate::scanner::{FRAME_CHANNEL_BUFFER_SIZE, ScanError, ScanService};
use log::{debug, info, trace, warn};
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default length of a scan window.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(1);

/// Errors that end the discovery loop.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to start scanning: {0}")]
    Start(#[source] ScanError),
    #[error("Failed to stop scanning: {0}")]
    Stop(#[source] ScanError),
    #[error("Accepted frame failed to decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("Failed to report measurement: {0}")]
    Report(#[from] io::Error),
}

/// Retry policy for scan start/stop failures.
///
/// The default performs no retries: the first failure ends the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), or `None` once retries
    /// are exhausted. Doubles per attempt, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        Some(
            self.initial_backoff
                .saturating_mul(factor)
                .min(self.max_backoff),
        )
    }
}

/// Discovery loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub window: Duration,
    pub retry: RetryPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_SCAN_WINDOW,
            retry: RetryPolicy::default(),
        }
    }
}

/// Counters returned when the loop exits cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    /// Completed scan windows
    pub windows: u64,
    /// Frames received from the scan service
    pub frames: u64,
    /// Frames that decoded into a reading
    pub readings: u64,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Start,
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => write!(f, "start"),
            Phase::Stop => write!(f, "stop"),
        }
    }
}

/// How a start or stop attempt sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Driven {
    Done,
    /// Cancelled while waiting to retry; the service is not running.
    Cancelled,
}

/// Run a frame through the filter and the decoder.
///
/// Returns `Ok(None)` for frames that do not carry a pvvx payload.
pub fn process_frame(frame: &BroadcastFrame) -> Result<Option<Measurement>, DecodeError> {
    let Some(data) = filter::candidate_payload(frame) else {
        trace!("Ignoring frame from {}", frame.address);
        return Ok(None);
    };
    let reading = payload::decode(data)?;
    Ok(Some(Measurement::new(frame, &reading)))
}

/// Drives a [`ScanService`] through repeated scan windows.
pub struct DiscoveryLoop {
    config: DiscoveryConfig,
    cancel: CancellationToken,
}

impl DiscoveryLoop {
    pub fn new(config: DiscoveryConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Run until cancelled or until the scan service fails.
    ///
    /// Cancellation is checked before every new window and also ends an open
    /// window early; the service is always stopped before returning from a
    /// started window.
    pub async fn run(
        &self,
        service: &mut dyn ScanService,
        reporter: &mut dyn Reporter,
    ) -> Result<DiscoveryStats, DiscoveryError> {
        let (tx, mut rx) = mpsc::channel(FRAME_CHANNEL_BUFFER_SIZE);
        let mut stats = DiscoveryStats::default();

        info!(
            "Starting discovery with {:?} scan windows",
            self.config.window
        );

        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(stats));
            }

            let started = self
                .drive(service, Phase::Start, &tx)
                .await
                .map_err(DiscoveryError::Start)?;
            if started == Driven::Cancelled {
                return Ok(self.cancelled(stats));
            }
            debug!("Scan window {} started", stats.windows + 1);

            let observed = self.observe(&mut rx, reporter, &mut stats).await;

            let stopped = self.drive(service, Phase::Stop, &tx).await;
            observed?;
            stopped.map_err(DiscoveryError::Stop)?;

            // Frames queued between the window closing and the service stopping
            while let Ok(frame) = rx.try_recv() {
                self.handle_frame(&frame, reporter, &mut stats)?;
            }

            stats.windows += 1;
            debug!("Scan window {} stopped", stats.windows);
        }
    }

    fn cancelled(&self, stats: DiscoveryStats) -> DiscoveryStats {
        info!(
            "Discovery cancelled after {} windows ({} frames, {} readings)",
            stats.windows, stats.frames, stats.readings
        );
        stats
    }

    /// Consume frames until the window elapses or the loop is cancelled.
    async fn observe(
        &self,
        rx: &mut mpsc::Receiver<BroadcastFrame>,
        reporter: &mut dyn Reporter,
        stats: &mut DiscoveryStats,
    ) -> Result<(), DiscoveryError> {
        let window = tokio::time::sleep(self.config.window);
        tokio::pin!(window);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                _ = &mut window => return Ok(()),
                Some(frame) = rx.recv() => self.handle_frame(&frame, reporter, stats)?,
            }
        }
    }

    fn handle_frame(
        &self,
        frame: &BroadcastFrame,
        reporter: &mut dyn Reporter,
        stats: &mut DiscoveryStats,
    ) -> Result<(), DiscoveryError> {
        stats.frames += 1;
        if let Some(measurement) = process_frame(frame)? {
            stats.readings += 1;
            reporter.report(measurement)?;
        }
        Ok(())
    }

    /// Start or stop the service, retrying per the configured policy.
    async fn drive(
        &self,
        service: &mut dyn ScanService,
        phase: Phase,
        frames: &mpsc::Sender<BroadcastFrame>,
    ) -> Result<Driven, ScanError> {
        let mut attempt = 0;
        loop {
            let result = match phase {
                Phase::Start => service.start(frames.clone()).await,
                Phase::Stop => service.stop().await,
            };

            let err = match result {
                Ok(()) => return Ok(Driven::Done),
                Err(err) => err,
            };

            let Some(delay) = self.config.retry.backoff(attempt) else {
                return Err(err);
            };
            attempt += 1;
            warn!(
                "Scan {phase} failed ({err}), retry {attempt}/{} in {delay:?}",
                self.config.retry.max_retries
            );

            // Cancellation abandons a pending start retry; stops always run
            // to completion.
            if matches!(phase, Phase::Start) {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(Driven::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            } else {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
