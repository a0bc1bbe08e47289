//! Integration benchmark for the advertisement processing pipeline.
//!
//! Drives the full discovery loop through `run_with_io` with a fake scan
//! service that delivers one batch of frames and then ends the run.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pvvx_listener::app::{Options, run_with_io};
use pvvx_listener::discovery::process_frame;
use pvvx_listener::filter::ENVIRONMENTAL_SENSING_UUID;
use pvvx_listener::output::Format;
use pvvx_listener::scanner::ScanFuture;
use pvvx_listener::{Backend, BroadcastFrame, MacAddress, ScanService, decode};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 25.00 °C, 49.12 %, 3784 mV, 85 %
fn payload(mac: MacAddress) -> Vec<u8> {
    let mut data = mac.0.to_vec();
    data.extend_from_slice(&[0xC4, 0x09, 0x30, 0x13, 0xC8, 0x0E, 0x55, 0x07, 0x00]);
    data
}

fn frame(mac: MacAddress) -> BroadcastFrame {
    BroadcastFrame::new(mac)
        .with_local_name("ATC_DDEEFF")
        .with_rssi(-67)
        .with_service_data(ENVIRONMENTAL_SENSING_UUID, payload(mac))
}

const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Delivers its frames on start, then cancels so the loop exits after one window.
struct OneShotService {
    frames: Vec<BroadcastFrame>,
    cancel: CancellationToken,
}

impl ScanService for OneShotService {
    fn start(&mut self, tx: mpsc::Sender<BroadcastFrame>) -> ScanFuture<'_> {
        Box::pin(async move {
            for frame in self.frames.drain(..) {
                let _ = tx.send(frame).await;
            }
            self.cancel.cancel();
            Ok(())
        })
    }

    fn stop(&mut self) -> ScanFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

fn default_options(format: Format) -> Options {
    Options {
        format,
        influxdb_measurement: "pvvx_measurement".to_string(),
        aliases: vec![],
        addresses: vec![],
        temperature_offset: 0.0,
        humidity_offset: 0.0,
        scan_window: Duration::from_millis(10),
        scan_retries: 0,
        retry_backoff: Duration::from_secs(1),
        verbose: false,
        backend: Backend::default(),
    }
}

fn run_once(
    rt: &Runtime,
    options: Options,
    frames: Vec<BroadcastFrame>,
    capacity: usize,
) -> Vec<u8> {
    let cancel = CancellationToken::new();
    let mut service = OneShotService {
        frames,
        cancel: cancel.clone(),
    };
    let mut out = Vec::<u8>::with_capacity(capacity);

    rt.block_on(async {
        run_with_io(options, &mut service, &mut out, cancel)
            .await
            .unwrap();
    });
    out
}

/// Decode and filter a single frame without the async loop
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    let data = payload(TEST_MAC);
    group.bench_function("payload", |b| b.iter(|| decode(black_box(&data))));

    let accepted = frame(TEST_MAC);
    group.bench_function("process_frame", |b| {
        b.iter(|| process_frame(black_box(&accepted)))
    });

    let rejected = BroadcastFrame::new(TEST_MAC)
        .with_service_data(ENVIRONMENTAL_SENSING_UUID, vec![0u8; 18]);
    group.bench_function("process_frame_rejected", |b| {
        b.iter(|| process_frame(black_box(&rejected)))
    });

    group.finish();
}

/// Full pipeline: scan service -> filter -> decode -> format -> write
fn bench_app_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("app_pipeline");
    let rt = Runtime::new().unwrap();
    group.throughput(Throughput::Elements(1));

    for (label, format) in [("slash", Format::Slash), ("influxdb", Format::Influxdb)] {
        group.bench_function(label, |b| {
            b.iter(|| black_box(run_once(&rt, default_options(format), vec![frame(TEST_MAC)], 512)))
        });
    }

    group.finish();
}

/// Batches of frames from different sensors in one window
fn bench_batch_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_pipeline");
    let rt = Runtime::new().unwrap();

    for batch_size in [1u8, 10, 100] {
        let frames: Vec<BroadcastFrame> = (0..batch_size)
            .map(|i| frame(MacAddress([0xA4, 0xC1, 0x38, 0x00, 0x00, i])))
            .collect();

        group.throughput(Throughput::Elements(u64::from(batch_size)));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &frames,
            |b, frames| {
                b.iter(|| {
                    let out = run_once(
                        &rt,
                        default_options(Format::Slash),
                        frames.clone(),
                        64 * frames.len(),
                    );
                    debug_assert_eq!(out.iter().filter(|&&b| b == b'\n').count(), frames.len());
                    black_box(out)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_app_pipeline, bench_batch_pipeline);
criterion_main!(benches);
