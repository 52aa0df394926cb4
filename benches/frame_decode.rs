//! Benchmarks for the inbound hot path
//!
//! Covers the work the ingest loop does per frame:
//! - Framing a byte stream (clean and with interleaved line noise)
//! - Decoding frames into typed telemetry
//! - Encoding the outbound setpoint
//!
//! Platform: Cross-platform (synthetic frames, CI-safe)

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use mavbridge::codec::{Codec, MavlinkCodec, Route};
use mavbridge::framing::FrameParser;
use mavbridge::test_utils::{attitude_frame, heartbeat_frame};
use mavbridge::types::Frame;
use mavbridge::{Identity, SetpointCommand};
use std::hint::black_box;

const AUTOPILOT: Identity = Identity { system_id: 1, component_id: 1 };

/// A second of typical traffic: attitude at 50 Hz plus a 1 Hz heartbeat.
fn telemetry_stream() -> Vec<Frame> {
    let mut frames = Vec::with_capacity(51);
    frames.push(heartbeat_frame(AUTOPILOT, 0).expect("heartbeat"));
    for i in 0..50u8 {
        let t = i as f32 * 0.02;
        frames.push(
            attitude_frame(AUTOPILOT, i.wrapping_add(1), i as u32 * 20, t, -t, t * 2.0)
                .expect("attitude"),
        );
    }
    frames
}

fn bench_framing(c: &mut Criterion) {
    let frames = telemetry_stream();
    let clean: Vec<u8> = frames.iter().flat_map(|f| f.as_bytes().to_vec()).collect();
    let noisy: Vec<u8> = frames
        .iter()
        .flat_map(|f| {
            let mut bytes = vec![0x00, 0x55, 0xAA];
            bytes.extend_from_slice(f.as_bytes());
            bytes
        })
        .collect();

    let mut group = c.benchmark_group("framing");

    group.throughput(Throughput::Bytes(clean.len() as u64));
    group.bench_function("clean_stream", |b| {
        b.iter(|| {
            let mut parser = FrameParser::new();
            let mut count = 0;
            for chunk in black_box(&clean).chunks(64) {
                parser.push(chunk);
                count += parser.drain_frames().len();
            }
            black_box(count)
        })
    });

    group.throughput(Throughput::Bytes(noisy.len() as u64));
    group.bench_function("noisy_stream", |b| {
        b.iter(|| {
            let mut parser = FrameParser::new();
            let mut count = 0;
            for chunk in black_box(&noisy).chunks(64) {
                parser.push(chunk);
                count += parser.drain_frames().len();
            }
            black_box(count)
        })
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let frames = telemetry_stream();
    let codec = MavlinkCodec;

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(frames.len() as u64));
    group.bench_function("telemetry_second", |b| {
        b.iter(|| {
            for frame in black_box(&frames) {
                black_box(codec.decode(frame).expect("decode"));
            }
        })
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let command = SetpointCommand::velocity(1.0, 0.5, -0.25).with_yaw_rate(0.1);
    let route = Route { sequence: 0, source: Identity::new(1, 0), target: AUTOPILOT };

    c.bench_function("encode_setpoint", |b| {
        b.iter(|| black_box(MavlinkCodec.encode(black_box(&command), route).expect("encode")))
    });
}

criterion_group!(benches, bench_framing, bench_decode, bench_encode);
criterion_main!(benches);
