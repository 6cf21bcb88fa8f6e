//! Resample Performance Benchmark
//!
//! Measures linear-interpolation upsampling at callback-sized chunks.
//!
//! **Goal:** Resampling must fit comfortably inside a device callback
//! **Target:** A 4096-frame render well under 1 ms
//!
//! ## Test Scenarios
//!
//! - 8000 Hz → 48000 Hz (ratio 6), the common camera case
//! - 16000 Hz → 44100 Hz (non-integer ratio)
//! - 8000 Hz → 48000 Hz through a full OutputNode render

use camlink_bridge::audio::Resampler;
use camlink_bridge::playback::{OutputNode, PipelineStats, SampleRingBuffer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

fn ramp(len: usize) -> Vec<i16> {
    (0..len).map(|i| ((i * 97) % 65_536) as u16 as i16).collect()
}

fn bench_resample_into(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample_into");

    for &(source_rate, target_rate) in &[(8000u32, 48_000u32), (16_000, 44_100)] {
        let output_frames = 4096;
        let needed = Resampler::source_frames_needed(output_frames, source_rate, target_rate);
        let input = ramp(needed);
        let mut out = vec![0.0f32; output_frames];

        group.throughput(Throughput::Elements(output_frames as u64));
        group.bench_function(
            BenchmarkId::from_parameter(format!("{}_to_{}", source_rate, target_rate)),
            |b| {
                b.iter(|| {
                    let n = Resampler::resample_into(
                        black_box(&input),
                        source_rate,
                        target_rate,
                        &mut out,
                    );
                    black_box(n);
                });
            },
        );
    }

    group.finish();
}

fn bench_output_node_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("output_node_render");
    let frames = 1024;
    group.throughput(Throughput::Elements(frames as u64));

    group.bench_function("8k_to_48k_1024_frames", |b| {
        let stats = Arc::new(PipelineStats::new());
        let ring = Arc::new(SampleRingBuffer::new(16_000, stats));
        let node = OutputNode::new(Arc::clone(&ring), 8000, 48_000, 4096);
        node.set_running(true);

        let refill = ramp(1024);
        let mut out = vec![0.0f32; frames];

        b.iter(|| {
            if ring.available_samples() < 200 {
                ring.write(&refill);
            }
            black_box(node.render(black_box(&mut out)));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_resample_into, bench_output_node_render);
criterion_main!(benches);
