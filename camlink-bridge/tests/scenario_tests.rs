//! End-to-end behaviour scenarios
//!
//! A: A-law decode of the minimum-magnitude codes
//! B: 16 kHz sine rendered at 48 kHz keeps its amplitude
//! C: rendering with no input is silent and counts every underrun
//! D: a permanently stalled output is rebuilt exactly three times, then fails

mod helpers;

use camlink_bridge::audio::Decoder;
use camlink_bridge::playback::watchdog::{Decision, Observation};
use camlink_bridge::playback::{
    OutputNode, PipelineStats, PipelineWatchdog, SampleRingBuffer, WatchdogConfig,
};
use camlink_bridge::Error;
use camlink_common::PipelineState;
use helpers::*;
use std::sync::Arc;
use std::time::Duration;

fn node(source_rate: u32, target_rate: u32) -> OutputNode {
    let stats = Arc::new(PipelineStats::new());
    let ring = Arc::new(SampleRingBuffer::new(16_000, stats));
    let node = OutputNode::new(ring, source_rate, target_rate, 4096);
    node.set_running(true);
    node
}

#[test]
fn scenario_a_alternating_alaw_decodes_to_plus_minus_eight() {
    let input: Vec<u8> = (0..160).map(|i| if i % 2 == 0 { 0x55 } else { 0xD5 }).collect();

    let decoded = Decoder::default().decode(&input);

    assert_eq!(decoded.len(), 160);
    for (i, sample) in decoded.iter().enumerate() {
        let expected = if i % 2 == 0 { -8 } else { 8 };
        assert_eq!(*sample, expected, "sample {}", i);
    }
}

#[test]
fn scenario_b_sine_resampled_16k_to_48k_keeps_peak() {
    let node = node(16_000, 48_000);
    let input = sine_pcm(440.0, 16_000, 480, 20_000);
    let input_peak = input.iter().map(|s| (*s as f32).abs()).fold(0.0, f32::max) / 32768.0;
    node.ring().write(&input);

    let mut out = vec![0.0f32; 1440];
    let silent = node.render(&mut out);

    assert!(!silent);
    assert_eq!(node.stats().total_samples_read(), 480);
    assert_eq!(node.stats().underrun_count(), 0);
    let output_peak = peak(&out);
    assert!(
        (output_peak - input_peak).abs() <= input_peak * 0.05,
        "output peak {} vs input peak {}",
        output_peak,
        input_peak
    );
    // Whole request filled with signal, no zero padding at the end
    assert!(calculate_rms(&out[1200..]) > 0.1);
}

#[test]
fn scenario_c_no_input_renders_silence_and_counts_underruns() {
    let node = node(8000, 48_000);
    let mut out = vec![1.0f32; 480];

    for _ in 0..100 {
        out.fill(1.0);
        assert!(node.render(&mut out));
        assert!(out.iter().all(|&s| s == 0.0));
    }

    assert_eq!(node.stats().underrun_count(), 100);
    assert_eq!(node.stats().callback_count(), 100);
}

#[test]
fn scenario_d_state_machine_rebuilds_three_times_then_fails() {
    let mut watchdog = PipelineWatchdog::new(WatchdogConfig {
        max_restart_attempts: 3,
        healthy_ticks_to_reset: 10,
    });
    watchdog.arm();

    let stalled = Observation {
        callback_count: 0,
        graph_running: true,
        data_received: true,
    };

    let mut rebuilds = 0;
    let mut decisions = Vec::new();
    for _ in 0..4 {
        let decision = watchdog.observe(stalled);
        if let Decision::Rebuild { .. } = decision {
            rebuilds += 1;
            watchdog.rebuild_completed();
        }
        decisions.push(decision);
    }

    assert_eq!(rebuilds, 3);
    assert_eq!(decisions[3], Decision::Failed { attempts: 3 });
    assert!(watchdog.is_failed());
}

#[test]
fn scenario_d_stalled_pipeline_fails_after_three_rebuilds() {
    let (pipeline, control) = mock_pipeline(GraphMode::Frozen, test_config(20));
    let mut events = pipeline.subscribe_events();

    for frame in constant_alaw_frames(1, 160, 1000) {
        pipeline.push_encoded_frame(frame);
    }
    pipeline.start().unwrap();

    assert!(wait_until(Duration::from_secs(3), || {
        pipeline.state() == PipelineState::Failed
    }));

    // Terminal: no further attempts after Failed
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(control.opens(), 4, "initial open plus three rebuilds");

    let events = drain_events(&mut events);
    assert_eq!(count_events(&events, "StallDetected"), 3);
    assert_eq!(count_events(&events, "OutputRebuilt"), 3);
    assert_eq!(count_events(&events, "PipelineFailed"), 1);

    match pipeline.failure() {
        Some(Error::PipelineFailed { attempts }) => assert_eq!(attempts, 3),
        other => panic!("expected PipelineFailed, got {:?}", other),
    }
    assert_eq!(pipeline.stats().restart_attempts, 3);

    pipeline.stop().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(pipeline.failure().is_none());
}
