//! Test helper modules for camlink-bridge integration tests
//!
//! - MockBackend: scriptable output device with fault injection
//! - audio_generator: sine/constant fixtures and output analysis

#![allow(dead_code)]

pub mod audio_generator;
pub mod mock_backend;

pub use audio_generator::{
    calculate_rms, constant_alaw_frames, encode_frames, peak, sine_pcm,
};
pub use mock_backend::{GraphMode, InjectedFailure, MockBackend, MockControl};

use camlink_bridge::audio::OutputFormat;
use camlink_bridge::playback::{Pipeline, PipelineConfig, WatchdogConfig};
use camlink_common::BridgeEvent;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Fast-ticking pipeline config for tests
pub fn test_config(tick_ms: u64) -> PipelineConfig {
    PipelineConfig {
        tick_interval: Duration::from_millis(tick_ms),
        output_format: OutputFormat::new(48_000, 1).with_max_frames(1024),
        buffer_capacity_samples: 8000,
        watchdog: WatchdogConfig {
            max_restart_attempts: 3,
            healthy_ticks_to_reset: 0,
        },
        ..PipelineConfig::default()
    }
}

pub fn mock_pipeline(mode: GraphMode, config: PipelineConfig) -> (Pipeline, Arc<MockControl>) {
    let (backend, control) = MockBackend::new(mode);
    (Pipeline::new(config, Box::new(backend)), control)
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Drain everything currently queued on an event receiver
pub fn drain_events(rx: &mut broadcast::Receiver<BridgeEvent>) -> Vec<BridgeEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

pub fn count_events(events: &[BridgeEvent], event_type: &str) -> usize {
    events.iter().filter(|e| e.event_type() == event_type).count()
}
