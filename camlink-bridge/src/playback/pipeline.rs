//! Pipeline composition root
//!
//! Owns the ring buffer, the output node, the decoder and (while started) the
//! watchdog supervisor. `push_encoded_frame` is the only producer entry point;
//! the output device is the only consumer.
//!
//! ```text
//! frame source ─► push_encoded_frame ─► Decoder ─► SampleRingBuffer
//!                                                        │
//!             device callback ◄─ OutputNode (resample) ◄─┘
//!                    ▲
//!            supervisor thread (watchdog, rebuilds)
//! ```

use crate::audio::backend::OutputBackend;
use crate::audio::decoder::{Codec, Decoder};
use crate::audio::types::{EncodedFrame, OutputFormat, DEFAULT_SOURCE_SAMPLE_RATE};
use crate::error::{Error, Result};
use crate::playback::output_node::{OutputNode, MAX_SOURCE_SAMPLE_RATE};
use crate::playback::ring_buffer::SampleRingBuffer;
use crate::playback::sequence::{SequenceFilter, SequenceVerdict};
use crate::playback::stats::{PipelineStats, PipelineStatsSnapshot};
use crate::playback::supervisor::{self, SharedStatus, SupervisorContext, SupervisorHandle};
use crate::playback::watchdog::WatchdogConfig;
use camlink_common::{BridgeEvent, EventBus, PipelineState};
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Static pipeline parameters
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub codec: Codec,
    /// Initial source rate, until a frame declares otherwise
    pub source_sample_rate: u32,
    pub buffer_capacity_samples: usize,
    pub output_format: OutputFormat,
    pub tick_interval: Duration,
    pub watchdog: WatchdogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            codec: Codec::Alaw,
            source_sample_rate: DEFAULT_SOURCE_SAMPLE_RATE,
            // 500 ms at 8 kHz
            buffer_capacity_samples: 4000,
            output_format: OutputFormat::default(),
            tick_interval: Duration::from_secs(1),
            watchdog: WatchdogConfig::default(),
        }
    }
}

/// What happened to one pushed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Decoded into the ring buffer; `overrun` oldest samples were dropped
    /// to make room
    Buffered { samples: usize, overrun: usize },
    /// Sequence number already seen
    Duplicate,
    /// Older than the duplicate window
    Stale,
    /// Unusable sample rate tag
    Rejected,
}

struct ProducerState {
    filter: SequenceFilter,
    /// Reused decode buffer; grows to the largest frame seen
    scratch: Vec<i16>,
}

struct Control {
    /// Present while Idle; lent to the supervisor while started
    backend: Option<Box<dyn OutputBackend>>,
    supervisor: Option<SupervisorHandle>,
}

/// Real-time audio bridge from encoded frames to an output device
pub struct Pipeline {
    config: PipelineConfig,
    decoder: Decoder,
    stats: Arc<PipelineStats>,
    ring: Arc<SampleRingBuffer>,
    node: Arc<OutputNode>,
    status: Arc<SharedStatus>,
    events: EventBus,
    producer: Mutex<ProducerState>,
    control: Mutex<Control>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Pipeline {
    pub fn new(config: PipelineConfig, backend: Box<dyn OutputBackend>) -> Self {
        Self::with_event_bus(config, backend, EventBus::default())
    }

    pub fn with_event_bus(
        config: PipelineConfig,
        backend: Box<dyn OutputBackend>,
        events: EventBus,
    ) -> Self {
        let stats = Arc::new(PipelineStats::new());
        let ring = Arc::new(SampleRingBuffer::new(
            config.buffer_capacity_samples,
            Arc::clone(&stats),
        ));
        let node = Arc::new(OutputNode::new(
            Arc::clone(&ring),
            config.source_sample_rate,
            config.output_format.sample_rate,
            config.output_format.max_frames_per_callback,
        ));

        info!(
            "Pipeline created: codec={}, {} Hz → {} Hz, buffer={} samples, backend={}",
            config.codec,
            config.source_sample_rate,
            config.output_format.sample_rate,
            ring.capacity(),
            backend.name()
        );

        Self {
            decoder: Decoder::new(config.codec),
            config,
            stats,
            ring,
            node,
            status: Arc::new(SharedStatus::new()),
            events,
            producer: Mutex::new(ProducerState {
                filter: SequenceFilter::new(),
                scratch: Vec::new(),
            }),
            control: Mutex::new(Control {
                backend: Some(backend),
                supervisor: None,
            }),
        }
    }

    /// Configure the output, open the render stream and arm the watchdog.
    ///
    /// Returns the backend's typed error (`SessionConfigFailed`,
    /// `FormatCreationFailed`, `EngineStartFailed`) if the output cannot be
    /// brought up; the pipeline then stays Idle and `start` may be retried.
    ///
    /// Blocks until the output is running. Call from a plain thread (or
    /// `spawn_blocking`), not from inside an async task.
    pub fn start(&self) -> Result<()> {
        let mut control = lock(&self.control);

        match self.status.state() {
            PipelineState::Started => {
                return Err(Error::InvalidState("Pipeline already started".to_string()))
            }
            PipelineState::Failed => {
                return Err(Error::InvalidState(
                    "Pipeline failed; call stop() before restarting".to_string(),
                ))
            }
            PipelineState::Idle => {}
        }

        let backend = control
            .backend
            .take()
            .ok_or_else(|| Error::InvalidState("Output backend unavailable".to_string()))?;

        let ctx = SupervisorContext {
            node: Arc::clone(&self.node),
            stats: Arc::clone(&self.stats),
            status: Arc::clone(&self.status),
            events: self.events.clone(),
            format: self.config.output_format,
            tick_interval: self.config.tick_interval,
            watchdog: self.config.watchdog,
        };

        // Published before the supervisor runs so its first verdict wins
        self.status.set_restart_attempts(0);
        self.status.set_state(PipelineState::Started);
        self.node.set_running(true);
        match supervisor::spawn(backend, ctx) {
            Ok(handle) => {
                control.supervisor = Some(handle);
                info!("Pipeline started");
                self.events.emit_lossy(BridgeEvent::PipelineStarted {
                    source_sample_rate: self.node.source_rate(),
                    target_sample_rate: self.node.target_rate(),
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err((e, backend)) => {
                self.node.set_running(false);
                self.status.set_state(PipelineState::Idle);
                control.backend = backend;
                warn!("Pipeline start failed: {}", e);
                Err(e)
            }
        }
    }

    /// Tear down the output, stop the watchdog, discard buffered audio and
    /// reset all statistics. Valid in every state; also clears `Failed`.
    pub fn stop(&self) -> Result<()> {
        let mut control = lock(&self.control);

        // Render sees this before the graph goes away
        self.node.set_running(false);

        let was_active = if let Some(handle) = control.supervisor.take() {
            control.backend = handle.shutdown();
            true
        } else {
            false
        };

        {
            let mut producer = lock(&self.producer);
            self.ring.clear();
            self.stats.reset();
            producer.filter.reset();
        }

        self.status.set_restart_attempts(0);
        self.status.set_state(PipelineState::Idle);

        if was_active {
            info!("Pipeline stopped");
            self.events.emit_lossy(BridgeEvent::PipelineStopped {
                timestamp: Utc::now(),
            });
        }

        if control.backend.is_none() {
            return Err(Error::Internal("Output backend lost during shutdown".to_string()));
        }
        Ok(())
    }

    /// Decode one frame into the ring buffer (sole producer entry point).
    ///
    /// Allowed in any state; before `start` the buffer simply fills. Never
    /// fails: unusable frames are counted, logged and dropped.
    pub fn push_encoded_frame(&self, frame: EncodedFrame) -> PushOutcome {
        let mut producer = lock(&self.producer);

        if frame.sample_rate == 0 || frame.sample_rate > MAX_SOURCE_SAMPLE_RATE {
            warn!(
                "Dropping frame {} with unusable sample rate {} Hz",
                frame.sequence, frame.sample_rate
            );
            return PushOutcome::Rejected;
        }

        // Nothing to play; must not consume a sequence number or count as data
        if frame.payload.is_empty() {
            warn!("Dropping empty frame {}", frame.sequence);
            return PushOutcome::Rejected;
        }

        match producer.filter.check(frame.sequence) {
            SequenceVerdict::Accepted => {}
            SequenceVerdict::Reset => {
                info!(
                    "Frame sequence jumped back to {}; assuming sender restart",
                    frame.sequence
                );
            }
            verdict @ (SequenceVerdict::Duplicate | SequenceVerdict::Stale) => {
                self.stats.duplicate_frames.fetch_add(1, Ordering::Relaxed);
                debug!("Discarding {:?} frame {}", verdict, frame.sequence);
                self.events.emit_lossy(BridgeEvent::DuplicateFrameDropped {
                    sequence: frame.sequence,
                    timestamp: Utc::now(),
                });
                return if verdict == SequenceVerdict::Duplicate {
                    PushOutcome::Duplicate
                } else {
                    PushOutcome::Stale
                };
            }
        }

        let current_rate = self.node.source_rate();
        if frame.sample_rate != current_rate {
            self.node.set_source_rate(frame.sample_rate);
            info!(
                "Source sample rate changed: {} Hz → {} Hz",
                current_rate, frame.sample_rate
            );
            self.events.emit_lossy(BridgeEvent::SourceRateChanged {
                old_rate: current_rate,
                new_rate: frame.sample_rate,
                timestamp: Utc::now(),
            });
        }

        let len = frame.payload.len();
        if producer.scratch.len() < len {
            producer.scratch.resize(len, 0);
        }
        let decoded = self.decoder.decode_into(&frame.payload, &mut producer.scratch[..len]);
        let overrun = self.ring.write(&producer.scratch[..decoded]);

        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);

        PushOutcome::Buffered {
            samples: decoded,
            overrun,
        }
    }

    /// Ask the supervisor to reopen the output now (e.g. after a device route
    /// change). Does not consume a restart attempt.
    pub fn request_output_rebuild(&self) -> Result<()> {
        let control = lock(&self.control);
        match (&control.supervisor, self.status.state()) {
            (Some(handle), PipelineState::Started) => handle.request_rebuild(),
            (_, state) => Err(Error::InvalidState(format!(
                "Cannot rebuild output while {}",
                state
            ))),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.status.state()
    }

    /// `Some(PipelineFailed)` once the watchdog has given up
    pub fn failure(&self) -> Option<Error> {
        match self.status.state() {
            PipelineState::Failed => Some(Error::PipelineFailed {
                attempts: self.status.restart_attempts(),
            }),
            _ => None,
        }
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        let stats = &self.stats;
        PipelineStatsSnapshot {
            state: self.status.state(),
            total_samples_written: stats.total_samples_written(),
            total_samples_read: stats.total_samples_read(),
            underrun_count: stats.underrun_count(),
            overrun_count: stats.overrun_count(),
            callback_count: stats.callback_count(),
            last_callback_age_ms: stats.last_callback_age().map(|d| d.as_millis() as u64),
            frames_received: stats.frames_received(),
            duplicate_frames: stats.duplicate_frames(),
            buffered_samples: self.ring.available_samples(),
            buffer_capacity: self.ring.capacity(),
            fill_level: self.ring.fill_level(),
            source_sample_rate: self.node.source_rate(),
            target_sample_rate: self.node.target_rate(),
            restart_attempts: self.status.restart_attempts(),
            max_restart_attempts: self.config.watchdog.max_restart_attempts,
            output_stream_errors: self.status.stream_errors(),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Render node, for backends driven outside the supervisor (tests, tools)
    pub fn output_node(&self) -> &Arc<OutputNode> {
        &self.node
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let control = self
            .control
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = control.supervisor.take() {
            self.node.set_running(false);
            control.backend = handle.shutdown();
        }
    }
}
