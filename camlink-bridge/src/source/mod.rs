//! Encoded frame sources
//!
//! The pipeline does not care how frames arrive. Integration layers implement
//! [`EncodedAudioSource`]; a [`SourcePump`] drives any source on its own
//! producer thread and pushes every frame into the pipeline.

pub mod channel;
pub mod file;
pub mod tone;

pub use channel::{ChannelSource, FrameSender};
pub use file::FileSource;
pub use tone::ToneSource;

use crate::audio::types::EncodedFrame;
use crate::error::{Error, Result};
use crate::playback::pipeline::{Pipeline, PushOutcome};
use camlink_common::time::samples_to_duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pull-style producer of encoded audio frames.
///
/// `next_frame` may block (for pacing or while waiting on the network).
/// `Ok(None)` ends the stream.
pub trait EncodedAudioSource: Send {
    fn next_frame(&mut self) -> Result<Option<EncodedFrame>>;

    /// Short description for logs
    fn describe(&self) -> String {
        "source".to_string()
    }
}

impl<S: EncodedAudioSource + ?Sized> EncodedAudioSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<EncodedFrame>> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Totals reported when a pump finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    pub frames_pushed: u64,
    pub frames_discarded: u64,
}

/// Producer thread feeding one source into a pipeline
pub struct SourcePump {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<PumpSummary>>,
}

impl SourcePump {
    pub fn spawn<S>(mut source: S, pipeline: Arc<Pipeline>) -> Result<Self>
    where
        S: EncodedAudioSource + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let description = source.describe();

        let handle = thread::Builder::new()
            .name("camlink-source".to_string())
            .spawn(move || {
                info!("Source pump started: {}", description);
                let mut summary = PumpSummary::default();

                while !stop_flag.load(Ordering::Acquire) {
                    let frame = match source.next_frame() {
                        Ok(Some(frame)) => frame,
                        Ok(None) => {
                            info!("Source ended: {}", description);
                            break;
                        }
                        Err(e) => {
                            warn!("Source failed: {}", e);
                            return Err(e);
                        }
                    };

                    match pipeline.push_encoded_frame(frame) {
                        PushOutcome::Buffered { .. } => summary.frames_pushed += 1,
                        _ => summary.frames_discarded += 1,
                    }
                }

                debug!(
                    "Source pump exiting: {} pushed, {} discarded",
                    summary.frames_pushed, summary.frames_discarded
                );
                Ok(summary)
            })
            .map_err(|e| Error::Source(format!("Failed to spawn source thread: {}", e)))?;

        Ok(Self { stop, handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Ask the pump to stop after the current frame and wait for it.
    ///
    /// A source blocked inside `next_frame` is waited for.
    pub fn stop(self) -> Result<PumpSummary> {
        self.stop.store(true, Ordering::Release);
        self.join()
    }

    /// Wait for the source to end on its own
    pub fn join(self) -> Result<PumpSummary> {
        self.handle
            .join()
            .map_err(|_| Error::Internal("Source thread panicked".to_string()))?
    }
}

/// Real-time pacing for synthetic and file sources
#[derive(Debug)]
pub(crate) struct Pacer {
    period: Duration,
    next: Option<Instant>,
}

impl Pacer {
    pub(crate) fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    /// Sleep until the next frame is due; the first call returns at once
    pub(crate) fn wait(&mut self) {
        let now = Instant::now();
        let due = *self.next.get_or_insert(now);
        if due > now {
            thread::sleep(due - now);
        }
        // Do not burst to catch up after a long stall
        self.next = Some(due.max(now) + self.period);
    }
}

/// Frame duration for `samples` at `sample_rate`
pub(crate) fn frame_period(samples: usize, sample_rate: u32) -> Duration {
    samples_to_duration(samples as u64, sample_rate)
}
