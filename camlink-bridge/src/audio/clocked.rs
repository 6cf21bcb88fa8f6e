//! Timer-driven output without audio hardware
//!
//! Drives the [`OutputNode`] from a dedicated thread at real-time cadence,
//! one fixed-size period per tick, the way a device callback would. The
//! rendered audio can be recorded to a 16-bit WAV file; recordings continue
//! across rebuilds and are finalised when the backend is dropped.

use crate::audio::backend::{OutputBackend, OutputGraph};
use crate::audio::types::OutputFormat;
use crate::error::{Error, Result};
use crate::playback::output_node::OutputNode;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type Recorder = Arc<Mutex<Option<WavWriter<BufWriter<File>>>>>;

/// Default render period when the format does not fix a buffer size
const DEFAULT_PERIOD_MS: u32 = 10;

pub struct ClockedBackend {
    wav_path: Option<PathBuf>,
    recorder: Recorder,
    format: Option<OutputFormat>,
    period_frames: usize,
}

impl ClockedBackend {
    /// Render to nowhere (pacing only)
    pub fn new() -> Self {
        Self {
            wav_path: None,
            recorder: Arc::new(Mutex::new(None)),
            format: None,
            period_frames: 0,
        }
    }

    /// Render and record to `path`
    pub fn with_wav_output(path: impl Into<PathBuf>) -> Self {
        Self {
            wav_path: Some(path.into()),
            recorder: Arc::new(Mutex::new(None)),
            format: None,
            period_frames: 0,
        }
    }

    pub fn wav_path(&self) -> Option<&PathBuf> {
        self.wav_path.as_ref()
    }

    /// Flush and close the WAV file (also done on drop)
    pub fn finalize(&mut self) -> Result<()> {
        let writer = self
            .recorder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(writer) = writer {
            writer.finalize()?;
            if let Some(path) = &self.wav_path {
                info!("WAV recording finalised: {}", path.display());
            }
        }
        Ok(())
    }

    fn open_recorder(&self, format: &OutputFormat) -> Result<()> {
        let Some(path) = &self.wav_path else {
            return Ok(());
        };

        let mut guard = self
            .recorder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_some() {
            return Ok(());
        }

        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec)
            .map_err(|e| Error::SessionConfigFailed(format!("Cannot create {}: {}", path.display(), e)))?;
        info!("Recording output to {}", path.display());
        *guard = Some(writer);
        Ok(())
    }
}

impl Default for ClockedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ClockedBackend {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            warn!("Failed to finalise WAV recording: {}", e);
        }
    }
}

impl OutputBackend for ClockedBackend {
    fn name(&self) -> &str {
        if self.wav_path.is_some() {
            "wav"
        } else {
            "clocked"
        }
    }

    fn configure(&mut self, format: &OutputFormat) -> Result<()> {
        if format.sample_rate == 0 || format.channels == 0 {
            return Err(Error::FormatCreationFailed(format!(
                "Invalid output format: {} Hz, {} channels",
                format.sample_rate, format.channels
            )));
        }

        self.period_frames = match format.buffer_size_frames {
            Some(frames) if frames > 0 => frames as usize,
            _ => (format.sample_rate * DEFAULT_PERIOD_MS / 1000).max(1) as usize,
        };
        self.open_recorder(format)?;
        self.format = Some(*format);

        debug!(
            "Clocked output configured: {} Hz, {} channels, {} frames/period",
            format.sample_rate, format.channels, self.period_frames
        );
        Ok(())
    }

    fn open(&mut self, node: Arc<OutputNode>) -> Result<Box<dyn OutputGraph>> {
        let format = self
            .format
            .ok_or_else(|| Error::EngineStartFailed("Output not configured".to_string()))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let render_loop = RenderLoop {
            node,
            channels: format.channels as usize,
            period_frames: self.period_frames,
            period: Duration::from_secs_f64(self.period_frames as f64 / format.sample_rate as f64),
            recorder: Arc::clone(&self.recorder),
            shutdown: Arc::clone(&shutdown),
            alive: Arc::clone(&alive),
        };

        let handle = thread::Builder::new()
            .name("camlink-clock".to_string())
            .spawn(move || render_loop.run())
            .map_err(|e| Error::EngineStartFailed(format!("Failed to spawn clock thread: {}", e)))?;

        Ok(Box::new(ClockedGraph {
            handle: Some(handle),
            shutdown,
            alive,
        }))
    }
}

struct RenderLoop {
    node: Arc<OutputNode>,
    channels: usize,
    period_frames: usize,
    period: Duration,
    recorder: Recorder,
    shutdown: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

impl RenderLoop {
    fn run(self) {
        let mut buffer = vec![0.0f32; self.period_frames * self.channels];
        let mut next = Instant::now();

        while !self.shutdown.load(Ordering::Acquire) {
            self.node.render_interleaved(&mut buffer, self.channels);

            if let Err(e) = self.record(&buffer) {
                error!("WAV write failed, stopping clocked output: {}", e);
                break;
            }

            next += self.period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                // Fell behind; resync instead of bursting
                next = now;
            }
        }

        self.alive.store(false, Ordering::Release);
    }

    fn record(&self, buffer: &[f32]) -> std::result::Result<(), hound::Error> {
        let mut guard = self
            .recorder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(writer) = guard.as_mut() {
            for &sample in buffer {
                writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
            }
        }
        Ok(())
    }
}

struct ClockedGraph {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

impl OutputGraph for ClockedGraph {
    fn is_running(&self) -> bool {
        self.handle.is_some() && self.alive.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Clock thread panicked");
            }
        }
    }
}

impl Drop for ClockedGraph {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::ring_buffer::SampleRingBuffer;
    use crate::playback::stats::PipelineStats;

    fn running_node() -> Arc<OutputNode> {
        let ring = Arc::new(SampleRingBuffer::new(8000, Arc::new(PipelineStats::new())));
        let node = Arc::new(OutputNode::new(ring, 8000, 48_000, 1024));
        node.set_running(true);
        node
    }

    #[test]
    fn test_invalid_format_rejected() {
        let mut backend = ClockedBackend::new();
        let result = backend.configure(&OutputFormat::new(0, 2));
        assert!(matches!(result, Err(Error::FormatCreationFailed(_))));
    }

    #[test]
    fn test_clock_drives_render_callbacks() {
        let node = running_node();
        let mut backend = ClockedBackend::new();
        backend.configure(&OutputFormat::new(48_000, 1)).unwrap();

        let mut graph = backend.open(Arc::clone(&node)).unwrap();
        assert!(graph.is_running());
        thread::sleep(Duration::from_millis(100));
        graph.stop();

        assert!(!graph.is_running());
        assert!(node.stats().callback_count() >= 3);
    }

    #[test]
    fn test_wav_recording_has_output_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let node = running_node();
        node.ring().write(&[8000; 800]);

        let mut backend = ClockedBackend::with_wav_output(&path);
        backend.configure(&OutputFormat::new(48_000, 2)).unwrap();
        let mut graph = backend.open(node).unwrap();
        thread::sleep(Duration::from_millis(60));
        graph.stop();
        backend.finalize().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 48_000);
        assert_eq!(reader.spec().channels, 2);
        assert!(reader.len() > 0);
    }
}
