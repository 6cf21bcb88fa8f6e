//! # camlink Audio Bridge Library (camlink-bridge)
//!
//! Real-time bridge from a camera's companded voice stream to a local audio
//! output device.
//!
//! **Purpose:** Accept G.711 frames that arrive irregularly, decode them,
//! buffer across the rate and timing mismatch, and feed a pull-based output
//! device on demand, rebuilding the output whenever it silently stalls.
//!
//! **Architecture:** decoder → lock-free ring buffer → render node
//! (linear resampler) → cpal stream, supervised by a watchdog thread.
//!
//! ```no_run
//! use camlink_bridge::audio::{ClockedBackend, EncodedFrame};
//! use camlink_bridge::playback::{Pipeline, PipelineConfig};
//!
//! # fn main() -> camlink_bridge::Result<()> {
//! let pipeline = Pipeline::new(PipelineConfig::default(), Box::new(ClockedBackend::new()));
//! pipeline.start()?;
//! pipeline.push_encoded_frame(EncodedFrame::new(vec![0xD5; 160], 0, 8000));
//! pipeline.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod source;

pub use error::{Error, Result};
pub use playback::{Pipeline, PipelineConfig};
