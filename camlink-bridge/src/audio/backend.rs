//! Output backend abstraction
//!
//! A backend turns an [`OutputNode`] into a running pull-based render stream.
//! The watchdog supervisor owns the backend and the graph it opens; a stall
//! is recovered by stopping the graph and running `configure` + `open` again.

use crate::audio::types::OutputFormat;
use crate::error::Result;
use crate::playback::output_node::OutputNode;
use std::sync::Arc;

/// Factory for output graphs on one kind of audio sink.
///
/// Implementations must map their failures onto the typed start errors:
/// [`SessionConfigFailed`](crate::Error::SessionConfigFailed) and
/// [`FormatCreationFailed`](crate::Error::FormatCreationFailed) from
/// `configure`, [`EngineStartFailed`](crate::Error::EngineStartFailed) from
/// `open`.
pub trait OutputBackend: Send + 'static {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Configure the device/session for `format`. Called before every `open`,
    /// including rebuilds.
    fn configure(&mut self, format: &OutputFormat) -> Result<()>;

    /// Build and start one render stream pulling from `node`.
    fn open(&mut self, node: Arc<OutputNode>) -> Result<Box<dyn OutputGraph>>;

    /// Stream errors reported by the platform since the backend was created
    fn stream_errors(&self) -> u32 {
        0
    }
}

/// A started render stream.
///
/// Platform streams are often `!Send`, so graphs stay on the supervisor
/// thread that opened them.
pub trait OutputGraph {
    /// False once the stream reported an error or has been stopped
    fn is_running(&self) -> bool;

    /// Stop the stream and release the device
    fn stop(&mut self);
}
