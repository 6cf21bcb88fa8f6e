//! Buffering, rendering and supervision of the bridged audio stream

pub mod output_node;
pub mod pipeline;
pub mod ring_buffer;
pub mod sequence;
pub mod stats;
pub mod supervisor;
pub mod watchdog;

pub use output_node::OutputNode;
pub use pipeline::{Pipeline, PipelineConfig, PushOutcome};
pub use ring_buffer::SampleRingBuffer;
pub use stats::{PipelineStats, PipelineStatsSnapshot};
pub use watchdog::{PipelineWatchdog, WatchdogConfig, WatchdogPhase};
