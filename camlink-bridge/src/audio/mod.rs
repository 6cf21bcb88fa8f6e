//! Audio primitives: G.711 decoding, resampling, output backends

pub mod backend;
pub mod clocked;
pub mod decoder;
pub mod output;
pub mod resampler;
pub mod types;

pub use backend::{OutputBackend, OutputGraph};
pub use clocked::ClockedBackend;
pub use decoder::{Codec, Decoder};
pub use output::CpalBackend;
pub use resampler::Resampler;
pub use types::{EncodedFrame, OutputFormat};
