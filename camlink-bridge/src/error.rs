//! Error types for camlink-bridge
//!
//! Decode and buffer operations cannot fail, so every variant here belongs to
//! output-graph setup, the watchdog's terminal failure, or the ambient
//! configuration/source plumbing around the pipeline.

use thiserror::Error;

/// Main error type for the bridge pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Output format (sample rate / channels / sample representation) could
    /// not be created for the output device
    #[error("Output format creation failed: {0}")]
    FormatCreationFailed(String),

    /// Output stream/engine could not be built or started
    #[error("Output engine start failed: {0}")]
    EngineStartFailed(String),

    /// Output device or audio session could not be configured
    #[error("Audio session configuration failed: {0}")]
    SessionConfigFailed(String),

    /// Watchdog exhausted its restart budget
    #[error("Pipeline failed after {attempts} output restart attempts")]
    PipelineFailed { attempts: u32 },

    /// Operation not valid in the current pipeline state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shared configuration/logging errors
    #[error(transparent)]
    Common(#[from] camlink_common::Error),

    /// Encoded frame source errors
    #[error("Frame source error: {0}")]
    Source(String),

    /// WAV recording errors
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the typed failures `start()` reports for output setup
    pub fn is_output_setup_error(&self) -> bool {
        matches!(
            self,
            Error::FormatCreationFailed(_) | Error::EngineStartFailed(_) | Error::SessionConfigFailed(_)
        )
    }
}

/// Convenience Result type using the bridge Error
pub type Result<T> = std::result::Result<T, Error>;
