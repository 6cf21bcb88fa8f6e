//! # camlink Common Library
//!
//! Shared code for the camlink crates:
//! - Error type
//! - Config file resolution and TOML loading
//! - Event types (BridgeEvent enum) and EventBus
//! - Tracing subscriber initialisation
//! - Sample/duration conversions

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
pub use events::{BridgeEvent, EventBus, PipelineState};
