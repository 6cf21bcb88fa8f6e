//! Event types for the camlink event system
//!
//! Provides the shared event definitions and an EventBus used by the bridge
//! pipeline to report lifecycle changes and health problems out-of-band.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Pipeline lifecycle state as seen by event consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Output graph not running; frames may still be buffered
    Idle,
    /// Output graph running and supervised by the watchdog
    Started,
    /// Watchdog exhausted its restart budget; terminal until `stop()`
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Started => "started",
            PipelineState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bridge event types
///
/// Events are broadcast via EventBus and are serializable for diagnostics
/// consumers (log shippers, test harnesses).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    /// Output graph started and watchdog armed
    PipelineStarted {
        source_sample_rate: u32,
        target_sample_rate: u32,
        timestamp: DateTime<Utc>,
    },

    /// Output graph torn down by `stop()`
    PipelineStopped {
        timestamp: DateTime<Utc>,
    },

    /// Watchdog observed no render progress (or a dead output graph)
    StallDetected {
        /// Callback count at the time the stall was observed
        callback_count: u64,
        /// Whether the output graph still reported itself as running
        graph_running: bool,
        /// Restart attempt this stall will consume (1-based)
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// Output graph successfully rebuilt
    OutputRebuilt {
        attempt: u32,
        /// Samples still queued in the ring buffer after the rebuild
        buffered_samples: usize,
        timestamp: DateTime<Utc>,
    },

    /// Output graph rebuild attempt failed
    OutputRebuildFailed {
        attempt: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Restart budget exhausted; no further automatic restarts
    PipelineFailed {
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// Ring buffer dropped its oldest samples to make room
    BufferOverrun {
        /// Samples dropped since the previous report
        dropped: u64,
        /// Total overrun-dropped samples since the last reset
        total: u64,
        timestamp: DateTime<Utc>,
    },

    /// Render requests the ring buffer could not fully satisfy
    BufferUnderrun {
        /// New underrun events since the previous report
        new_underruns: u64,
        /// Total underrun events since the last reset
        total: u64,
        timestamp: DateTime<Utc>,
    },

    /// Frame discarded because its sequence number was already seen
    DuplicateFrameDropped {
        sequence: u64,
        timestamp: DateTime<Utc>,
    },

    /// Incoming frames changed their declared sample rate
    SourceRateChanged {
        old_rate: u32,
        new_rate: u32,
        timestamp: DateTime<Utc>,
    },
}

impl BridgeEvent {
    /// Short event name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            BridgeEvent::PipelineStarted { .. } => "PipelineStarted",
            BridgeEvent::PipelineStopped { .. } => "PipelineStopped",
            BridgeEvent::StallDetected { .. } => "StallDetected",
            BridgeEvent::OutputRebuilt { .. } => "OutputRebuilt",
            BridgeEvent::OutputRebuildFailed { .. } => "OutputRebuildFailed",
            BridgeEvent::PipelineFailed { .. } => "PipelineFailed",
            BridgeEvent::BufferOverrun { .. } => "BufferOverrun",
            BridgeEvent::BufferUnderrun { .. } => "BufferUnderrun",
            BridgeEvent::DuplicateFrameDropped { .. } => "DuplicateFrameDropped",
            BridgeEvent::SourceRateChanged { .. } => "SourceRateChanged",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// Emitting never blocks, so it is safe from the watchdog supervisor and the
/// producer path. It must not be used from the real-time render callback.
///
/// # Examples
///
/// ```
/// use camlink_common::events::{BridgeEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(BridgeEvent::PipelineStopped {
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(BridgeEvent::PipelineStopped { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped (the subscriber then observes `Lagged`).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: BridgeEvent,
    ) -> Result<usize, broadcast::error::SendError<BridgeEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: BridgeEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = BridgeEvent::PipelineFailed {
            attempts: 3,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PipelineFailed");
        assert_eq!(json["attempts"], 3);
        assert_eq!(event.event_type(), "PipelineFailed");
    }

    #[test]
    fn test_emit_without_subscribers_is_error() {
        let bus = EventBus::new(8);
        let result = bus.emit(BridgeEvent::PipelineStopped {
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_subscribers_receive_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(BridgeEvent::StallDetected {
            callback_count: 10,
            graph_running: true,
            attempt: 1,
            timestamp: Utc::now(),
        });
        bus.emit_lossy(BridgeEvent::OutputRebuilt {
            attempt: 1,
            buffered_samples: 320,
            timestamp: Utc::now(),
        });

        assert_eq!(rx.try_recv().unwrap().event_type(), "StallDetected");
        assert_eq!(rx.try_recv().unwrap().event_type(), "OutputRebuilt");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_pipeline_state_display() {
        assert_eq!(PipelineState::Idle.to_string(), "idle");
        assert_eq!(PipelineState::Failed.as_str(), "failed");
        let json = serde_json::to_string(&PipelineState::Started).unwrap();
        assert_eq!(json, "\"started\"");
    }
}
