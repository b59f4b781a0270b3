//! Event types for the gleaner event system
//!
//! Acquisition runs broadcast typed events on an [`EventBus`] so status
//! readers and log shippers can follow a run without touching its state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Acquisition event types
///
/// Serialized with an internal `type` tag so they can be forwarded as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AcquisitionEvent {
    /// Acquisition run started
    SessionStarted {
        session_id: Uuid,
        target_count: usize,
        locations: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Session state machine moved between states
    StateChanged {
        session_id: Uuid,
        old_state: String,
        new_state: String,
        timestamp: DateTime<Utc>,
    },

    /// Active location switched
    LocationRotated {
        session_id: Uuid,
        /// Previous location (None for the initial selection)
        from: Option<String>,
        to: String,
        timestamp: DateTime<Utc>,
    },

    /// Item persisted to the sink
    ItemAccepted {
        session_id: Uuid,
        item_id: String,
        location: String,
        image_count: usize,
        accepted_total: usize,
        timestamp: DateTime<Utc>,
    },

    /// Item skipped (not enough usable images)
    ItemSkipped {
        session_id: Uuid,
        item_id: String,
        location: String,
        usable_images: usize,
        timestamp: DateTime<Utc>,
    },

    /// Item dropped because of a labeling or sink failure
    ItemErrored {
        session_id: Uuid,
        item_id: String,
        location: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Run reached its target (or ran out of locations)
    SessionCompleted {
        session_id: Uuid,
        accepted: usize,
        exhausted: bool,
        duration_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// Run aborted (fatal error or cancellation)
    SessionAborted {
        session_id: Uuid,
        accepted: usize,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl AcquisitionEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            AcquisitionEvent::SessionStarted { .. } => "SessionStarted",
            AcquisitionEvent::StateChanged { .. } => "StateChanged",
            AcquisitionEvent::LocationRotated { .. } => "LocationRotated",
            AcquisitionEvent::ItemAccepted { .. } => "ItemAccepted",
            AcquisitionEvent::ItemSkipped { .. } => "ItemSkipped",
            AcquisitionEvent::ItemErrored { .. } => "ItemErrored",
            AcquisitionEvent::SessionCompleted { .. } => "SessionCompleted",
            AcquisitionEvent::SessionAborted { .. } => "SessionAborted",
        }
    }
}

/// Broadcast bus for [`AcquisitionEvent`]s
///
/// Old events are dropped for slow receivers once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AcquisitionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use gleaner_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AcquisitionEvent,
    ) -> Result<usize, broadcast::error::SendError<AcquisitionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AcquisitionEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
