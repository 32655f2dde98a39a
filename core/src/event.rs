//! Event trait and the serialized wire form used on the event bus.
//!
//! Events represent facts about things that have happened and are immutable.
//! They travel over the [`EventBus`](crate::event_bus::EventBus) as
//! [`SerializedEvent`] values: a type name, the `bincode` payload, and a copy
//! of the event's correlation token so listeners can route or skip an event
//! without decoding it.
//!
//! # Example
//!
//! ```
//! use relay_core::correlation::{CorrelationToken, Tracked};
//! use relay_core::event::{Event, SerializedEvent};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum ListEvent {
//!     Cleared { tracker: Option<CorrelationToken> },
//! }
//!
//! impl Event for ListEvent {
//!     fn event_type(&self) -> &'static str {
//!         "ListCleared.v1"
//!     }
//! }
//!
//! impl Tracked for ListEvent {
//!     fn correlation_token(&self) -> Option<CorrelationToken> {
//!         match self {
//!             ListEvent::Cleared { tracker } => *tracker,
//!         }
//!     }
//! }
//!
//! let token = CorrelationToken::mint();
//! let wire = SerializedEvent::from_event(&ListEvent::Cleared { tracker: Some(token) }).unwrap();
//! assert_eq!(wire.correlation_token, Some(token));
//! ```

use crate::correlation::{CorrelationToken, Tracked};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// An event that can be published on the event bus.
///
/// The `event_type()` string should be stable and versioned, e.g.
/// `"ItemCreated.v1"`.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are corrupted or
    /// belong to a different event type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// An event in its wire form.
#[derive(Clone, Debug)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., `"ItemCreated.v1"`).
    pub event_type: String,

    /// The bincode-serialized event data.
    pub data: Vec<u8>,

    /// Copy of the token carried inside `data`, if any.
    pub correlation_token: Option<CorrelationToken>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        correlation_token: Option<CorrelationToken>,
    ) -> Self {
        Self {
            event_type,
            data,
            correlation_token,
        }
    }

    /// Serialize an event, copying its correlation token into the envelope.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E>(event: &E) -> Result<Self, EventError>
    where
        E: Event + Tracked + Serialize,
    {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            correlation_token: event.correlation_token(),
        })
    }

    /// Decode the payload back into a typed event.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the payload does not decode as `E`.
    pub fn decode<E>(&self) -> Result<E, EventError>
    where
        E: Event + DeserializeOwned,
    {
        E::from_bytes(&self.data)
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.correlation_token {
            Some(token) => write!(
                f,
                "SerializedEvent {{ type: {}, size: {} bytes, token: {token} }}",
                self.event_type,
                self.data.len()
            ),
            None => write!(
                f,
                "SerializedEvent {{ type: {}, size: {} bytes }}",
                self.event_type,
                self.data.len()
            ),
        }
    }
}
