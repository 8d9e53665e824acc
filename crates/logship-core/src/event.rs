//! Event Data Structure
//!
//! This module defines the `Event` type - the unit of data an input hands to
//! the publisher pipeline.
//!
//! ## Structure
//! Each event contains:
//! - **timestamp**: When the event was observed (milliseconds since epoch)
//! - **message**: The raw collected payload (a log line, a journal entry)
//! - **fields**: Structured metadata extracted or attached by the input
//! - **private**: Opaque per-event metadata carried through the pipeline and
//!   handed back on acknowledgement
//!
//! ## Design Decisions
//! - Uses `bytes::Bytes` for the raw payload (zero-copy slicing)
//! - `fields` is a `serde_json::Value` so inputs can attach arbitrary shapes
//! - `private` is never serialized or inspected by the pipeline; it exists so
//!   stateful inputs can defer work (cursor updates) until delivery has been
//!   confirmed by the outputs

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

/// Opaque per-event metadata returned through the ACK path.
pub type EventPrivate = Arc<dyn Any + Send + Sync>;

/// A single event produced by an input.
#[derive(Clone)]
pub struct Event {
    /// Timestamp in milliseconds since epoch.
    pub timestamp: i64,

    /// Raw collected payload.
    pub message: Bytes,

    /// Structured fields attached by the input.
    pub fields: Value,

    /// Private ACK metadata. Opaque to the pipeline; delivered back to the
    /// registered ACK handler once the outputs confirm the event.
    pub private: Option<EventPrivate>,
}

impl Event {
    pub fn new(timestamp: i64, message: Bytes, fields: Value) -> Self {
        Self {
            timestamp,
            message,
            fields,
            private: None,
        }
    }

    /// Estimate the size of this event in bytes.
    pub fn estimated_size(&self) -> usize {
        8 + self.message.len() + self.fields.to_string().len()
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("timestamp", &self.timestamp)
            .field("message", &self.message)
            .field("fields", &self.fields)
            .field("private", &self.private.as_ref().map(|_| "<private>"))
            .finish()
    }
}
