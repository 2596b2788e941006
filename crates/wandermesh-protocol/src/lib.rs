//! WanderMesh Protocol Module
//!
//! Core data structures for the WanderMesh store-and-forward network: node
//! and message identifiers, transport kinds, the message itself and the
//! per-message learning record that travels with it from hop to hop.

pub mod error;
pub mod learning;
pub mod message;
pub mod types;

pub use error::{ProtocolError, Result};
pub use learning::{LearningRecord, RouteObservation};
pub use message::{
    content_digest, Message, MessageId, CONTENT_DIGEST_SIZE, DEFAULT_TTL, MAX_CLONES,
    MAX_CONTENT_SIZE,
};
pub use types::{NodeId, Priority, TransportKind};

/// Current wall-clock time in unix milliseconds
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
