//! Error types for protocol operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid message ID")]
    InvalidMessageId,

    #[error("Unknown transport kind: {0}")]
    UnknownTransport(String),

    #[error("Content too large: {size} bytes (max: {max})")]
    ContentTooLarge { size: usize, max: usize },

    #[error("Clone count {count} exceeds cap {max}")]
    CloneCountExceeded { count: u8, max: u8 },

    #[error("Content does not match its integrity digest")]
    IntegrityMismatch,

    #[error("Message path is empty")]
    EmptyPath,

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
}
