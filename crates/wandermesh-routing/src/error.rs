//! Routing error types

use thiserror::Error;
use wandermesh_protocol::TransportKind;

/// Routing-specific errors
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    #[error("Pending queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Discovery failed on {kind}: {reason}")]
    DiscoveryFailed { kind: TransportKind, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] wandermesh_protocol::ProtocolError),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;
