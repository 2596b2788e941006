//! Network error types

use thiserror::Error;
use wandermesh_protocol::{NodeId, TransportKind};
use wandermesh_routing::RoutingError;

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Node already attached: {0}")]
    NodeAlreadyAttached(NodeId),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Invalid link profile: {0}")]
    InvalidProfile(String),

    #[error("Invalid simulation parameters: {0}")]
    InvalidSimulation(String),

    #[error("Probe on {kind} failed: {reason}")]
    ProbeFailed { kind: TransportKind, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("No delivery channel accepts destination {0}")]
    NoChannelForDestination(String),

    #[error("Delivery over {channel} failed: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] wandermesh_protocol::ProtocolError),
}

impl From<NetworkError> for RoutingError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::ProbeFailed { kind, reason } => {
                RoutingError::DiscoveryFailed { kind, reason }
            }
            NetworkError::Protocol(e) => RoutingError::Protocol(e),
            other => RoutingError::Transport(other.to_string()),
        }
    }
}

/// Result type for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;
