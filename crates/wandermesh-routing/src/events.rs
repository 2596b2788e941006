//! Outward notifications from the routing core

use std::fmt;
use tokio::sync::mpsc;
use wandermesh_protocol::Message;

/// Why a message instance was retired without delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Hop budget ran out
    TtlExhausted,
    /// Revisited this node with no clones left
    CloneLimitReached,
    /// Pending queue had no room
    QueueFull,
    /// Failed ingress validation
    Invalid,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DropReason::TtlExhausted => "ttl exhausted",
            DropReason::CloneLimitReached => "clone limit reached",
            DropReason::QueueFull => "queue full",
            DropReason::Invalid => "invalid",
        };
        f.write_str(reason)
    }
}

/// Delivery/drop hooks
///
/// Called inline from the forwarding engine; implementations must return
/// promptly and never block.
pub trait RoutingObserver: Send + Sync {
    fn on_delivered(&self, message: &Message);

    fn on_dropped(&self, message: &Message, reason: DropReason);
}

/// Event emitted through a channel observer
#[derive(Debug, Clone)]
pub enum RoutingEvent {
    Delivered(Message),
    Dropped { message: Message, reason: DropReason },
}

impl RoutingObserver for mpsc::UnboundedSender<RoutingEvent> {
    fn on_delivered(&self, message: &Message) {
        // Receiver gone means nobody is listening
        let _ = self.send(RoutingEvent::Delivered(message.clone()));
    }

    fn on_dropped(&self, message: &Message, reason: DropReason) {
        let _ = self.send(RoutingEvent::Dropped {
            message: message.clone(),
            reason,
        });
    }
}
