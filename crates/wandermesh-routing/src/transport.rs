//! Transmission adapter boundary
//!
//! The routing core never talks to radios directly. Whatever transport layer
//! is configured implements [`TransmissionAdapter`] for probing neighbors and
//! handing a message to a chosen link.

use wandermesh_protocol::{Message, NodeId, TransportKind};

use crate::error::Result;
use crate::route_table::Link;

/// Neighbor visible on one transport kind, as reported by a probe
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborSample {
    pub neighbor: NodeId,
    pub signal_quality: f64,
    pub latency_ms: f64,
    pub cost_weight: f64,
}

impl NeighborSample {
    /// Convert into a route table link, validating the quality metrics
    pub fn into_link(self, transport: TransportKind) -> Result<Link> {
        Link::new(
            self.neighbor,
            transport,
            self.signal_quality,
            self.latency_ms,
            self.cost_weight,
        )
    }
}

/// Result of a transmission attempt
///
/// Failure is an ordinary outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransmitOutcome {
    pub success: bool,
    pub observed_latency_ms: f64,
}

impl TransmitOutcome {
    pub fn delivered(observed_latency_ms: f64) -> Self {
        Self {
            success: true,
            observed_latency_ms,
        }
    }

    pub fn failed(observed_latency_ms: f64) -> Self {
        Self {
            success: false,
            observed_latency_ms,
        }
    }
}

/// Capability contract the transport layer provides to the router
#[async_trait::async_trait]
pub trait TransmissionAdapter: Send + Sync {
    /// Probe one transport kind for currently visible neighbors
    ///
    /// Errors are non-fatal for the caller: that kind simply yields no links
    /// this cycle.
    async fn discover(&self, kind: TransportKind) -> Result<Vec<NeighborSample>>;

    /// Attempt to hand `message` to the neighbor behind `link`
    async fn transmit(&self, message: &Message, link: &Link) -> TransmitOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_into_link() {
        let sample = NeighborSample {
            neighbor: NodeId::from("b"),
            signal_quality: 0.5,
            latency_ms: 100.0,
            cost_weight: 1.0,
        };
        let link = sample.into_link(TransportKind::LoRa).unwrap();
        assert_eq!(link.transport, TransportKind::LoRa);
        assert!(link.available);

        let broken = NeighborSample {
            neighbor: NodeId::from("b"),
            signal_quality: 0.0,
            latency_ms: 100.0,
            cost_weight: 1.0,
        };
        assert!(broken.into_link(TransportKind::LoRa).is_err());
    }
}
