//! Link discovery
//!
//! One cycle probes every configured transport kind and merges what it sees
//! into the route table. Pairs not observed in a cycle are left as they are.
//! A failing probe is logged and the cycle moves on to the next kind.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use wandermesh_protocol::TransportKind;

use crate::route_table::{Link, RouteTable};
use crate::transport::TransmissionAdapter;

/// Summary of one discovery cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Transport kinds probed
    pub probed: usize,
    /// Kinds whose probe failed
    pub failed: Vec<TransportKind>,
    /// Links merged into the route table
    pub links_merged: usize,
    /// Samples rejected for invalid metrics
    pub samples_rejected: usize,
}

/// Periodic route table refresher
pub struct DiscoveryService {
    adapter: Arc<dyn TransmissionAdapter>,
    route_table: Arc<RwLock<RouteTable>>,
    kinds: Vec<TransportKind>,
}

impl DiscoveryService {
    /// Probe every transport kind
    pub fn new(adapter: Arc<dyn TransmissionAdapter>, route_table: Arc<RwLock<RouteTable>>) -> Self {
        Self::with_kinds(adapter, route_table, TransportKind::ALL.to_vec())
    }

    /// Probe only the given transport kinds
    pub fn with_kinds(
        adapter: Arc<dyn TransmissionAdapter>,
        route_table: Arc<RwLock<RouteTable>>,
        kinds: Vec<TransportKind>,
    ) -> Self {
        Self {
            adapter,
            route_table,
            kinds,
        }
    }

    pub fn kinds(&self) -> &[TransportKind] {
        &self.kinds
    }

    /// Run one discovery cycle
    pub async fn run_cycle(&self) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let mut links: Vec<Link> = Vec::new();

        for &kind in &self.kinds {
            report.probed += 1;

            let samples = match self.adapter.discover(kind).await {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("Discovery probe on {} failed: {}", kind, e);
                    report.failed.push(kind);
                    continue;
                }
            };

            for sample in samples {
                let neighbor = sample.neighbor.clone();
                match sample.into_link(kind) {
                    Ok(link) => links.push(link),
                    Err(e) => {
                        warn!("Skipping sample from {} on {}: {}", neighbor, kind, e);
                        report.samples_rejected += 1;
                    }
                }
            }
        }

        // Probing happens without the table lock; merging takes it once
        if !links.is_empty() {
            report.links_merged = self.route_table.write().await.merge(links);
        }

        debug!(
            "Discovery cycle: {} kinds probed, {} links merged, {} failed probes",
            report.probed,
            report.links_merged,
            report.failed.len()
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, RoutingError};
    use crate::transport::{NeighborSample, TransmitOutcome};
    use wandermesh_protocol::{Message, NodeId};

    struct FixedProbe;

    #[async_trait::async_trait]
    impl TransmissionAdapter for FixedProbe {
        async fn discover(&self, kind: TransportKind) -> Result<Vec<NeighborSample>> {
            match kind {
                TransportKind::Wifi => Ok(vec![
                    NeighborSample {
                        neighbor: NodeId::from("b"),
                        signal_quality: 0.8,
                        latency_ms: 20.0,
                        cost_weight: 1.0,
                    },
                    NeighborSample {
                        neighbor: NodeId::from("bad"),
                        signal_quality: 1.5,
                        latency_ms: 20.0,
                        cost_weight: 1.0,
                    },
                ]),
                TransportKind::LoRa => Err(RoutingError::DiscoveryFailed {
                    kind,
                    reason: "radio offline".to_string(),
                }),
                TransportKind::Mesh => Ok(vec![NeighborSample {
                    neighbor: NodeId::from("b"),
                    signal_quality: 0.4,
                    latency_ms: 5.0,
                    cost_weight: 0.5,
                }]),
                _ => Ok(Vec::new()),
            }
        }

        async fn transmit(&self, _message: &Message, _link: &Link) -> TransmitOutcome {
            TransmitOutcome::failed(0.0)
        }
    }

    #[tokio::test]
    async fn test_failed_probe_does_not_stop_cycle() {
        let table = Arc::new(RwLock::new(RouteTable::new()));
        let service = DiscoveryService::new(Arc::new(FixedProbe), table.clone());

        let report = service.run_cycle().await;
        assert_eq!(report.probed, TransportKind::ALL.len());
        assert_eq!(report.failed, vec![TransportKind::LoRa]);
        assert_eq!(report.links_merged, 2);
        assert_eq!(report.samples_rejected, 1);

        let table = table.read().await;
        assert_eq!(table.neighbor_count(), 1);
        assert_eq!(table.get(&NodeId::from("b")).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_cycles_replace_rather_than_append() {
        let table = Arc::new(RwLock::new(RouteTable::new()));
        let service = DiscoveryService::with_kinds(
            Arc::new(FixedProbe),
            table.clone(),
            vec![TransportKind::Wifi],
        );

        service.run_cycle().await;
        table
            .write()
            .await
            .mark_unavailable(&NodeId::from("b"), TransportKind::Wifi);
        service.run_cycle().await;

        let table = table.read().await;
        assert_eq!(table.link_count(), 1);
        assert_eq!(table.available_links().count(), 1);
    }
}
