//! In-process multi-node simulation
//!
//! Builds a chain of nodes over the simulated network. Adjacent nodes are
//! linked by a transport kind picked round-robin; every few nodes a weaker
//! long-range radio shortcut skips one hop.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::node::Node;

use wandermesh_network::{ChannelRegistry, LinkProfile, SimulatedNetwork, Topology};
use wandermesh_protocol::{MessageId, NodeId, Priority, TransportKind};
use wandermesh_routing::{EngineStats, TransmissionAdapter};

/// Transport kinds used for chain links, in rotation
const CHAIN_KINDS: [TransportKind; 4] = [
    TransportKind::Wifi,
    TransportKind::Bluetooth,
    TransportKind::Mesh,
    TransportKind::LoRa,
];

/// Typical quality of a link of the given kind
fn chain_profile(kind: TransportKind) -> Result<LinkProfile> {
    let (signal, latency, cost) = match kind {
        TransportKind::Wifi => (0.9, 20.0, 1.0),
        TransportKind::Bluetooth => (0.8, 40.0, 0.8),
        TransportKind::Mesh => (0.95, 10.0, 1.2),
        TransportKind::LoRa => (0.6, 250.0, 0.5),
        TransportKind::Cellular => (0.85, 80.0, 2.0),
        TransportKind::Acoustic => (0.3, 400.0, 1.0),
        TransportKind::Light => (0.7, 5.0, 0.5),
        TransportKind::Radio => (0.4, 400.0, 2.0),
    };
    Ok(LinkProfile::new(signal, latency, cost)?)
}

/// Ids for a simulation of `count` nodes
pub fn node_ids(prefix: &str, count: usize) -> Vec<NodeId> {
    (0..count)
        .map(|i| NodeId::new(format!("{}_{:02}", prefix, i)))
        .collect()
}

/// Chain topology with optional shortcuts every `shortcut_every` nodes
pub fn chain_topology(ids: &[NodeId], shortcut_every: usize) -> Result<Topology> {
    let mut topology = Topology::new();

    for (i, pair) in ids.windows(2).enumerate() {
        let kind = CHAIN_KINDS[i % CHAIN_KINDS.len()];
        topology.connect(pair[0].clone(), pair[1].clone(), kind, chain_profile(kind)?);
    }

    if shortcut_every > 0 {
        for i in (0..ids.len()).step_by(shortcut_every) {
            if i + 2 < ids.len() {
                topology.connect(
                    ids[i].clone(),
                    ids[i + 2].clone(),
                    TransportKind::Radio,
                    chain_profile(TransportKind::Radio)?,
                );
            }
        }
    }

    Ok(topology)
}

/// A set of running nodes sharing one simulated network
pub struct Simulation {
    network: Arc<SimulatedNetwork>,
    ids: Vec<NodeId>,
    nodes: HashMap<NodeId, Node>,
}

impl Simulation {
    /// Build a chain of `count` nodes, each handing deliveries to `channels`
    pub async fn chain(config: &Config, count: usize, channels: ChannelRegistry) -> Result<Self> {
        if count < 2 {
            anyhow::bail!("A simulation needs at least 2 nodes, got {}", count);
        }

        let ids = node_ids(&config.node.name_prefix, count);
        let topology = chain_topology(&ids, config.network.shortcut_every)?;
        info!(
            "Building simulation: {} nodes, {} links",
            ids.len(),
            topology.edge_count()
        );

        let network = SimulatedNetwork::new(topology, config.network.simulation.clone());

        let mut nodes = HashMap::new();
        for id in &ids {
            let (transport, inbox) = network
                .attach(id.clone())
                .await
                .with_context(|| format!("Failed to attach {}", id))?;
            let transport: Arc<dyn TransmissionAdapter> = Arc::new(transport);
            let node = Node::new(id.clone(), config, transport, inbox, channels.clone());
            nodes.insert(id.clone(), node);
        }

        Ok(Self {
            network,
            ids,
            nodes,
        })
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn network(&self) -> Arc<SimulatedNetwork> {
        Arc::clone(&self.network)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub async fn start(&mut self) -> Result<()> {
        for id in &self.ids {
            if let Some(node) = self.nodes.get_mut(id) {
                node.start().await?;
            }
        }
        info!("✓ Simulation started");
        Ok(())
    }

    /// Send from one simulated node to another
    pub async fn send(
        &self,
        from: &NodeId,
        to: &NodeId,
        content: impl Into<Vec<u8>>,
        priority: Priority,
    ) -> Result<MessageId> {
        let node = self
            .nodes
            .get(from)
            .with_context(|| format!("Unknown node {}", from))?;
        node.send(to.clone(), content, priority).await
    }

    /// Per-node engine statistics in chain order
    pub async fn stats(&self) -> Vec<(NodeId, EngineStats)> {
        let mut stats = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            if let Some(node) = self.nodes.get(id) {
                stats.push((id.clone(), node.stats().await));
            }
        }
        stats
    }

    pub async fn shutdown(&mut self) {
        for id in &self.ids {
            if let Some(node) = self.nodes.get_mut(id) {
                node.shutdown().await;
            }
        }
        info!("Simulation stopped");
    }
}
