//! In-process simulated transport
//!
//! All nodes of a simulation share one [`SimulatedNetwork`]. Each node gets a
//! [`SimulatedTransport`] handle for routing and an inbox receiver for
//! messages handed to it by neighbors. Probes see topology edges with a
//! configurable probability and jittered metrics; transmissions take the
//! link's latency and succeed with probability `signal * 0.8 + 0.2`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, trace};
use wandermesh_protocol::{Message, NodeId, TransportKind};
use wandermesh_routing::{Link, NeighborSample, TransmissionAdapter, TransmitOutcome};

use crate::error::{NetworkError, Result};
use crate::topology::{LinkProfile, Topology};

/// Smallest signal quality a jittered probe reports
const MIN_SIGNAL: f64 = 0.01;

/// Simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Probability that a probe sees an existing edge
    pub visibility: f64,
    /// Relative jitter applied to probed signal and latency
    pub jitter: f64,
    /// Multiplier from link latency (ms) to simulated wait (ms)
    pub latency_scale: f64,
    /// RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            visibility: 0.7,
            jitter: 0.1,
            latency_scale: 1.0,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Reject parameters the simulated network cannot honor
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.visibility) {
            return Err(NetworkError::InvalidSimulation(format!(
                "visibility {} outside [0, 1]",
                self.visibility
            )));
        }
        if !self.jitter.is_finite() || !(0.0..1.0).contains(&self.jitter) {
            return Err(NetworkError::InvalidSimulation(format!(
                "jitter {} outside [0, 1)",
                self.jitter
            )));
        }
        if !self.latency_scale.is_finite() || self.latency_scale < 0.0 {
            return Err(NetworkError::InvalidSimulation(format!(
                "latency scale {} must be finite and non-negative",
                self.latency_scale
            )));
        }
        Ok(())
    }
}

/// Probability a transmission over a link of the given signal succeeds
pub fn success_probability(signal_quality: f64) -> f64 {
    (signal_quality * 0.8 + 0.2).clamp(0.0, 1.0)
}

/// Shared in-process "ether"
pub struct SimulatedNetwork {
    config: SimulationConfig,
    topology: RwLock<Topology>,
    inboxes: RwLock<HashMap<NodeId, mpsc::UnboundedSender<Message>>>,
    failing_probes: RwLock<HashSet<(NodeId, TransportKind)>>,
    rng: Mutex<StdRng>,
}

impl SimulatedNetwork {
    pub fn new(topology: Topology, config: SimulationConfig) -> Arc<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Arc::new(Self {
            config,
            topology: RwLock::new(topology),
            inboxes: RwLock::new(HashMap::new()),
            failing_probes: RwLock::new(HashSet::new()),
            rng: Mutex::new(rng),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Attach a node, returning its transport handle and inbox
    pub async fn attach(
        self: &Arc<Self>,
        node_id: NodeId,
    ) -> Result<(SimulatedTransport, mpsc::UnboundedReceiver<Message>)> {
        let mut inboxes = self.inboxes.write().await;
        if inboxes.contains_key(&node_id) {
            return Err(NetworkError::NodeAlreadyAttached(node_id));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inboxes.insert(node_id.clone(), tx);
        debug!("Attached {} to simulated network", node_id);

        Ok((
            SimulatedTransport {
                node_id,
                network: Arc::clone(self),
            },
            rx,
        ))
    }

    /// Detach a node. Transmissions to it fail afterwards.
    pub async fn detach(&self, node_id: &NodeId) -> Result<()> {
        self.inboxes
            .write()
            .await
            .remove(node_id)
            .map(|_| ())
            .ok_or_else(|| NetworkError::UnknownNode(node_id.clone()))
    }

    pub async fn is_attached(&self, node_id: &NodeId) -> bool {
        self.inboxes.read().await.contains_key(node_id)
    }

    /// Add or replace a link at runtime
    pub async fn connect(&self, a: NodeId, b: NodeId, kind: TransportKind, profile: LinkProfile) {
        info!("Simulated link {} <-> {} via {} up", a, b, kind);
        self.topology.write().await.connect(a, b, kind, profile);
    }

    /// Remove a link at runtime
    pub async fn disconnect(&self, a: &NodeId, b: &NodeId, kind: TransportKind) -> bool {
        let removed = self.topology.write().await.disconnect(a, b, kind);
        if removed {
            info!("Simulated link {} <-> {} via {} down", a, b, kind);
        }
        removed
    }

    /// Make probes of `kind` from `node_id` fail (or recover)
    pub async fn set_probe_failure(&self, node_id: NodeId, kind: TransportKind, failing: bool) {
        let mut failing_probes = self.failing_probes.write().await;
        if failing {
            failing_probes.insert((node_id, kind));
        } else {
            failing_probes.remove(&(node_id, kind));
        }
    }

    async fn probe(&self, node_id: &NodeId, kind: TransportKind) -> Result<Vec<NeighborSample>> {
        if self
            .failing_probes
            .read()
            .await
            .contains(&(node_id.clone(), kind))
        {
            return Err(NetworkError::ProbeFailed {
                kind,
                reason: "interface unavailable".to_string(),
            });
        }

        let candidates = self.topology.read().await.neighbors_of(node_id, kind);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let visibility = self.config.visibility.clamp(0.0, 1.0);
        let jitter = self.config.jitter.abs();
        let mut rng = self.rng.lock().await;

        let mut samples = Vec::new();
        for (neighbor, profile) in candidates {
            if !rng.gen_bool(visibility) {
                continue;
            }

            let (signal_factor, latency_factor) = if jitter > 0.0 {
                (
                    1.0 + rng.gen_range(-jitter..=jitter),
                    1.0 + rng.gen_range(-jitter..=jitter),
                )
            } else {
                (1.0, 1.0)
            };

            samples.push(NeighborSample {
                neighbor,
                signal_quality: (profile.signal_quality * signal_factor).clamp(MIN_SIGNAL, 1.0),
                latency_ms: (profile.latency_ms * latency_factor).max(0.0),
                cost_weight: profile.cost_weight,
            });
        }

        trace!("{} sees {} neighbors on {}", node_id, samples.len(), kind);
        Ok(samples)
    }

    async fn deliver(&self, from: &NodeId, message: &Message, link: &Link) -> Result<()> {
        if self
            .topology
            .read()
            .await
            .profile(from, &link.neighbor, link.transport)
            .is_none()
        {
            return Err(NetworkError::SendFailed(format!(
                "no {} link between {} and {}",
                link.transport, from, link.neighbor
            )));
        }

        let wait_ms = link.latency_ms * self.config.latency_scale;
        if wait_ms > 0.0 {
            let wait = Duration::try_from_secs_f64(wait_ms / 1000.0).map_err(|e| {
                NetworkError::SendFailed(format!("unusable link latency {} ms: {}", wait_ms, e))
            })?;
            tokio::time::sleep(wait).await;
        }

        let success = {
            let mut rng = self.rng.lock().await;
            rng.gen_bool(success_probability(link.signal_quality))
        };
        if !success {
            return Err(NetworkError::SendFailed(format!(
                "{} lost in transit to {}",
                message.id, link.neighbor
            )));
        }

        // Hand over a decoded copy, as a real radio would
        let bytes = message.to_bytes()?;
        let received = Message::from_bytes(&bytes)?;

        let inboxes = self.inboxes.read().await;
        let inbox = inboxes
            .get(&link.neighbor)
            .ok_or_else(|| NetworkError::UnknownNode(link.neighbor.clone()))?;
        inbox
            .send(received)
            .map_err(|_| NetworkError::SendFailed(format!("{} inbox closed", link.neighbor)))
    }
}

/// One node's view of the simulated network
#[derive(Clone)]
pub struct SimulatedTransport {
    node_id: NodeId,
    network: Arc<SimulatedNetwork>,
}

impl SimulatedTransport {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn network(&self) -> Arc<SimulatedNetwork> {
        Arc::clone(&self.network)
    }
}

#[async_trait::async_trait]
impl TransmissionAdapter for SimulatedTransport {
    async fn discover(&self, kind: TransportKind) -> wandermesh_routing::Result<Vec<NeighborSample>> {
        Ok(self.network.probe(&self.node_id, kind).await?)
    }

    async fn transmit(&self, message: &Message, link: &Link) -> TransmitOutcome {
        let started = Instant::now();
        let result = self.network.deliver(&self.node_id, message, link).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(()) => TransmitOutcome::delivered(elapsed_ms),
            Err(e) => {
                debug!("{} -> {} failed: {}", self.node_id, link.neighbor, e);
                TransmitOutcome::failed(elapsed_ms)
            }
        }
    }
}
