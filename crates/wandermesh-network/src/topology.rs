//! Simulated topology
//!
//! Symmetric edges between nodes, one per (pair, transport kind).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use wandermesh_protocol::{NodeId, TransportKind};

use crate::error::{NetworkError, Result};

/// Ground-truth quality of a simulated link
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkProfile {
    pub signal_quality: f64,
    pub latency_ms: f64,
    pub cost_weight: f64,
}

impl LinkProfile {
    pub fn new(signal_quality: f64, latency_ms: f64, cost_weight: f64) -> Result<Self> {
        if !(signal_quality > 0.0 && signal_quality <= 1.0) {
            return Err(NetworkError::InvalidProfile(format!(
                "signal quality {} outside (0, 1]",
                signal_quality
            )));
        }
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(NetworkError::InvalidProfile(format!(
                "latency {} must be non-negative",
                latency_ms
            )));
        }
        if !cost_weight.is_finite() || cost_weight < 0.0 {
            return Err(NetworkError::InvalidProfile(format!(
                "cost weight {} must be non-negative",
                cost_weight
            )));
        }

        Ok(Self {
            signal_quality,
            latency_ms,
            cost_weight,
        })
    }
}

#[derive(Debug, Clone)]
struct Edge {
    a: NodeId,
    b: NodeId,
    kind: TransportKind,
    profile: LinkProfile,
}

impl Edge {
    fn joins(&self, x: &NodeId, y: &NodeId) -> bool {
        (&self.a == x && &self.b == y) || (&self.a == y && &self.b == x)
    }

    fn other_end(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.a == node {
            Some(&self.b)
        } else if &self.b == node {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// Undirected multigraph of simulated links
#[derive(Debug, Clone, Default)]
pub struct Topology {
    edges: Vec<Edge>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link two nodes over `kind`, replacing any existing edge for that pair and kind
    pub fn connect(
        &mut self,
        a: impl Into<NodeId>,
        b: impl Into<NodeId>,
        kind: TransportKind,
        profile: LinkProfile,
    ) {
        let (a, b) = (a.into(), b.into());
        self.edges
            .retain(|edge| !(edge.kind == kind && edge.joins(&a, &b)));
        self.edges.push(Edge { a, b, kind, profile });
    }

    /// Remove the edge between two nodes on `kind`
    pub fn disconnect(&mut self, a: &NodeId, b: &NodeId, kind: TransportKind) -> bool {
        let before = self.edges.len();
        self.edges
            .retain(|edge| !(edge.kind == kind && edge.joins(a, b)));
        self.edges.len() != before
    }

    /// Profile of the edge between two nodes on `kind`
    pub fn profile(&self, a: &NodeId, b: &NodeId, kind: TransportKind) -> Option<LinkProfile> {
        self.edges
            .iter()
            .find(|edge| edge.kind == kind && edge.joins(a, b))
            .map(|edge| edge.profile)
    }

    /// Neighbors of `node` on `kind`, in insertion order
    pub fn neighbors_of(&self, node: &NodeId, kind: TransportKind) -> Vec<(NodeId, LinkProfile)> {
        self.edges
            .iter()
            .filter(|edge| edge.kind == kind)
            .filter_map(|edge| {
                edge.other_end(node)
                    .map(|other| (other.clone(), edge.profile))
            })
            .collect()
    }

    /// Every node touched by an edge
    pub fn nodes(&self) -> BTreeSet<NodeId> {
        self.edges
            .iter()
            .flat_map(|edge| [edge.a.clone(), edge.b.clone()])
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
