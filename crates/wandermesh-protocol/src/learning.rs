//! Per-message route learning state
//!
//! A message carries its own record of which transports and next hops worked
//! or failed along its journey. Scoring at later hops reads this record to bias
//! link selection, so the state travels with the payload rather than living in
//! any node.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{NodeId, TransportKind};

/// One transmission attempt as seen by the message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteObservation {
    /// Transport used for the attempt
    pub transport: TransportKind,
    /// Neighbor the message was handed to
    pub next_hop: NodeId,
    /// Link signal quality at send time (0.0, 1.0]
    pub signal_quality: f64,
    /// Link latency estimate at send time (milliseconds)
    pub latency_ms: f64,
    /// When the attempt completed (unix milliseconds)
    pub observed_at_ms: u64,
}

/// Learning record carried inside every message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    /// Successful transmissions, oldest first
    pub successful_routes: Vec<RouteObservation>,
    /// Failed transmissions, oldest first
    pub failed_routes: Vec<RouteObservation>,
    /// Accumulated success count per transport kind
    pub preferences: BTreeMap<TransportKind, u32>,
    /// Nodes that spawned a clone of this message
    pub destination_hints: Vec<NodeId>,
}

impl LearningRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful transmission and strengthen the transport preference
    pub fn record_success(&mut self, observation: RouteObservation) {
        let count = self.preferences.entry(observation.transport).or_insert(0);
        *count = count.saturating_add(1);
        self.successful_routes.push(observation);
    }

    /// Record a failed transmission
    pub fn record_failure(&mut self, observation: RouteObservation) {
        self.failed_routes.push(observation);
    }

    /// Accumulated preference for a transport kind (0 when never used)
    pub fn preference(&self, kind: TransportKind) -> u32 {
        self.preferences.get(&kind).copied().unwrap_or(0)
    }

    /// Whether any transport preference has been learned
    pub fn has_preferences(&self) -> bool {
        !self.preferences.is_empty()
    }

    /// Whether a failure against `neighbor` was recorded within `window_ms` of `now_ms`
    pub fn failed_recently(&self, neighbor: &NodeId, now_ms: u64, window_ms: u64) -> bool {
        self.failed_routes.iter().any(|failure| {
            &failure.next_hop == neighbor
                && now_ms.saturating_sub(failure.observed_at_ms) < window_ms
        })
    }

    /// Append a node to the clone hint trail
    pub fn add_hint(&mut self, node: NodeId) {
        self.destination_hints.push(node);
    }
}
