//! Route table of discovered neighbor links
//!
//! Holds at most one live [`Link`] per (neighbor, transport kind) pair.
//! Neighbors are kept in first-seen order so that scoring ties resolve
//! deterministically.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use wandermesh_protocol::{now_ms, NodeId, TransportKind};

use crate::error::{Result, RoutingError};

/// A directed link candidate to a neighbor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Transport category of this link
    pub transport: TransportKind,
    /// Next-hop node
    pub neighbor: NodeId,
    /// Normalized signal quality in (0.0, 1.0]
    pub signal_quality: f64,
    /// Latency estimate (milliseconds)
    pub latency_ms: f64,
    /// Relative expense multiplier (power, money, contention)
    pub cost_weight: f64,
    /// Cleared on observed failure, restored by discovery
    pub available: bool,
    /// When discovery last refreshed this link (unix milliseconds)
    pub refreshed_at_ms: u64,
}

impl Link {
    /// Create an available link, validating the quality metrics
    pub fn new(
        neighbor: NodeId,
        transport: TransportKind,
        signal_quality: f64,
        latency_ms: f64,
        cost_weight: f64,
    ) -> Result<Self> {
        if !(signal_quality > 0.0 && signal_quality <= 1.0) {
            return Err(RoutingError::InvalidLink(format!(
                "signal quality {} outside (0, 1] for {} via {}",
                signal_quality, neighbor, transport
            )));
        }
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(RoutingError::InvalidLink(format!(
                "latency {} must be a non-negative number",
                latency_ms
            )));
        }
        if !cost_weight.is_finite() || cost_weight < 0.0 {
            return Err(RoutingError::InvalidLink(format!(
                "cost weight {} must be a non-negative number",
                cost_weight
            )));
        }

        Ok(Link {
            transport,
            neighbor,
            signal_quality,
            latency_ms,
            cost_weight,
            available: true,
            refreshed_at_ms: now_ms(),
        })
    }
}

#[derive(Debug, Clone)]
struct NeighborLinks {
    neighbor: NodeId,
    links: Vec<Link>,
}

/// Route table statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteTableStats {
    pub neighbors: usize,
    pub links: usize,
    pub available_links: usize,
}

/// Per-neighbor set of discovered links
#[derive(Debug, Default)]
pub struct RouteTable {
    /// Neighbors in first-seen order
    entries: Vec<NeighborLinks>,
    /// Neighbor -> position in `entries`
    index: HashMap<NodeId, usize>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a link, replacing any prior link for the same (neighbor, kind) pair
    pub fn insert(&mut self, link: Link) {
        let position = match self.index.get(&link.neighbor) {
            Some(&position) => position,
            None => {
                let position = self.entries.len();
                self.index.insert(link.neighbor.clone(), position);
                self.entries.push(NeighborLinks {
                    neighbor: link.neighbor.clone(),
                    links: Vec::new(),
                });
                position
            }
        };

        let entry = &mut self.entries[position];
        entry.links.retain(|existing| existing.transport != link.transport);
        entry.links.push(link);
    }

    /// Merge a discovery snapshot. Pairs not present in `links` are left untouched.
    pub fn merge(&mut self, links: impl IntoIterator<Item = Link>) -> usize {
        let mut merged = 0;
        for link in links {
            self.insert(link);
            merged += 1;
        }
        merged
    }

    /// Mark a link unavailable after a failed transmission
    ///
    /// Returns false if no such link exists.
    pub fn mark_unavailable(&mut self, neighbor: &NodeId, transport: TransportKind) -> bool {
        let Some(&position) = self.index.get(neighbor) else {
            return false;
        };

        match self.entries[position]
            .links
            .iter_mut()
            .find(|link| link.transport == transport)
        {
            Some(link) => {
                link.available = false;
                true
            }
            None => false,
        }
    }

    /// Links to a specific neighbor
    pub fn get(&self, neighbor: &NodeId) -> Option<&[Link]> {
        self.index
            .get(neighbor)
            .map(|&position| self.entries[position].links.as_slice())
    }

    /// Link for a specific (neighbor, kind) pair
    pub fn get_link(&self, neighbor: &NodeId, transport: TransportKind) -> Option<&Link> {
        self.get(neighbor)?
            .iter()
            .find(|link| link.transport == transport)
    }

    /// All links, neighbors in first-seen order
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.entries.iter().flat_map(|entry| entry.links.iter())
    }

    /// Links currently eligible for scoring
    pub fn available_links(&self) -> impl Iterator<Item = &Link> {
        self.links().filter(|link| link.available)
    }

    /// Known neighbors in first-seen order
    pub fn neighbors(&self) -> impl Iterator<Item = &NodeId> {
        self.entries.iter().map(|entry| &entry.neighbor)
    }

    pub fn neighbor_count(&self) -> usize {
        self.entries.len()
    }

    pub fn link_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.links.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> RouteTableStats {
        RouteTableStats {
            neighbors: self.neighbor_count(),
            links: self.link_count(),
            available_links: self.available_links().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(neighbor: &str, kind: TransportKind, signal: f64) -> Link {
        Link::new(NodeId::from(neighbor), kind, signal, 50.0, 1.0).unwrap()
    }

    #[test]
    fn test_link_validation() {
        let n = NodeId::from("n");
        assert!(Link::new(n.clone(), TransportKind::Wifi, 1.0, 0.0, 0.0).is_ok());
        assert!(Link::new(n.clone(), TransportKind::Wifi, 0.0, 10.0, 1.0).is_err());
        assert!(Link::new(n.clone(), TransportKind::Wifi, 1.2, 10.0, 1.0).is_err());
        assert!(Link::new(n.clone(), TransportKind::Wifi, 0.5, -1.0, 1.0).is_err());
        assert!(Link::new(n.clone(), TransportKind::Wifi, 0.5, f64::NAN, 1.0).is_err());
        assert!(Link::new(n, TransportKind::Wifi, 0.5, 10.0, -0.1).is_err());
    }

    #[test]
    fn test_refresh_replaces_same_pair() {
        let mut table = RouteTable::new();
        table.insert(link("b", TransportKind::Wifi, 0.4));
        table.insert(link("b", TransportKind::Bluetooth, 0.6));
        table.insert(link("b", TransportKind::Wifi, 0.9));

        let links = table.get(&NodeId::from("b")).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(table.link_count(), 2);

        let wifi = table.get_link(&NodeId::from("b"), TransportKind::Wifi).unwrap();
        assert_eq!(wifi.signal_quality, 0.9);
    }

    #[test]
    fn test_merge_leaves_unobserved_pairs() {
        let mut table = RouteTable::new();
        table.merge(vec![
            link("b", TransportKind::Wifi, 0.4),
            link("c", TransportKind::LoRa, 0.3),
        ]);
        table.mark_unavailable(&NodeId::from("c"), TransportKind::LoRa);

        let merged = table.merge(vec![link("b", TransportKind::Wifi, 0.8)]);
        assert_eq!(merged, 1);

        // c was not observed this cycle: untouched, still unavailable
        let c = table.get_link(&NodeId::from("c"), TransportKind::LoRa).unwrap();
        assert!(!c.available);
        assert_eq!(table.neighbor_count(), 2);
    }

    #[test]
    fn test_refresh_restores_availability() {
        let mut table = RouteTable::new();
        table.insert(link("b", TransportKind::Wifi, 0.4));
        assert!(table.mark_unavailable(&NodeId::from("b"), TransportKind::Wifi));
        assert_eq!(table.available_links().count(), 0);

        table.insert(link("b", TransportKind::Wifi, 0.4));
        assert_eq!(table.available_links().count(), 1);
    }

    #[test]
    fn test_mark_unavailable_unknown_link() {
        let mut table = RouteTable::new();
        table.insert(link("b", TransportKind::Wifi, 0.4));

        assert!(!table.mark_unavailable(&NodeId::from("x"), TransportKind::Wifi));
        assert!(!table.mark_unavailable(&NodeId::from("b"), TransportKind::Radio));
    }

    #[test]
    fn test_first_seen_order() {
        let mut table = RouteTable::new();
        table.insert(link("c", TransportKind::Wifi, 0.4));
        table.insert(link("a", TransportKind::Wifi, 0.4));
        table.insert(link("b", TransportKind::Wifi, 0.4));
        table.insert(link("c", TransportKind::Wifi, 0.5));

        let order: Vec<&str> = table.neighbors().map(|n| n.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_stats() {
        let mut table = RouteTable::new();
        assert!(table.is_empty());

        table.insert(link("a", TransportKind::Wifi, 0.4));
        table.insert(link("a", TransportKind::Mesh, 0.4));
        table.insert(link("b", TransportKind::Wifi, 0.4));
        table.mark_unavailable(&NodeId::from("a"), TransportKind::Mesh);

        assert_eq!(
            table.stats(),
            RouteTableStats {
                neighbors: 2,
                links: 3,
                available_links: 2,
            }
        );
    }
}
