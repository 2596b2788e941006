//! Bounded message cloning
//!
//! A clone shares the logical identity of its parent (id, endpoints, content,
//! priority) but is an independent queue entry with a reduced hop budget.

use tracing::debug;
use wandermesh_protocol::{Message, NodeId, MAX_CLONES};

/// Cloning parameters
#[derive(Debug, Clone)]
pub struct CloneConfig {
    /// Derivation cap (clamped to the protocol maximum)
    pub max_clones: u8,
    /// Hops taken off the parent's TTL
    pub ttl_reduction: u32,
    /// Minimum TTL a clone starts with
    pub ttl_floor: u32,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            max_clones: MAX_CLONES,
            ttl_reduction: 10,
            ttl_floor: 20,
        }
    }
}

/// Produces derived messages for alternate-path exploration
#[derive(Debug, Clone, Default)]
pub struct CloneController {
    config: CloneConfig,
}

impl CloneController {
    pub fn new(mut config: CloneConfig) -> Self {
        config.max_clones = config.max_clones.min(MAX_CLONES);
        Self { config }
    }

    pub fn config(&self) -> &CloneConfig {
        &self.config
    }

    /// Whether `message` may still be cloned
    pub fn can_clone(&self, message: &Message) -> bool {
        message.clone_count < self.config.max_clones
    }

    /// TTL a clone of `parent` starts with
    pub fn clone_ttl(&self, parent: &Message) -> u32 {
        parent
            .ttl
            .saturating_sub(self.config.ttl_reduction)
            .max(self.config.ttl_floor)
    }

    /// Derive a clone at `current_node`, or `None` when the cap is reached
    pub fn derive(&self, parent: &Message, current_node: &NodeId) -> Option<Message> {
        debug_assert!(
            parent.clone_count <= MAX_CLONES,
            "clone count {} above cap",
            parent.clone_count
        );

        if !self.can_clone(parent) {
            debug!(
                "Message {} at clone cap ({}), no clone produced",
                parent.id, parent.clone_count
            );
            return None;
        }

        let mut clone = parent.clone();
        clone.ttl = self.clone_ttl(parent);
        clone.clone_count = parent.clone_count + 1;
        clone.learning.add_hint(current_node.clone());

        debug!(
            "Cloned message {} at {} (clone {}/{}, ttl {})",
            clone.id, current_node, clone.clone_count, self.config.max_clones, clone.ttl
        );

        Some(clone)
    }
}
