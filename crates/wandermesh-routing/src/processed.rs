//! Processed-message memory
//!
//! Per-node set of message identifiers already routed from here. The whole
//! set is cleared on a fixed interval, so a message may be processed again
//! once the window has passed.

use std::collections::HashSet;
use wandermesh_protocol::MessageId;

/// Time-windowed loop breaker
#[derive(Debug, Default)]
pub struct ProcessedMemory {
    seen: HashSet<MessageId>,
    /// Number of full clears performed
    generation: u64,
}

impl ProcessedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a message has been processed at this node
    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    /// Mark a message as processed. Returns true if it was not already present.
    pub fn mark(&mut self, id: MessageId) -> bool {
        self.seen.insert(id)
    }

    /// Forget everything, returning how many identifiers were dropped
    pub fn clear(&mut self) -> usize {
        let cleared = self.seen.len();
        self.seen.clear();
        self.generation += 1;
        cleared
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
