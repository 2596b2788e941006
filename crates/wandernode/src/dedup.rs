//! Delivery deduplication
//!
//! Clones of one message can each reach this node. The application hands a
//! payload to a delivery channel only for the first arrival of an id within
//! the retention window. The cache is bounded: oldest ids are evicted first.

use std::collections::{HashMap, VecDeque};
use wandermesh_protocol::MessageId;

/// Bounded, time-windowed set of message ids already handed off
#[derive(Debug)]
pub struct DeliveryDedup {
    /// Message id to hand-off time (unix milliseconds)
    entries: HashMap<MessageId, u64>,

    /// Ids in hand-off order, oldest first
    order: VecDeque<MessageId>,

    max_size: usize,

    ttl_ms: u64,
}

impl DeliveryDedup {
    pub fn new(max_size: usize, ttl_ms: u64) -> Self {
        let max_size = max_size.max(1);
        DeliveryDedup {
            entries: HashMap::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size,
            ttl_ms,
        }
    }

    /// Record `id` as handed off at `now_ms`. False when it already was.
    pub fn first_arrival(&mut self, id: MessageId, now_ms: u64) -> bool {
        self.cleanup_expired(now_ms);

        if self.entries.contains_key(&id) {
            return false;
        }

        if self.entries.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(id, now_ms);
        self.order.push_back(id);
        true
    }

    /// Forget ids older than the retention window
    pub fn cleanup_expired(&mut self, now_ms: u64) -> usize {
        let mut removed = 0;
        while let Some(oldest) = self.order.front() {
            let expired = self
                .entries
                .get(oldest)
                .map_or(true, |&seen_at| now_ms.saturating_sub(seen_at) >= self.ttl_ms);
            if !expired {
                break;
            }
            if let Some(id) = self.order.pop_front() {
                self.entries.remove(&id);
            }
            removed += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
