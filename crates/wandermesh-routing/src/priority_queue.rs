//! Pending message queue for the forwarding engine

use std::collections::{BTreeMap, VecDeque};
use wandermesh_protocol::{now_ms, Message, Priority};

use crate::DEFAULT_QUEUE_CAPACITY;

/// How a message entered the pending queue at this node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOrigin {
    /// Submitted locally or received from a neighbor
    Ingress,
    /// Put back after "no route" or a failed transmission
    Retry,
    /// Produced here by the cloning controller
    Clone,
}

/// Message with queueing metadata
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// The message
    pub message: Message,

    /// How the entry was queued
    pub origin: QueueOrigin,

    /// When the entry was queued (unix milliseconds)
    pub enqueued_at_ms: u64,

    /// Local retries so far for this instance
    pub attempts: u32,
}

impl QueuedMessage {
    /// Create a new queued message
    pub fn new(message: Message, origin: QueueOrigin) -> Self {
        QueuedMessage {
            message,
            origin,
            enqueued_at_ms: now_ms(),
            attempts: 0,
        }
    }

    /// Re-wrap a message for another local turn
    pub fn retry(message: Message, previous_attempts: u32) -> Self {
        QueuedMessage {
            attempts: previous_attempts.saturating_add(1),
            ..Self::new(message, QueueOrigin::Retry)
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingQueueStats {
    /// Entry count per priority, highest first
    pub by_priority: Vec<(Priority, usize)>,
    pub total: usize,
    pub capacity: usize,
}

/// Priority-ordered, FIFO-within-priority pending queue with a total capacity
#[derive(Debug)]
pub struct PendingQueue {
    queues: BTreeMap<Priority, VecDeque<QueuedMessage>>,
    capacity: usize,
    total_messages: usize,
}

impl PendingQueue {
    /// Create a new queue holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        PendingQueue {
            queues: BTreeMap::new(),
            capacity,
            total_messages: 0,
        }
    }

    /// Enqueue an entry, handing it back if the queue is full
    pub fn enqueue(&mut self, entry: QueuedMessage) -> Result<(), QueuedMessage> {
        if self.total_messages >= self.capacity {
            return Err(entry);
        }

        self.queues
            .entry(entry.message.priority)
            .or_default()
            .push_back(entry);
        self.total_messages += 1;
        Ok(())
    }

    /// Dequeue the oldest entry of the highest priority
    pub fn dequeue(&mut self) -> Option<QueuedMessage> {
        let mut level = self.queues.last_entry()?;
        let entry = level.get_mut().pop_front();
        if level.get().is_empty() {
            level.remove();
        }
        if entry.is_some() {
            self.total_messages -= 1;
        }
        entry
    }

    pub fn len(&self) -> usize {
        self.total_messages
    }

    pub fn is_empty(&self) -> bool {
        self.total_messages == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entry counts per priority
    pub fn stats(&self) -> PendingQueueStats {
        PendingQueueStats {
            by_priority: self
                .queues
                .iter()
                .rev()
                .map(|(priority, queue)| (*priority, queue.len()))
                .collect(),
            total: self.total_messages,
            capacity: self.capacity,
        }
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
