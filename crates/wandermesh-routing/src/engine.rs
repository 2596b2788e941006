//! Forwarding engine
//!
//! Drives one message through its per-hop state machine on each scheduling
//! turn:
//! - Arrived: destination is this node, delivered and retired
//! - Loop-detected: already processed here, a clone explores instead
//! - TTL-exhausted: dropped
//! - Route selection: no candidate link means spend a hop and requeue
//! - Transmitting: hand to the chosen link, requeue on failure
//!
//! Each turn owns exactly one queue entry. Locks on the queue, route table
//! and processed memory are never held across a transmission.

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use wandermesh_protocol::{
    now_ms, Message, MessageId, NodeId, Priority, RouteObservation, TransportKind,
};

use crate::cloning::{CloneConfig, CloneController};
use crate::error::{Result, RoutingError};
use crate::events::{DropReason, RoutingObserver};
use crate::priority_queue::{PendingQueue, PendingQueueStats, QueueOrigin, QueuedMessage};
use crate::processed::ProcessedMemory;
use crate::route_table::{Link, RouteTable};
use crate::scorer::{RouteScorer, ScorerConfig};
use crate::transport::TransmissionAdapter;
use crate::DEFAULT_QUEUE_CAPACITY;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pending queue capacity
    pub queue_capacity: usize,
    pub scorer: ScorerConfig,
    pub cloning: CloneConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            scorer: ScorerConfig::default(),
            cloning: CloneConfig::default(),
        }
    }
}

/// Engine statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub messages_processed: u64,
    pub delivered: u64,
    pub transmitted: u64,
    pub transmit_failures: u64,
    pub no_route_requeues: u64,
    pub loops_detected: u64,
    pub clones_created: u64,
    pub dropped_ttl: u64,
    pub dropped_clone_limit: u64,
    pub dropped_queue_full: u64,
    pub rejected_invalid: u64,
}

impl EngineStats {
    /// Total drops across all reasons
    pub fn dropped(&self) -> u64 {
        self.dropped_ttl + self.dropped_clone_limit + self.dropped_queue_full + self.rejected_invalid
    }
}

/// What happened to the entry handled in one scheduling turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Reached its destination at this node
    Delivered,
    /// Retired without delivery
    Dropped { reason: DropReason },
    /// Loop detected, a clone was queued in its place
    Cloned { clone_count: u8 },
    /// No available link, requeued with the remaining budget
    NoRoute { ttl: u32 },
    /// Handed to the next hop
    Transmitted {
        neighbor: NodeId,
        transport: TransportKind,
        score: f64,
    },
    /// Transmission failed, link marked unavailable and message requeued
    TransmitFailed {
        neighbor: NodeId,
        transport: TransportKind,
        ttl: u32,
    },
}

/// Store-and-forward engine for one node
pub struct ForwardingEngine {
    /// Node ID of this engine
    node_id: NodeId,

    /// Pending messages
    queue: Mutex<PendingQueue>,

    queue_capacity: usize,

    /// Discovered links, shared with the discovery loop
    route_table: Arc<RwLock<RouteTable>>,

    /// Message ids already routed from here
    processed: Arc<RwLock<ProcessedMemory>>,

    scorer: RouteScorer,

    cloner: CloneController,

    adapter: Arc<dyn TransmissionAdapter>,

    observer: Option<Arc<dyn RoutingObserver>>,

    stats: RwLock<EngineStats>,
}

impl ForwardingEngine {
    /// Create an engine with an empty route table
    pub fn new(node_id: NodeId, config: EngineConfig, adapter: Arc<dyn TransmissionAdapter>) -> Self {
        Self::with_route_table(
            node_id,
            config,
            adapter,
            Arc::new(RwLock::new(RouteTable::new())),
        )
    }

    /// Create an engine over an existing shared route table
    pub fn with_route_table(
        node_id: NodeId,
        config: EngineConfig,
        adapter: Arc<dyn TransmissionAdapter>,
        route_table: Arc<RwLock<RouteTable>>,
    ) -> Self {
        ForwardingEngine {
            node_id,
            queue: Mutex::new(PendingQueue::new(config.queue_capacity)),
            queue_capacity: config.queue_capacity,
            route_table,
            processed: Arc::new(RwLock::new(ProcessedMemory::new())),
            scorer: RouteScorer::new(config.scorer),
            cloner: CloneController::new(config.cloning),
            adapter,
            observer: None,
            stats: RwLock::new(EngineStats::default()),
        }
    }

    /// Install the delivery/drop hooks
    pub fn set_observer(&mut self, observer: Arc<dyn RoutingObserver>) {
        self.observer = Some(observer);
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Shared route table handle
    pub fn route_table(&self) -> Arc<RwLock<RouteTable>> {
        Arc::clone(&self.route_table)
    }

    /// Shared processed-memory handle
    pub fn processed(&self) -> Arc<RwLock<ProcessedMemory>> {
        Arc::clone(&self.processed)
    }

    /// Submit a new message originating at this node
    pub async fn send(
        &self,
        destination: NodeId,
        content: impl Into<Vec<u8>>,
        priority: Priority,
    ) -> Result<MessageId> {
        let message = Message::new(self.node_id.clone(), destination, content).with_priority(priority);
        let id = message.id;
        self.enqueue(message).await?;
        Ok(id)
    }

    /// Queue a message for routing
    pub async fn enqueue(&self, message: Message) -> Result<()> {
        if let Err(e) = message.validate() {
            warn!("Rejecting message {}: {}", message.id, e);
            self.drop_message(&message, DropReason::Invalid).await;
            return Err(e.into());
        }

        let entry = QueuedMessage::new(message, QueueOrigin::Ingress);
        let result = self.queue.lock().await.enqueue(entry);
        match result {
            Ok(()) => Ok(()),
            Err(rejected) => {
                self.drop_message(&rejected.message, DropReason::QueueFull).await;
                Err(RoutingError::QueueFull {
                    capacity: self.queue_capacity,
                })
            }
        }
    }

    /// Accept a message handed over by a neighbor
    pub async fn receive(&self, message: Message) -> Result<()> {
        debug!(
            "{} received message {} (path {}, ttl {})",
            self.node_id,
            message.id,
            message.path.len(),
            message.ttl
        );
        self.enqueue(message).await
    }

    /// Run one scheduling turn. `None` when the queue is empty.
    pub async fn process_next(&self) -> Option<TurnOutcome> {
        let entry = self.queue.lock().await.dequeue()?;
        self.stats.write().await.messages_processed += 1;

        let QueuedMessage {
            mut message,
            origin,
            attempts,
            ..
        } = entry;

        if message.is_for(&self.node_id) {
            return Some(self.deliver(message).await);
        }

        if origin == QueueOrigin::Ingress && self.processed.read().await.contains(&message.id) {
            return Some(self.handle_loop(message).await);
        }

        if message.ttl == 0 {
            self.drop_message(&message, DropReason::TtlExhausted).await;
            return Some(TurnOutcome::Dropped {
                reason: DropReason::TtlExhausted,
            });
        }

        self.processed.write().await.mark(message.id);

        let now = now_ms();
        let choice = {
            let table = self.route_table.read().await;
            self.scorer.select(&table, &message, now)
        };

        let Some(choice) = choice else {
            message.consume_hop();
            let ttl = message.ttl;
            debug!(
                "No route for message {} at {}, requeued (ttl {}, retry {})",
                message.id,
                self.node_id,
                ttl,
                attempts.saturating_add(1)
            );
            self.stats.write().await.no_route_requeues += 1;
            if !self.requeue(message, attempts).await {
                return Some(TurnOutcome::Dropped {
                    reason: DropReason::QueueFull,
                });
            }
            return Some(TurnOutcome::NoRoute { ttl });
        };

        Some(self.transmit(message, attempts, choice.link, choice.score).await)
    }

    /// Process until the queue is empty or `max_turns` turns have run
    pub async fn process_pending(&self, max_turns: usize) -> Vec<TurnOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..max_turns {
            match self.process_next().await {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }
        outcomes
    }

    async fn deliver(&self, mut message: Message) -> TurnOutcome {
        message.deliveries.insert(self.node_id.clone());

        let elapsed_ms = now_ms().saturating_sub(message.created_at_ms);
        info!(
            "Delivered message {} from {} to {} after {} hops ({} ms, clone {})",
            message.id,
            message.source,
            self.node_id,
            message.path.len().saturating_sub(1),
            elapsed_ms,
            message.clone_count
        );

        self.stats.write().await.delivered += 1;
        if let Some(observer) = &self.observer {
            observer.on_delivered(&message);
        }

        TurnOutcome::Delivered
    }

    async fn handle_loop(&self, message: Message) -> TurnOutcome {
        self.stats.write().await.loops_detected += 1;
        debug!("Loop detected for message {} at {}", message.id, self.node_id);

        let Some(clone) = self.cloner.derive(&message, &self.node_id) else {
            self.drop_message(&message, DropReason::CloneLimitReached).await;
            return TurnOutcome::Dropped {
                reason: DropReason::CloneLimitReached,
            };
        };

        let clone_count = clone.clone_count;
        let result = self
            .queue
            .lock()
            .await
            .enqueue(QueuedMessage::new(clone, QueueOrigin::Clone));

        match result {
            Ok(()) => {
                self.stats.write().await.clones_created += 1;
                TurnOutcome::Cloned { clone_count }
            }
            Err(rejected) => {
                self.drop_message(&rejected.message, DropReason::QueueFull).await;
                TurnOutcome::Dropped {
                    reason: DropReason::QueueFull,
                }
            }
        }
    }

    async fn transmit(
        &self,
        mut message: Message,
        attempts: u32,
        link: Link,
        score: f64,
    ) -> TurnOutcome {
        message.visit(&self.node_id);
        message.consume_hop();

        let observation = RouteObservation {
            transport: link.transport,
            next_hop: link.neighbor.clone(),
            signal_quality: link.signal_quality,
            latency_ms: link.latency_ms,
            observed_at_ms: now_ms(),
        };

        // Success is sealed into the copy that leaves this node
        let mut outbound = message.clone();
        outbound.record_outcome(observation.clone(), true);

        let outcome = self.adapter.transmit(&outbound, &link).await;

        if outcome.success {
            debug!(
                "Message {} sent {} -> {} via {} ({:.0} ms, ttl {})",
                message.id,
                self.node_id,
                link.neighbor,
                link.transport,
                outcome.observed_latency_ms,
                outbound.ttl
            );
            self.stats.write().await.transmitted += 1;
            return TurnOutcome::Transmitted {
                neighbor: link.neighbor,
                transport: link.transport,
                score,
            };
        }

        warn!(
            "Transmission of {} to {} via {} failed (retry {}, ttl {})",
            message.id,
            link.neighbor,
            link.transport,
            attempts.saturating_add(1),
            message.ttl
        );

        message.record_outcome(
            RouteObservation {
                observed_at_ms: now_ms(),
                ..observation
            },
            false,
        );
        self.route_table
            .write()
            .await
            .mark_unavailable(&link.neighbor, link.transport);
        self.stats.write().await.transmit_failures += 1;

        let ttl = message.ttl;
        if !self.requeue(message, attempts).await {
            return TurnOutcome::Dropped {
                reason: DropReason::QueueFull,
            };
        }

        TurnOutcome::TransmitFailed {
            neighbor: link.neighbor,
            transport: link.transport,
            ttl,
        }
    }

    /// Put a message back for another local turn. False if it had to be dropped.
    async fn requeue(&self, message: Message, attempts: u32) -> bool {
        let result = self
            .queue
            .lock()
            .await
            .enqueue(QueuedMessage::retry(message, attempts));

        match result {
            Ok(()) => true,
            Err(rejected) => {
                self.drop_message(&rejected.message, DropReason::QueueFull).await;
                false
            }
        }
    }

    async fn drop_message(&self, message: &Message, reason: DropReason) {
        info!(
            "Dropped message {} at {}: {}",
            message.id, self.node_id, reason
        );

        {
            let mut stats = self.stats.write().await;
            match reason {
                DropReason::TtlExhausted => stats.dropped_ttl += 1,
                DropReason::CloneLimitReached => stats.dropped_clone_limit += 1,
                DropReason::QueueFull => stats.dropped_queue_full += 1,
                DropReason::Invalid => stats.rejected_invalid += 1,
            }
        }

        if let Some(observer) = &self.observer {
            observer.on_dropped(message, reason);
        }
    }

    /// Clear processed-message memory, returning how many ids were forgotten
    pub async fn clear_processed(&self) -> usize {
        let cleared = self.processed.write().await.clear();
        debug!("{} cleared {} processed message ids", self.node_id, cleared);
        cleared
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Pending entries per priority
    pub async fn queue_stats(&self) -> PendingQueueStats {
        self.queue.lock().await.stats()
    }

    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RoutingEvent;
    use crate::transport::{NeighborSample, TransmitOutcome};
    use std::collections::VecDeque;
    use tokio::sync::mpsc;
    use wandermesh_protocol::ProtocolError;

    /// Adapter that replays scripted outcomes and records what it sent
    #[derive(Default)]
    struct ScriptedAdapter {
        outcomes: std::sync::Mutex<VecDeque<bool>>,
        sent: std::sync::Mutex<Vec<(Message, Link)>>,
    }

    impl ScriptedAdapter {
        fn with_outcomes(outcomes: &[bool]) -> Self {
            Self {
                outcomes: std::sync::Mutex::new(outcomes.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<(Message, Link)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl TransmissionAdapter for ScriptedAdapter {
        async fn discover(&self, _kind: TransportKind) -> Result<Vec<NeighborSample>> {
            Ok(Vec::new())
        }

        async fn transmit(&self, message: &Message, link: &Link) -> TransmitOutcome {
            self.sent.lock().unwrap().push((message.clone(), link.clone()));
            let success = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
            TransmitOutcome {
                success,
                observed_latency_ms: link.latency_ms,
            }
        }
    }

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn engine_with(adapter: Arc<ScriptedAdapter>) -> ForwardingEngine {
        ForwardingEngine::new(node("B"), EngineConfig::default(), adapter)
    }

    async fn add_link(engine: &ForwardingEngine, neighbor: &str, signal: f64, latency: f64) {
        let link = Link::new(node(neighbor), TransportKind::Wifi, signal, latency, 1.0).unwrap();
        engine.route_table().write().await.insert(link);
    }

    #[tokio::test]
    async fn test_empty_queue_has_no_turn() {
        let engine = engine_with(Arc::new(ScriptedAdapter::default()));
        assert!(engine.process_next().await.is_none());
    }

    #[tokio::test]
    async fn test_delivery_fires_observer_once() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let mut engine = engine_with(adapter.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.set_observer(Arc::new(tx));

        let msg = Message::new(node("A"), node("B"), "for you");
        let path_before = msg.path.clone();
        engine.receive(msg).await.unwrap();

        assert_eq!(engine.process_next().await, Some(TurnOutcome::Delivered));
        assert!(adapter.sent().is_empty());

        match rx.try_recv().unwrap() {
            RoutingEvent::Delivered(delivered) => {
                assert_eq!(delivered.path, path_before);
                assert!(delivered.deliveries.contains(&node("B")));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.stats().await.delivered, 1);
    }

    #[tokio::test]
    async fn test_each_arriving_instance_is_reported() {
        let mut engine = engine_with(Arc::new(ScriptedAdapter::default()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.set_observer(Arc::new(tx));

        let original = Message::new(node("A"), node("B"), "twice");
        let mut clone = original.clone();
        clone.clone_count = 1;
        clone.ttl = 20;

        engine.receive(original.clone()).await.unwrap();
        engine.receive(clone).await.unwrap();

        let outcomes = engine.process_pending(8).await;
        assert_eq!(outcomes, vec![TurnOutcome::Delivered, TurnOutcome::Delivered]);

        let mut delivered = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                RoutingEvent::Delivered(message) => delivered.push(message),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(delivered.len(), 2);
        assert!(delivered.iter().all(|m| m.id == original.id));
        assert_eq!(delivered[1].clone_count, 1);
        assert_eq!(engine.stats().await.delivered, 2);
    }

    #[tokio::test]
    async fn test_tampered_message_is_rejected() {
        let engine = engine_with(Arc::new(ScriptedAdapter::default()));
        let mut msg = Message::new(node("A"), node("Z"), "intact");
        msg.content = b"altered".to_vec();

        assert!(matches!(
            engine.receive(msg).await,
            Err(RoutingError::Protocol(ProtocolError::IntegrityMismatch))
        ));
        assert_eq!(engine.queue_len().await, 0);
        assert_eq!(engine.stats().await.rejected_invalid, 1);
    }

    #[tokio::test]
    async fn test_queue_stats_track_pending_entries() {
        let engine = engine_with(Arc::new(ScriptedAdapter::default()));
        engine.send(node("Z"), "one", Priority::high()).await.unwrap();
        engine.send(node("Z"), "two", Priority::low()).await.unwrap();

        let stats = engine.queue_stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(
            stats.by_priority,
            vec![(Priority::high(), 1), (Priority::low(), 1)]
        );
    }

    #[tokio::test]
    async fn test_successful_forward_seals_learning() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let engine = engine_with(adapter.clone());
        add_link(&engine, "C", 0.5, 100.0).await;

        let msg = Message::new(node("A"), node("Z"), "onward").with_ttl(10);
        engine.receive(msg).await.unwrap();

        match engine.process_next().await.unwrap() {
            TurnOutcome::Transmitted { neighbor, score, .. } => {
                assert_eq!(neighbor, node("C"));
                assert!((score - 200.0).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let sent = adapter.sent();
        assert_eq!(sent.len(), 1);
        let (outbound, _) = &sent[0];
        assert_eq!(outbound.ttl, 9);
        assert_eq!(outbound.path, vec![node("A"), node("B")]);
        assert_eq!(outbound.learning.preference(TransportKind::Wifi), 1);
        assert_eq!(outbound.learning.successful_routes.len(), 1);
        assert_eq!(engine.queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_no_route_requeues_with_spent_hop() {
        let engine = engine_with(Arc::new(ScriptedAdapter::default()));
        let msg = Message::new(node("A"), node("Z"), "waiting").with_ttl(2);
        engine.receive(msg).await.unwrap();

        assert_eq!(engine.process_next().await, Some(TurnOutcome::NoRoute { ttl: 1 }));
        assert_eq!(engine.queue_len().await, 1);

        // Requeued instance is not mistaken for a loop
        assert_eq!(engine.process_next().await, Some(TurnOutcome::NoRoute { ttl: 0 }));
        assert_eq!(
            engine.process_next().await,
            Some(TurnOutcome::Dropped {
                reason: DropReason::TtlExhausted
            })
        );
        assert_eq!(engine.queue_len().await, 0);

        let stats = engine.stats().await;
        assert_eq!(stats.no_route_requeues, 2);
        assert_eq!(stats.dropped_ttl, 1);
        assert_eq!(stats.loops_detected, 0);
    }

    #[tokio::test]
    async fn test_invalid_message_is_rejected() {
        let mut engine = engine_with(Arc::new(ScriptedAdapter::default()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.set_observer(Arc::new(tx));

        let mut msg = Message::new(node("A"), node("Z"), "broken");
        msg.path.clear();

        assert!(matches!(
            engine.receive(msg).await,
            Err(RoutingError::Protocol(_))
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            RoutingEvent::Dropped {
                reason: DropReason::Invalid,
                ..
            }
        ));
        assert_eq!(engine.queue_len().await, 0);
        assert_eq!(engine.stats().await.rejected_invalid, 1);
    }

    #[tokio::test]
    async fn test_queue_full_on_ingress() {
        let config = EngineConfig {
            queue_capacity: 1,
            ..EngineConfig::default()
        };
        let engine = ForwardingEngine::new(node("B"), config, Arc::new(ScriptedAdapter::default()));

        engine.send(node("Z"), "one", Priority::low()).await.unwrap();
        let err = engine.send(node("Z"), "two", Priority::low()).await.unwrap_err();
        assert!(matches!(err, RoutingError::QueueFull { capacity: 1 }));
        assert_eq!(engine.stats().await.dropped_queue_full, 1);
    }

    #[tokio::test]
    async fn test_clear_processed() {
        let engine = engine_with(Arc::new(ScriptedAdapter::default()));
        engine.send(node("Z"), "one", Priority::low()).await.unwrap();
        engine.process_next().await;

        assert_eq!(engine.processed().read().await.len(), 1);
        assert_eq!(engine.clear_processed().await, 1);
        assert!(engine.processed().read().await.is_empty());
    }
}
