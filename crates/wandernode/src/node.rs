use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dedup::DeliveryDedup;

use wandermesh_network::ChannelRegistry;
use wandermesh_protocol::{now_ms, Message, MessageId, NodeId, Priority};
use wandermesh_routing::{
    DiscoveryService, EngineStats, ForwardingEngine, PendingQueueStats, RoutingEvent,
    RoutingService, TransmissionAdapter,
};

/// One WanderMesh node: routing loops plus ingress and event handling
pub struct Node {
    node_id: NodeId,
    engine: Arc<ForwardingEngine>,
    service: RoutingService,
    channels: Arc<ChannelRegistry>,
    inbox: Option<mpsc::UnboundedReceiver<Message>>,
    events: Option<mpsc::UnboundedReceiver<RoutingEvent>>,
    dedup_capacity: usize,
    dedup_window_ms: u64,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    pub fn new(
        node_id: NodeId,
        config: &Config,
        transport: Arc<dyn TransmissionAdapter>,
        inbox: mpsc::UnboundedReceiver<Message>,
        channels: ChannelRegistry,
    ) -> Self {
        debug!("Initializing node {}...", node_id);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut engine =
            ForwardingEngine::new(node_id.clone(), config.engine_config(), Arc::clone(&transport));
        engine.set_observer(Arc::new(events_tx));
        let engine = Arc::new(engine);
        debug!("✓ Forwarding engine initialized");

        let discovery = Arc::new(DiscoveryService::with_kinds(
            transport,
            engine.route_table(),
            config.routing.transports.clone(),
        ));
        debug!("✓ Discovery initialized ({} transports)", discovery.kinds().len());

        let service = RoutingService::new(config.service_config(), Arc::clone(&engine), discovery);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            node_id,
            engine,
            service,
            channels: Arc::new(channels),
            inbox: Some(inbox),
            events: Some(events_rx),
            dedup_capacity: config.node.delivery_dedup_capacity,
            dedup_window_ms: config.node.delivery_dedup_window_secs.saturating_mul(1000),
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn engine(&self) -> Arc<ForwardingEngine> {
        Arc::clone(&self.engine)
    }

    /// Start routing loops, ingress and event handling
    pub async fn start(&mut self) -> Result<()> {
        let inbox = self
            .inbox
            .take()
            .with_context(|| format!("Node {} already started", self.node_id))?;
        let events = self
            .events
            .take()
            .with_context(|| format!("Node {} already started", self.node_id))?;

        self.service.start().await;
        self.tasks.push(self.spawn_ingress(inbox));
        self.tasks.push(self.spawn_event_handler(events));

        info!("✓ Node {} running", self.node_id);
        Ok(())
    }

    /// Messages handed over by neighbors go into the forwarding engine
    fn spawn_ingress(&self, mut inbox: mpsc::UnboundedReceiver<Message>) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    received = inbox.recv() => {
                        let Some(message) = received else { break };
                        if let Err(e) = engine.receive(message).await {
                            warn!("{} could not accept message: {}", engine.node_id(), e);
                        }
                    }
                }
            }
        })
    }

    /// Delivered payloads go out through the channel registry once per message id
    fn spawn_event_handler(
        &self,
        mut events: mpsc::UnboundedReceiver<RoutingEvent>,
    ) -> JoinHandle<()> {
        let node_id = self.node_id.clone();
        let channels = Arc::clone(&self.channels);
        let mut handed_off = DeliveryDedup::new(self.dedup_capacity, self.dedup_window_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        match event {
                            RoutingEvent::Delivered(message) => {
                                if !handed_off.first_arrival(message.id, now_ms()) {
                                    debug!("{} already handed off {}, duplicate clone ignored", node_id, message.id);
                                    continue;
                                }
                                match channels
                                    .deliver(message.destination.as_str(), &message.content)
                                    .await
                                {
                                    Ok(receipt) => debug!(
                                        "Message {} handed to {} channel",
                                        message.id, receipt.channel
                                    ),
                                    Err(e) => warn!("Message {} delivery failed: {}", message.id, e),
                                }
                            }
                            RoutingEvent::Dropped { message, reason } => {
                                debug!(
                                    "{} dropped {} ({}): \"{}\"",
                                    node_id,
                                    message.id,
                                    reason,
                                    message.content_preview(32)
                                );
                            }
                        }
                    }
                }
            }
        })
    }

    /// Originate a message at this node
    pub async fn send(
        &self,
        destination: NodeId,
        content: impl Into<Vec<u8>>,
        priority: Priority,
    ) -> Result<MessageId> {
        let id = self
            .engine
            .send(destination.clone(), content, priority)
            .await
            .with_context(|| format!("Failed to queue message for {}", destination))?;
        info!("{} queued message {} for {}", self.node_id, id, destination);
        Ok(id)
    }

    pub async fn stats(&self) -> EngineStats {
        self.engine.stats().await
    }

    pub async fn queue_stats(&self) -> PendingQueueStats {
        self.engine.queue_stats().await
    }

    pub async fn shutdown(&mut self) {
        info!("Stopping node {}...", self.node_id);
        self.service.shutdown().await;

        let _ = self.shutdown_tx.send(());
        for handle in self.tasks.drain(..) {
            if let Err(e) = handle.await {
                warn!("Node task ended abnormally: {}", e);
            }
        }
    }
}
