//! Concurrent routing loops
//!
//! A node runs three independent loops: link discovery, the forwarding
//! engine's queue processing, and the periodic processed-memory clear. They
//! share only the route table and processed memory through the engine.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::discovery::DiscoveryService;
use crate::engine::ForwardingEngine;
use crate::{DEFAULT_DISCOVERY_INTERVAL_SECS, DEFAULT_MEMORY_CLEAR_INTERVAL_SECS};

/// Loop timing
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Time between discovery cycles
    pub discovery_interval: Duration,
    /// Period of the forwarding loop
    pub process_interval: Duration,
    /// Most turns run per forwarding tick
    pub max_turns_per_tick: usize,
    /// Time between processed-memory clears
    pub memory_clear_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(DEFAULT_DISCOVERY_INTERVAL_SECS),
            process_interval: Duration::from_millis(100),
            max_turns_per_tick: 32,
            memory_clear_interval: Duration::from_secs(DEFAULT_MEMORY_CLEAR_INTERVAL_SECS),
        }
    }
}

/// Owns the routing loops of one node
pub struct RoutingService {
    config: ServiceConfig,
    engine: Arc<ForwardingEngine>,
    discovery: Arc<DiscoveryService>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: RwLock<Vec<JoinHandle<()>>>,
}

impl RoutingService {
    pub fn new(
        config: ServiceConfig,
        engine: Arc<ForwardingEngine>,
        discovery: Arc<DiscoveryService>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        Self {
            config,
            engine,
            discovery,
            shutdown_tx,
            tasks: RwLock::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> Arc<ForwardingEngine> {
        Arc::clone(&self.engine)
    }

    /// Whether the loops are running
    pub async fn is_running(&self) -> bool {
        !self.tasks.read().await.is_empty()
    }

    /// Spawn the three loops. Calling start twice is a no-op.
    pub async fn start(&self) {
        let mut tasks = self.tasks.write().await;
        if !tasks.is_empty() {
            warn!("Routing service for {} already running", self.engine.node_id());
            return;
        }

        info!("Starting routing loops for {}", self.engine.node_id());

        tasks.push(self.spawn_discovery_loop());
        tasks.push(self.spawn_forwarding_loop());
        tasks.push(self.spawn_memory_clear_loop());
    }

    fn spawn_discovery_loop(&self) -> JoinHandle<()> {
        let discovery = Arc::clone(&self.discovery);
        let period = self.config.discovery_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Discovery loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        discovery.run_cycle().await;
                    }
                }
            }
        })
    }

    fn spawn_forwarding_loop(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let period = self.config.process_interval;
        let max_turns = self.config.max_turns_per_tick.max(1);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Forwarding loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        // Entries requeued during this tick wait for the next one
                        let pending = engine.queue_len().await.min(max_turns);
                        for _ in 0..pending {
                            if engine.process_next().await.is_none() {
                                break;
                            }
                            tokio::task::yield_now().await;
                        }
                    }
                }
            }
        })
    }

    fn spawn_memory_clear_loop(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let period = self.config.memory_clear_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            // First clear one full period after start
            let mut ticker = interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Memory clear loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        engine.clear_processed().await;
                    }
                }
            }
        })
    }

    /// Signal every loop to stop and wait for them to finish
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = self.tasks.write().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Routing loop ended abnormally: {}", e);
            }
        }

        info!("Routing loops for {} stopped", self.engine.node_id());
    }
}
