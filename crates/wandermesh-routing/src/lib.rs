//! WanderMesh Opportunistic Routing
//!
//! Store-and-forward routing for nodes without a guaranteed end-to-end path:
//! - Route table of per-neighbor links, refreshed by a discovery loop
//! - Route scoring (baseline and per-message learned mode)
//! - Priority-ordered forwarding engine with TTL and loop suppression
//! - Bounded message cloning for alternate-path exploration
//! - Periodically cleared processed-message memory

pub mod cloning;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod events;
pub mod priority_queue;
pub mod processed;
pub mod route_table;
pub mod scorer;
pub mod service;
pub mod transport;

pub use cloning::{CloneConfig, CloneController};
pub use discovery::{DiscoveryReport, DiscoveryService};
pub use engine::{EngineConfig, EngineStats, ForwardingEngine, TurnOutcome};
pub use error::{Result, RoutingError};
pub use events::{DropReason, RoutingEvent, RoutingObserver};
pub use priority_queue::{PendingQueue, PendingQueueStats, QueueOrigin, QueuedMessage};
pub use processed::ProcessedMemory;
pub use route_table::{Link, RouteTable, RouteTableStats};
pub use scorer::{RouteScorer, ScoredLink, ScorerConfig, ScoringMode};
pub use service::{RoutingService, ServiceConfig};
pub use transport::{NeighborSample, TransmissionAdapter, TransmitOutcome};

/// Default discovery interval (seconds)
pub const DEFAULT_DISCOVERY_INTERVAL_SECS: u64 = 2;

/// Default processed-message memory clear interval (seconds)
pub const DEFAULT_MEMORY_CLEAR_INTERVAL_SECS: u64 = 300;

/// Default recency window for failure penalties (seconds)
pub const DEFAULT_FAILURE_WINDOW_SECS: u64 = 60;

/// Default pending queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
