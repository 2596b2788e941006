//! WanderMesh Network Layer
//!
//! Transports and delivery channels that sit outside the routing core:
//! - Simulated in-process transport implementing the routing core's
//!   `TransmissionAdapter`, driven by a shared topology
//! - Delivery channel registry for handing delivered payloads to the
//!   outside world

pub mod channels;
pub mod error;
pub mod simulated;
pub mod topology;

pub use channels::{ChannelRegistry, DeliveryChannel, DeliveryReceipt, LogChannel, MemoryChannel};
pub use error::{NetworkError, Result};
pub use simulated::{SimulatedNetwork, SimulatedTransport, SimulationConfig};
pub use topology::{LinkProfile, Topology};
