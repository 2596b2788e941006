//! WanderNode
//!
//! Node daemon for the WanderMesh store-and-forward network: YAML
//! configuration, the per-node orchestrator that runs the routing loops, and
//! an in-process multi-node simulation over the simulated transport.

pub mod config;
pub mod dedup;
pub mod node;
pub mod simulation;

pub use config::Config;
pub use node::Node;
pub use simulation::Simulation;
