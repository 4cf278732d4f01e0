//! # Forknet Harness
//!
//! Multi-node integration harness for the forkd daemon's consensus
//! fork-activation behavior.
//!
//! The daemon is driven as a black box over JSON-RPC: the harness starts
//! node processes, wires them into a mesh, arms fork-activation parameters,
//! submits transactions, mines blocks and asserts on the resulting chain
//! state. Consensus, validation and p2p all live in the daemon; nothing
//! here reimplements them.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use forknet_harness::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_fork_activation(ScenarioOptions::default(), ClusterOptions::default()).await
//! }
//! ```
//!
//! The daemon binary is resolved from `--daemon`/`FORKNET_DAEMON`/PATH; see
//! [`node::config`].

/// Daemon process lifecycle (spawn, readiness, shutdown)
pub mod node;

/// Cluster topology, the `ChainRpc` seam and convergence waiters
pub mod cluster;

/// Fork-activation parameters and the settings interface
pub mod fork;

/// Wallet fixtures: address pools, UTXO fan-out, transaction volume
pub mod fixtures;

/// Assertion helpers over the RPC surface
pub mod rpc_helpers;

/// The fork-activation scenario script
pub mod scenario;

// Convenient re-exports for common usage
pub mod prelude;

pub use cluster::{ChainRpc, Cluster, ClusterOptions};
pub use node::{NodeConfig, NodeHandle};
pub use scenario::{run_fork_activation, ForkActivationScenario, ScenarioOptions};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
