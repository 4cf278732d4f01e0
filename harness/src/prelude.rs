//! Convenience re-exports for scenario and test code.

pub use crate::cluster::waiters::{
    sync_all, wait_all_block_counts_equal, wait_all_mempools_equal, wait_for_block_count,
};
pub use crate::cluster::{ChainRpc, Cluster, ClusterOptions};
pub use crate::fixtures::{generate_tx_volume, split_utxos, AddressPool, WalletRpc};
pub use crate::fork::ForkParams;
pub use crate::node::{NodeConfig, NodeHandle};
pub use crate::rpc_helpers::{
    assert_best_hashes_equal, assert_block_count, assert_block_counts_equal,
    expect_rpc_error_containing,
};
pub use crate::scenario::{run_fork_activation, ForkActivationScenario, ScenarioOptions};
pub use forknet_rpc::{RpcClient, RpcError};
