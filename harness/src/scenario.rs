//! The fork-activation scenario.
//!
//! A fixed sequential script against a four-node mesh: nodes 0 and 1 are
//! armed with fork parameters, nodes 2 and 3 stay on the legacy rules. The
//! script checks shipped defaults, arms the fork, watches the chains
//! diverge at the activation boundary, verifies that a fork node refuses to
//! produce a sub-threshold fork block, and finally mines the oversized fork
//! block on the forked pair.

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use chrono::Utc;
use futures::future::try_join_all;
use log::info;
use tokio::time::sleep;

use crate::cluster::waiters::{
    sync_all, wait_all_block_counts_equal, wait_for_block_count,
};
use crate::cluster::{Cluster, ClusterOptions};
use crate::fixtures::{generate_tx_volume, split_utxos, AddressPool};
use crate::fork::{ForkParams, MINING_BLOCK_SIZE_KEY};
use crate::rpc_helpers::{
    assert_best_hashes_equal, assert_block_count, assert_block_counts_equal,
    expect_rpc_error_containing,
};

/// Nodes in the scenario mesh: two forking, two legacy.
pub const NODE_COUNT: usize = 4;

/// Blocks mined before the test proper, enough to mature spendable coins.
pub const INITIAL_CHAIN_HEIGHT: u64 = 200;

/// Fan-out rounds run during bootstrap; each mines one confirming block.
pub const UTXO_FANOUT_ROUNDS: usize = 5;

/// Blocks the legacy pair mines across the activation boundary.
pub const LEGACY_EXTENSION_BLOCKS: u64 = 15;

/// Where the fork nodes stop following the legacy chain: the bootstrap
/// chain (200 + 5 fan-out blocks) plus the 6 legacy blocks still
/// timestamped before the activation time.
pub const FORK_REJECT_HEIGHT: u64 = 211;

/// The fork block must carry strictly more than 1MB of transactions.
pub const FORK_BLOCK_MIN_VOLUME: usize = 1_000_001;

/// Fork-block-size threshold armed on the forking nodes.
pub const CONFIGURED_FORK_BLOCK_SIZE: u64 = 3_000_000;

/// Excessive-block threshold armed on the forking nodes.
pub const CONFIGURED_FORK_EXCESSIVE_BLOCK: u64 = 9_000_000;

/// Mining cap raised on node 0 before producing the fork block.
pub const FORK_MINING_BLOCK_SIZE: u64 = 2_000_000;

/// Reject reason returned when a fork node refuses a template.
pub const BAD_FORK_BLOCK_REJECTION: &str = "bad-fork-block";

/// Tunables for one scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    /// Addresses drawn into the fan-out pool.
    pub addr_count: usize,
    /// Outputs created per fan-out round.
    pub utxo_target: usize,
    /// Timeout for every convergence wait.
    pub sync_timeout: Duration,
    /// Grace period for the fork nodes to reject relayed legacy blocks.
    pub settle_delay: Duration,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            addr_count: 500,
            utxo_target: 3000,
            sync_timeout: Duration::from_secs(120),
            settle_delay: Duration::from_secs(4),
        }
    }
}

/// Launch a cluster, run the scenario, shut the cluster down.
pub async fn run_fork_activation(
    options: ScenarioOptions,
    cluster_options: ClusterOptions,
) -> Result<()> {
    let mut cluster = Cluster::start(NODE_COUNT, cluster_options)
        .await
        .context("failed to start cluster")?;
    cluster
        .interconnect()
        .await
        .context("failed to interconnect cluster")?;

    let result = ForkActivationScenario::new(options).run(&mut cluster).await;
    let shutdown = cluster.shutdown().await;
    result.and(shutdown)
}

/// The scenario script. Phases run strictly in order; any failed assertion
/// aborts the run.
pub struct ForkActivationScenario {
    options: ScenarioOptions,
}

impl ForkActivationScenario {
    pub fn new(options: ScenarioOptions) -> Self {
        Self { options }
    }

    pub async fn run(&self, cluster: &mut Cluster) -> Result<()> {
        ensure!(
            cluster.len() >= NODE_COUNT,
            "scenario needs {NODE_COUNT} nodes, cluster has {}",
            cluster.len()
        );

        let pool = self.bootstrap(cluster).await.context("bootstrap failed")?;
        self.check_default_fork_params(cluster)
            .await
            .context("fork defaults check failed")?;
        self.arm_fork_nodes(cluster)
            .await
            .context("arming fork nodes failed")?;
        self.extend_legacy_chain(cluster)
            .await
            .context("legacy chain extension failed")?;
        self.refuse_small_fork_block(cluster)
            .await
            .context("small fork block check failed")?;

        info!("retiring legacy nodes 2 and 3");
        cluster.stop_node(2).await?;
        cluster.stop_node(3).await?;

        self.mine_fork_block(cluster, &pool)
            .await
            .context("mining the fork block failed")?;

        info!("fork activation scenario passed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    /// Mine the initial chain and fan the miner's coins out into a wallet
    /// of thousands of small UTXOs.
    async fn bootstrap(&self, cluster: &Cluster) -> Result<AddressPool> {
        let node0 = cluster.node(0).rpc();

        info!("mining initial chain of {INITIAL_CHAIN_HEIGHT} blocks");
        node0
            .generate_blocks(INITIAL_CHAIN_HEIGHT)
            .await
            .context("initial chain generation failed")?;
        sync_all(&cluster.clients(), self.options.sync_timeout).await?;

        let pool = AddressPool::generate(node0, self.options.addr_count).await?;

        for round in 1..=UTXO_FANOUT_ROUNDS {
            info!("UTXO fan-out round {round}/{UTXO_FANOUT_ROUNDS}");
            split_utxos(node0, &pool, self.options.utxo_target).await?;
            node0
                .generate_blocks(1)
                .await
                .context("failed to confirm fan-out round")?;
            sync_all(&cluster.clients(), self.options.sync_timeout).await?;
        }

        Ok(pool)
    }

    /// Every node must ship the stock fork parameters.
    async fn check_default_fork_params(&self, cluster: &Cluster) -> Result<()> {
        let defaults = ForkParams::defaults();
        for node in cluster.nodes() {
            let params = ForkParams::query(node.rpc()).await?;
            ensure!(
                params == defaults,
                "node {} ships unexpected fork defaults: {params:?}",
                node.index()
            );
        }
        info!("all nodes carry the stock fork parameters");
        Ok(())
    }

    /// Arm nodes 0 and 1 with an activation time of "now". Node 0 gets one
    /// assignment per call, node 1 a single batched call; both paths must
    /// land the same configuration.
    async fn arm_fork_nodes(&self, cluster: &Cluster) -> Result<ForkParams> {
        let fork_time = u64::try_from(Utc::now().timestamp())
            .context("system clock is before the unix epoch")?;
        let armed = ForkParams {
            fork_time,
            fork_block_size: CONFIGURED_FORK_BLOCK_SIZE,
            fork_excessive_block: CONFIGURED_FORK_EXCESSIVE_BLOCK,
        };

        info!("arming fork nodes with activation time {fork_time}");
        armed.apply_each(cluster.node(0).rpc()).await?;
        armed.apply(cluster.node(1).rpc()).await?;

        for index in [0, 1] {
            let read = ForkParams::query(cluster.node(index).rpc()).await?;
            ensure!(
                read == armed,
                "node {index} did not persist fork settings: {read:?}"
            );
        }
        Ok(armed)
    }

    /// The legacy pair mines across the activation boundary; the fork pair
    /// must stop following at [`FORK_REJECT_HEIGHT`].
    async fn extend_legacy_chain(&self, cluster: &Cluster) -> Result<()> {
        let base = assert_block_counts_equal(&cluster.clients()).await?;
        info!("all nodes level at {base} blocks before the legacy extension");

        info!("legacy node 3 mining {LEGACY_EXTENSION_BLOCKS} blocks");
        cluster
            .node(3)
            .rpc()
            .generate_blocks(LEGACY_EXTENSION_BLOCKS)
            .await
            .context("legacy extension generation failed")?;

        wait_all_block_counts_equal(&cluster.clients_of(&[2, 3]), self.options.sync_timeout)
            .await?;
        wait_all_block_counts_equal(&cluster.clients_of(&[0, 1]), self.options.sync_timeout)
            .await?;

        // The legacy pair keeps relaying its chain; give the fork nodes a
        // moment to reject everything past the boundary before pinning
        // their height.
        sleep(self.options.settle_delay).await;
        wait_for_block_count(
            cluster.node(0).rpc(),
            FORK_REJECT_HEIGHT,
            self.options.sync_timeout,
        )
        .await?;

        let counts = try_join_all(
            cluster
                .clients()
                .into_iter()
                .map(|client| client.get_block_count()),
        )
        .await
        .context("failed to gather block counts")?;
        info!("block counts after legacy extension: {counts:?}");

        assert_block_count(cluster.node(0).rpc(), FORK_REJECT_HEIGHT).await?;
        ensure!(
            counts[0] < counts[2],
            "fork node 0 followed the legacy chain: {counts:?}"
        );
        ensure!(
            counts[1] < counts[3],
            "fork node 1 followed the legacy chain: {counts:?}"
        );
        ensure!(
            counts[0] == counts[1],
            "fork nodes diverged from each other: {counts:?}"
        );
        ensure!(
            counts[2] == counts[3],
            "legacy nodes diverged from each other: {counts:?}"
        );
        Ok(())
    }

    /// A fork node must refuse to produce a sub-threshold fork block.
    async fn refuse_small_fork_block(&self, cluster: &Cluster) -> Result<()> {
        info!("fork node 0 must refuse to mine a sub-threshold fork block");
        let result = cluster.node(0).rpc().generate_blocks(1).await;
        expect_rpc_error_containing(result, BAD_FORK_BLOCK_REJECTION)
    }

    /// Build more than 1MB of pending transactions and mine the fork block
    /// on node 0; node 1 must accept it.
    async fn mine_fork_block(&self, cluster: &Cluster, pool: &AddressPool) -> Result<()> {
        let node0 = cluster.node(0).rpc();

        info!("building the oversized fork block");
        let report = generate_tx_volume(node0, pool, FORK_BLOCK_MIN_VOLUME).await?;
        info!(
            "mempool volume: {} transactions, {} bytes",
            report.transactions, report.bytes
        );

        // The daemon does not widen its mining cap on activation yet; raise
        // it explicitly so the template can exceed the legacy limit.
        node0
            .set_settings(&[format!("{MINING_BLOCK_SIZE_KEY}={FORK_MINING_BLOCK_SIZE}")])
            .await
            .context("failed to raise the mining cap")?;

        node0
            .generate_blocks(1)
            .await
            .context("mining the fork block failed")?;

        wait_all_block_counts_equal(&cluster.clients_of(&[0, 1]), self.options.sync_timeout)
            .await?;
        assert_block_count(node0, FORK_REJECT_HEIGHT + 1).await?;
        assert_best_hashes_equal(&cluster.clients_of(&[0, 1])).await?;
        info!("fork block accepted by both fork nodes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_the_reference_run() {
        let options = ScenarioOptions::default();
        assert_eq!(options.addr_count, 500);
        assert_eq!(options.utxo_target, 3000);
        assert_eq!(options.settle_delay, Duration::from_secs(4));
    }

    #[test]
    fn reject_height_accounts_for_bootstrap_chain() {
        // 200 bootstrap blocks + 5 fan-out confirmations + 6 pre-boundary
        // legacy blocks.
        assert_eq!(
            FORK_REJECT_HEIGHT,
            INITIAL_CHAIN_HEIGHT + UTXO_FANOUT_ROUNDS as u64 + 6
        );
    }

    #[test]
    fn armed_thresholds_stay_distinct_from_defaults() {
        let defaults = ForkParams::defaults();
        assert_ne!(defaults.fork_block_size, CONFIGURED_FORK_BLOCK_SIZE);
        assert_ne!(
            defaults.fork_excessive_block,
            CONFIGURED_FORK_EXCESSIVE_BLOCK
        );
    }
}
