//! Fork-activation integration tests.
//!
//! These tests drive real daemon processes and are therefore gated behind
//! `--ignored`. Point `FORKNET_DAEMON` at a forkd binary (or put `forkd` on
//! PATH) and run:
//!
//! ```bash
//! cargo test -p forknet-harness --release -- --ignored
//! ```

use std::time::Duration;

use forknet_harness::prelude::*;
use forknet_harness::scenario::NODE_COUNT;

fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .is_test(true)
    .try_init();
}

/// The full scenario: defaults, arming, divergence at the boundary, the
/// refused small block and the accepted oversized fork block.
#[tokio::test]
#[ignore = "requires a forkd daemon binary (set FORKNET_DAEMON)"]
async fn fork_activation_scenario() {
    init_logging();

    run_fork_activation(ScenarioOptions::default(), ClusterOptions::default())
        .await
        .expect("fork activation scenario failed");
}

/// Smoke test: a fresh mesh comes up, levels out and reports the stock
/// fork parameters everywhere.
#[tokio::test]
#[ignore = "requires a forkd daemon binary (set FORKNET_DAEMON)"]
async fn cluster_boots_with_stock_fork_parameters() {
    init_logging();

    let mut cluster = Cluster::start(NODE_COUNT, ClusterOptions::default())
        .await
        .expect("cluster failed to start");
    cluster.interconnect().await.expect("mesh did not form");

    sync_all(&cluster.clients(), Duration::from_secs(60))
        .await
        .expect("fresh cluster did not level out");

    for node in cluster.nodes() {
        let params = ForkParams::query(node.rpc())
            .await
            .expect("fork settings query failed");
        assert_eq!(params, ForkParams::defaults());
    }

    cluster.shutdown().await.expect("shutdown failed");
}

/// A stopped node must drop off the RPC surface.
#[tokio::test]
#[ignore = "requires a forkd daemon binary (set FORKNET_DAEMON)"]
async fn stopped_node_goes_dark() {
    init_logging();

    let mut cluster = Cluster::start(1, ClusterOptions::default())
        .await
        .expect("cluster failed to start");

    cluster.node(0).rpc().get_block_count().await.expect("node not answering");
    cluster.stop_node(0).await.expect("stop failed");

    assert!(
        cluster.node(0).rpc().get_block_count().await.is_err(),
        "stopped node still answers RPC"
    );
}
