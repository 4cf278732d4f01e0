// File: harness/src/cluster/waiters.rs
//
// Polling waiters for multi-node convergence.
//
// Node processes synchronize among themselves; the harness can only observe
// progress through RPC. These helpers poll until a condition holds or a
// timeout expires, and report the divergent per-node observations when it
// does not.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::future::try_join_all;
use tokio::time::{sleep, Instant};

use super::ChainRpc;

/// Default pause between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Wait until `node` reports a block count of at least `target`.
///
/// Returns the observed count on success.
pub async fn wait_for_block_count<N: ChainRpc>(
    node: &N,
    target: u64,
    timeout: Duration,
) -> Result<u64> {
    let deadline = Instant::now() + timeout;
    loop {
        let count = node.get_block_count().await?;
        if count >= target {
            return Ok(count);
        }
        if Instant::now() >= deadline {
            bail!(
                "block count stuck at {count}, wanted {target} within {:?}",
                timeout
            );
        }
        sleep(DEFAULT_POLL_INTERVAL).await;
    }
}

/// Wait until every node reports the same block count *and* the same best
/// block hash. Returns the agreed count.
pub async fn wait_all_block_counts_equal<N: ChainRpc>(
    nodes: &[N],
    timeout: Duration,
) -> Result<u64> {
    let deadline = Instant::now() + timeout;
    loop {
        let counts = try_join_all(nodes.iter().map(|node| node.get_block_count())).await?;
        let hashes = try_join_all(nodes.iter().map(|node| node.get_best_block_hash())).await?;

        let counts_agree = counts.windows(2).all(|pair| pair[0] == pair[1]);
        let hashes_agree = hashes.windows(2).all(|pair| pair[0] == pair[1]);
        if counts_agree && hashes_agree {
            return Ok(counts.first().copied().unwrap_or(0));
        }
        if Instant::now() >= deadline {
            bail!(
                "nodes did not converge within {:?}: counts {:?}, best hashes {:?}",
                timeout,
                counts,
                hashes
            );
        }
        sleep(DEFAULT_POLL_INTERVAL).await;
    }
}

/// Wait until every node's mempool holds the same set of txids.
pub async fn wait_all_mempools_equal<N: ChainRpc>(nodes: &[N], timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let pools = try_join_all(nodes.iter().map(|node| node.get_raw_mempool())).await?;
        let sets: Vec<BTreeSet<&String>> =
            pools.iter().map(|pool| pool.iter().collect()).collect();

        if sets.windows(2).all(|pair| pair[0] == pair[1]) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            let sizes: Vec<usize> = sets.iter().map(|set| set.len()).collect();
            bail!(
                "mempools did not converge within {:?}: sizes {:?}",
                timeout,
                sizes
            );
        }
        sleep(DEFAULT_POLL_INTERVAL).await;
    }
}

/// Blocks and mempools both converged.
pub async fn sync_all<N: ChainRpc>(nodes: &[N], timeout: Duration) -> Result<()> {
    wait_all_block_counts_equal(nodes, timeout).await?;
    wait_all_mempools_equal(nodes, timeout).await?;
    Ok(())
}
