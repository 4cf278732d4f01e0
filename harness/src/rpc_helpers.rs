//! RPC assertion helpers.
//!
//! Thin wrappers that verify node state via the RPC interface and fail with
//! messages naming what diverged. The scenario is a fixed script; every
//! mismatch should abort it loudly.

use anyhow::{Context, Result};
use futures::future::try_join_all;
use forknet_rpc::RpcError;

use crate::cluster::ChainRpc;

/// Assert that `node` is at exactly `expected` blocks.
pub async fn assert_block_count<N: ChainRpc>(node: &N, expected: u64) -> Result<()> {
    let actual = node
        .get_block_count()
        .await
        .context("failed to get block count")?;

    if actual != expected {
        anyhow::bail!("block count mismatch: expected {expected}, got {actual}");
    }
    Ok(())
}

/// Assert that every node reports the same block count; returns it.
pub async fn assert_block_counts_equal<N: ChainRpc>(nodes: &[N]) -> Result<u64> {
    let counts = try_join_all(nodes.iter().map(|node| node.get_block_count()))
        .await
        .context("failed to gather block counts")?;

    if counts.windows(2).any(|pair| pair[0] != pair[1]) {
        anyhow::bail!("block counts diverge: {counts:?}");
    }
    Ok(counts.first().copied().unwrap_or(0))
}

/// Assert that every node reports the same best block hash; returns it.
pub async fn assert_best_hashes_equal<N: ChainRpc>(nodes: &[N]) -> Result<String> {
    let hashes = try_join_all(nodes.iter().map(|node| node.get_best_block_hash()))
        .await
        .context("failed to gather best block hashes")?;

    if hashes.windows(2).any(|pair| pair[0] != pair[1]) {
        anyhow::bail!("best block hashes diverge: {hashes:?}");
    }
    Ok(hashes.into_iter().next().unwrap_or_default())
}

/// Assert that a call failed with a daemon-side error whose message
/// contains `needle`. Success, or a different failure, is a test failure.
pub fn expect_rpc_error_containing<T: std::fmt::Debug>(
    result: Result<T, RpcError>,
    needle: &str,
) -> Result<()> {
    match result {
        Ok(value) => anyhow::bail!(
            "expected an error containing {needle:?}, but the call succeeded with {value:?}"
        ),
        Err(err) if err.is_server_error_containing(needle) => Ok(()),
        Err(err) => anyhow::bail!("expected an error containing {needle:?}, got: {err}"),
    }
}
