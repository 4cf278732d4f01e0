//! Fork-activation parameters.
//!
//! The daemon exposes its consensus fork knobs through the dotted-key
//! settings interface. This module mirrors the shipped defaults, parses the
//! daemon's wildcard query result and builds the `key=value` assignments
//! used to arm a fork on a node.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use forknet_rpc::RpcClient;
use serde_json::Value;

/// Timestamp (unix seconds) at which the shipped fork rules activate.
pub const DEFAULT_FORK_TIME: u64 = 1_501_590_000;
/// Minimum size of the activating fork block, in bytes.
pub const DEFAULT_FORK_BLOCK_SIZE: u64 = 2_000_000;
/// Excessive-block threshold applied after the fork, in bytes.
pub const DEFAULT_FORK_EXCESSIVE_BLOCK: u64 = 8_000_000;

pub const FORK_TIME_KEY: &str = "mining.fork_time";
pub const FORK_BLOCK_SIZE_KEY: &str = "mining.fork_block_size";
pub const FORK_EXCESSIVE_BLOCK_KEY: &str = "mining.fork_excessive_block";

/// Wildcard pattern matching every fork setting.
pub const FORK_SETTINGS_PATTERN: &str = "mining.fork*";

/// The non-fork mining size cap. Raised manually before producing the fork
/// block; the daemon does not yet widen it automatically on activation.
pub const MINING_BLOCK_SIZE_KEY: &str = "mining.block_size";

/// One node's fork-activation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkParams {
    pub fork_time: u64,
    pub fork_block_size: u64,
    pub fork_excessive_block: u64,
}

impl ForkParams {
    /// The defaults the daemon ships with.
    pub fn defaults() -> Self {
        Self {
            fork_time: DEFAULT_FORK_TIME,
            fork_block_size: DEFAULT_FORK_BLOCK_SIZE,
            fork_excessive_block: DEFAULT_FORK_EXCESSIVE_BLOCK,
        }
    }

    /// Parse a `get_settings("mining.fork*")` result. Every fork key must
    /// be present and numeric.
    pub fn from_settings(settings: &BTreeMap<String, Value>) -> Result<Self> {
        Ok(Self {
            fork_time: setting_u64(settings, FORK_TIME_KEY)?,
            fork_block_size: setting_u64(settings, FORK_BLOCK_SIZE_KEY)?,
            fork_excessive_block: setting_u64(settings, FORK_EXCESSIVE_BLOCK_KEY)?,
        })
    }

    /// `key=value` assignments for `set_settings`, one per fork key.
    pub fn assignments(&self) -> Vec<String> {
        vec![
            format!("{FORK_TIME_KEY}={}", self.fork_time),
            format!("{FORK_EXCESSIVE_BLOCK_KEY}={}", self.fork_excessive_block),
            format!("{FORK_BLOCK_SIZE_KEY}={}", self.fork_block_size),
        ]
    }

    /// Read the fork settings of `node`.
    pub async fn query(node: &RpcClient) -> Result<Self> {
        let settings = node
            .get_settings(FORK_SETTINGS_PATTERN)
            .await
            .context("failed to query fork settings")?;
        Self::from_settings(&settings)
    }

    /// Arm `node` with these parameters in a single batched call.
    pub async fn apply(&self, node: &RpcClient) -> Result<()> {
        node.set_settings(&self.assignments())
            .await
            .context("failed to apply fork settings")?;
        Ok(())
    }

    /// Arm `node` with one `set_settings` call per assignment.
    pub async fn apply_each(&self, node: &RpcClient) -> Result<()> {
        for assignment in self.assignments() {
            node.set_settings(std::slice::from_ref(&assignment))
                .await
                .with_context(|| format!("failed to apply {assignment}"))?;
        }
        Ok(())
    }
}

/// Extract a u64 setting; the daemon reports numbers, but string-encoded
/// values are accepted for forward compatibility.
fn setting_u64(settings: &BTreeMap<String, Value>, key: &str) -> Result<u64> {
    let Some(value) = settings.get(key) else {
        bail!("setting {key} missing from daemon response");
    };
    match value {
        Value::Number(n) => n
            .as_u64()
            .with_context(|| format!("setting {key} is not an unsigned integer: {n}")),
        Value::String(s) => s
            .parse()
            .with_context(|| format!("setting {key} is not numeric: {s:?}")),
        other => bail!("setting {key} has unexpected type: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(time: Value, block_size: Value, excessive: Value) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert(FORK_TIME_KEY.to_owned(), time);
        map.insert(FORK_BLOCK_SIZE_KEY.to_owned(), block_size);
        map.insert(FORK_EXCESSIVE_BLOCK_KEY.to_owned(), excessive);
        map
    }

    #[test]
    fn defaults_match_shipped_values() {
        let params = ForkParams::defaults();
        assert_eq!(params.fork_time, 1_501_590_000);
        assert_eq!(params.fork_block_size, 2_000_000);
        assert_eq!(params.fork_excessive_block, 8_000_000);
    }

    #[test]
    fn parses_numeric_settings() {
        let map = settings(json!(1_700_000_000u64), json!(3_000_000), json!(9_000_000));
        let params = ForkParams::from_settings(&map).unwrap();
        assert_eq!(
            params,
            ForkParams {
                fork_time: 1_700_000_000,
                fork_block_size: 3_000_000,
                fork_excessive_block: 9_000_000,
            }
        );
    }

    #[test]
    fn parses_string_encoded_settings() {
        let map = settings(json!("1700000000"), json!("3000000"), json!("9000000"));
        let params = ForkParams::from_settings(&map).unwrap();
        assert_eq!(params.fork_block_size, 3_000_000);
    }

    #[test]
    fn missing_key_is_an_error() {
        let mut map = settings(json!(1), json!(2), json!(3));
        map.remove(FORK_EXCESSIVE_BLOCK_KEY);
        let err = ForkParams::from_settings(&map).unwrap_err();
        assert!(err.to_string().contains(FORK_EXCESSIVE_BLOCK_KEY));
    }

    #[test]
    fn rejects_non_numeric_values() {
        let map = settings(json!(true), json!(2), json!(3));
        assert!(ForkParams::from_settings(&map).is_err());
    }

    #[test]
    fn assignments_cover_every_key_once() {
        let params = ForkParams {
            fork_time: 42,
            fork_block_size: 3_000_000,
            fork_excessive_block: 9_000_000,
        };
        let assignments = params.assignments();
        assert_eq!(assignments.len(), 3);
        assert!(assignments.contains(&"mining.fork_time=42".to_owned()));
        assert!(assignments.contains(&"mining.fork_block_size=3000000".to_owned()));
        assert!(assignments.contains(&"mining.fork_excessive_block=9000000".to_owned()));
    }
}
