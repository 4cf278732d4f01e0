//! Typed wrappers for the daemon's RPC surface.
//!
//! Parameter and result shapes mirror the daemon's published API. The
//! harness only depends on the subset exercised by the fork-activation
//! scenario: chain queries, block generation, wallet primitives and the
//! dotted-key settings interface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::RpcClient;
use crate::error::RpcError;

/// Reference to a spendable transaction output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxOutPoint {
    pub txid: String,
    pub vout: u32,
}

/// A wallet UTXO as reported by `list_unspent`. Amounts are atomic units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnspentOutput {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    pub amount: u64,
}

impl UnspentOutput {
    pub fn outpoint(&self) -> TxOutPoint {
        TxOutPoint {
            txid: self.txid.clone(),
            vout: self.vout,
        }
    }
}

/// Result of `sign_raw_transaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub hex: String,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateBlocksParams {
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefillKeypoolParams {
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRawTransactionParams<'a> {
    pub inputs: &'a [TxOutPoint],
    pub outputs: &'a BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RawTransactionParams<'a> {
    pub hex: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddPeerParams<'a> {
    pub address: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetSettingsParams<'a> {
    pub pattern: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetSettingsParams<'a> {
    pub assignments: &'a [String],
}

impl RpcClient {
    pub async fn get_block_count(&self) -> Result<u64, RpcError> {
        self.call_no_params("get_block_count").await
    }

    pub async fn get_best_block_hash(&self) -> Result<String, RpcError> {
        self.call_no_params("get_best_block_hash").await
    }

    /// Mine `count` blocks on this node, returning their hashes.
    ///
    /// When the node's armed fork rules refuse the template, the daemon
    /// answers with a server error carrying the reject reason (e.g.
    /// `bad-fork-block`).
    pub async fn generate_blocks(&self, count: u64) -> Result<Vec<String>, RpcError> {
        self.call("generate_blocks", &GenerateBlocksParams { count })
            .await
    }

    pub async fn get_new_address(&self) -> Result<String, RpcError> {
        self.call_no_params("get_new_address").await
    }

    pub async fn refill_keypool(&self, size: usize) -> Result<(), RpcError> {
        self.call_value(
            "refill_keypool",
            Some(serde_json::to_value(RefillKeypoolParams { size })?),
        )
        .await?;
        Ok(())
    }

    pub async fn list_unspent(&self) -> Result<Vec<UnspentOutput>, RpcError> {
        self.call_no_params("list_unspent").await
    }

    /// Build an unsigned transaction spending `inputs` into `outputs`
    /// (address to atomic amount), returned hex-encoded.
    pub async fn create_raw_transaction(
        &self,
        inputs: &[TxOutPoint],
        outputs: &BTreeMap<String, u64>,
    ) -> Result<String, RpcError> {
        self.call(
            "create_raw_transaction",
            &CreateRawTransactionParams { inputs, outputs },
        )
        .await
    }

    pub async fn sign_raw_transaction(&self, hex: &str) -> Result<SignedTransaction, RpcError> {
        self.call("sign_raw_transaction", &RawTransactionParams { hex })
            .await
    }

    /// Broadcast a signed transaction, returning its txid.
    pub async fn submit_raw_transaction(&self, hex: &str) -> Result<String, RpcError> {
        self.call("submit_raw_transaction", &RawTransactionParams { hex })
            .await
    }

    pub async fn get_raw_mempool(&self) -> Result<Vec<String>, RpcError> {
        self.call_no_params("get_raw_mempool").await
    }

    pub async fn add_peer(&self, address: &str) -> Result<(), RpcError> {
        self.call_value(
            "add_peer",
            Some(serde_json::to_value(AddPeerParams { address })?),
        )
        .await?;
        Ok(())
    }

    pub async fn get_peer_count(&self) -> Result<usize, RpcError> {
        self.call_no_params("get_peer_count").await
    }

    /// Query runtime settings whose dotted keys match `pattern`. A trailing
    /// `*` matches any suffix (`mining.fork*`).
    pub async fn get_settings(&self, pattern: &str) -> Result<BTreeMap<String, Value>, RpcError> {
        self.call("get_settings", &GetSettingsParams { pattern })
            .await
    }

    /// Apply `key=value` assignments. Several assignments may be batched
    /// into one call; the daemon applies them atomically.
    pub async fn set_settings(&self, assignments: &[String]) -> Result<(), RpcError> {
        self.call_value(
            "set_settings",
            Some(serde_json::to_value(SetSettingsParams { assignments })?),
        )
        .await?;
        Ok(())
    }

    /// Ask the daemon to shut down gracefully.
    pub async fn stop(&self) -> Result<(), RpcError> {
        self.call_value("stop", None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_raw_transaction_params_shape() {
        let inputs = vec![TxOutPoint {
            txid: "ab".repeat(32),
            vout: 1,
        }];
        let mut outputs = BTreeMap::new();
        outputs.insert("addr1".to_owned(), 50_000u64);

        let value = serde_json::to_value(CreateRawTransactionParams {
            inputs: &inputs,
            outputs: &outputs,
        })
        .unwrap();

        assert_eq!(value["inputs"][0]["vout"], 1);
        assert_eq!(value["outputs"]["addr1"], 50_000);
    }

    #[test]
    fn unspent_output_round_trip_and_outpoint() {
        let utxo: UnspentOutput = serde_json::from_value(json!({
            "txid": "cd".repeat(32),
            "vout": 3,
            "address": "addr9",
            "amount": 125_000_000u64,
        }))
        .unwrap();

        assert_eq!(utxo.amount, 125_000_000);
        let outpoint = utxo.outpoint();
        assert_eq!(outpoint.txid, utxo.txid);
        assert_eq!(outpoint.vout, 3);
    }

    #[test]
    fn settings_params_serialize_as_lists() {
        let assignments = vec!["mining.fork_time=1700000000".to_owned()];
        let value = serde_json::to_value(SetSettingsParams {
            assignments: &assignments,
        })
        .unwrap();
        assert_eq!(value["assignments"][0], "mining.fork_time=1700000000");
    }
}
