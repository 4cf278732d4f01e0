// File: harness/src/fixtures.rs
//
// Wallet fixtures: address pools, UTXO fan-out and transaction volume.
//
// Building an oversized block requires a wallet with thousands of small
// UTXOs; these helpers produce that shape through the daemon's wallet RPCs
// alone.

use std::collections::BTreeMap;

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use forknet_rpc::daemon::{SignedTransaction, TxOutPoint, UnspentOutput};
use forknet_rpc::RpcClient;
use log::{debug, info};

/// Most outputs a single fan-out transaction will create.
pub const MAX_OUTPUTS_PER_SPLIT: usize = 100;

/// Flat fee reserved when splitting a UTXO.
pub const SPLIT_TX_FEE: u64 = 10_000;

/// Flat fee reserved by volume transactions.
pub const TRANSFER_FEE: u64 = 1_000;

/// Wallet-level RPC surface the fixtures drive.
///
/// Implemented by [`RpcClient`]; unit tests substitute an in-memory wallet.
#[async_trait]
pub trait WalletRpc: Send + Sync {
    async fn get_new_address(&self) -> Result<String>;
    async fn refill_keypool(&self, size: usize) -> Result<()>;
    async fn list_unspent(&self) -> Result<Vec<UnspentOutput>>;
    async fn create_raw_transaction(
        &self,
        inputs: &[TxOutPoint],
        outputs: &BTreeMap<String, u64>,
    ) -> Result<String>;
    async fn sign_raw_transaction(&self, hex: &str) -> Result<SignedTransaction>;
    async fn submit_raw_transaction(&self, hex: &str) -> Result<String>;
}

#[async_trait]
impl WalletRpc for RpcClient {
    async fn get_new_address(&self) -> Result<String> {
        Ok(RpcClient::get_new_address(self).await?)
    }

    async fn refill_keypool(&self, size: usize) -> Result<()> {
        Ok(RpcClient::refill_keypool(self, size).await?)
    }

    async fn list_unspent(&self) -> Result<Vec<UnspentOutput>> {
        Ok(RpcClient::list_unspent(self).await?)
    }

    async fn create_raw_transaction(
        &self,
        inputs: &[TxOutPoint],
        outputs: &BTreeMap<String, u64>,
    ) -> Result<String> {
        Ok(RpcClient::create_raw_transaction(self, inputs, outputs).await?)
    }

    async fn sign_raw_transaction(&self, hex: &str) -> Result<SignedTransaction> {
        Ok(RpcClient::sign_raw_transaction(self, hex).await?)
    }

    async fn submit_raw_transaction(&self, hex: &str) -> Result<String> {
        Ok(RpcClient::submit_raw_transaction(self, hex).await?)
    }
}

/// A pool of receiving addresses owned by one node's wallet.
#[derive(Debug, Clone)]
pub struct AddressPool {
    addresses: Vec<String>,
}

impl AddressPool {
    /// Refill the node's keypool and draw `count` fresh addresses.
    pub async fn generate<W: WalletRpc>(node: &W, count: usize) -> Result<Self> {
        ensure!(count > 0, "address pool needs at least one address");
        node.refill_keypool(count)
            .await
            .context("failed to refill keypool")?;

        let mut addresses = Vec::with_capacity(count);
        for _ in 0..count {
            addresses.push(
                node.get_new_address()
                    .await
                    .context("failed to draw new address")?,
            );
        }
        info!("generated {} addresses", addresses.len());
        Ok(Self { addresses })
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Address at `index`, wrapping around the pool.
    pub fn cyclic(&self, index: usize) -> &str {
        &self.addresses[index % self.addresses.len()]
    }

    /// Up to `len` addresses starting at `offset`, truncated at the pool
    /// end (no wrap-around within one window).
    pub fn window(&self, offset: usize, len: usize) -> &[String] {
        let start = offset.min(self.addresses.len());
        let end = (start + len).min(self.addresses.len());
        &self.addresses[start..end]
    }
}

/// Even per-output share after the flat fee, or `None` for dust.
fn split_share(amount: u64, outputs: usize) -> Option<u64> {
    let share = amount.saturating_sub(SPLIT_TX_FEE) / outputs as u64;
    (share > 0).then_some(share)
}

/// Split one UTXO evenly across `addresses`, returning the txid.
async fn split_transaction<W: WalletRpc>(
    node: &W,
    utxo: &UnspentOutput,
    addresses: &[String],
) -> Result<String> {
    ensure!(!addresses.is_empty(), "no addresses to split into");

    let share = split_share(utxo.amount, addresses.len()).with_context(|| {
        format!(
            "utxo {}:{} ({} units) too small to split {} ways",
            utxo.txid,
            utxo.vout,
            utxo.amount,
            addresses.len()
        )
    })?;

    let outputs: BTreeMap<String, u64> = addresses
        .iter()
        .map(|address| (address.clone(), share))
        .collect();

    let raw = node
        .create_raw_transaction(&[utxo.outpoint()], &outputs)
        .await?;
    let signed = node.sign_raw_transaction(&raw).await?;
    ensure!(signed.complete, "split transaction left unsigned inputs");
    node.submit_raw_transaction(&signed.hex).await
}

/// Fan the wallet's largest UTXOs out into roughly `target` new outputs.
///
/// Walks the wallet largest-first, splitting each UTXO across a window of
/// pool addresses, and stops once `target` outputs have been created or the
/// remaining UTXOs are too small to split. The caller is expected to mine a
/// block afterwards to confirm the fan-out.
///
/// Returns the number of outputs created.
pub async fn split_utxos<W: WalletRpc>(
    node: &W,
    pool: &AddressPool,
    target: usize,
) -> Result<usize> {
    let mut wallet = node.list_unspent().await?;
    wallet.sort_by(|a, b| b.amount.cmp(&a.amount));

    let group = MAX_OUTPUTS_PER_SPLIT.min(target).min(pool.len());
    let mut offset = 0;
    let mut created = 0;

    info!("splitting {} wallet UTXOs into ~{target} outputs", wallet.len());
    for utxo in &wallet {
        let addresses = pool.window(offset, group);
        if addresses.is_empty() || split_share(utxo.amount, addresses.len()).is_none() {
            // Wallet is sorted largest-first; once one UTXO is too small to
            // split, the rest are too.
            break;
        }
        split_transaction(node, utxo, addresses).await?;
        created += addresses.len();
        offset += group;
        if offset >= pool.len() {
            offset = 0;
        }
        if created > target {
            break;
        }
    }

    ensure!(created > 0, "wallet had no splittable UTXOs");
    debug!("created {created} outputs");
    Ok(created)
}

/// Outcome of [`generate_tx_volume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeReport {
    /// Decoded bytes of signed transactions submitted.
    pub bytes: usize,
    pub transactions: usize,
}

/// Submit self-payments until more than `target_bytes` of signed
/// transaction data sits in the mempool.
///
/// Spends the wallet largest-first, one single-input payment per UTXO, and
/// accounts the *decoded* size of each signed transaction.
pub async fn generate_tx_volume<W: WalletRpc>(
    node: &W,
    pool: &AddressPool,
    target_bytes: usize,
) -> Result<VolumeReport> {
    let mut wallet = node.list_unspent().await?;
    wallet.sort_by(|a, b| a.amount.cmp(&b.amount));
    info!(
        "wallet holds {} UTXOs, generating {target_bytes} bytes of transactions",
        wallet.len()
    );

    let mut bytes = 0;
    let mut transactions = 0;
    while bytes < target_bytes {
        let utxo = wallet
            .pop()
            .context("wallet exhausted before reaching target volume")?;
        let amount = utxo.amount.saturating_sub(TRANSFER_FEE);
        if amount == 0 {
            continue;
        }

        let mut outputs = BTreeMap::new();
        outputs.insert(pool.cyclic(transactions).to_owned(), amount);

        let raw = node
            .create_raw_transaction(&[utxo.outpoint()], &outputs)
            .await?;
        let signed = node.sign_raw_transaction(&raw).await?;
        ensure!(signed.complete, "volume transaction left unsigned inputs");

        bytes += hex::decode(&signed.hex)
            .context("daemon returned malformed transaction hex")?
            .len();
        node.submit_raw_transaction(&signed.hex).await?;
        transactions += 1;
    }

    info!("submitted {transactions} transactions, {bytes} bytes");
    Ok(VolumeReport {
        bytes,
        transactions,
    })
}
