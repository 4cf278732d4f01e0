//! Multi-node cluster lifecycle and topology.
//!
//! A [`Cluster`] launches several daemons under one base directory, wires
//! them into a full mesh and hands out their RPC clients. Synchronization
//! between nodes is observed, never driven: the harness only polls RPC
//! state (see [`waiters`]) while the daemons converge on their own.

pub mod waiters;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use async_trait::async_trait;
use forknet_rpc::RpcClient;
use log::info;
use tempfile::TempDir;
use tokio::time::{sleep, Instant};

use crate::node::{config::resolve_daemon_path, NodeConfig, NodeHandle};

const MESH_POLL_INTERVAL: Duration = Duration::from_millis(250);
const MESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Chain-level queries the waiters and assertion helpers rely on.
///
/// Implemented by [`RpcClient`] for real daemons and by in-memory mocks in
/// unit tests, so synchronization logic is testable without processes.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_block_count(&self) -> Result<u64>;
    async fn get_best_block_hash(&self) -> Result<String>;
    async fn get_raw_mempool(&self) -> Result<Vec<String>>;
}

#[async_trait]
impl ChainRpc for RpcClient {
    async fn get_block_count(&self) -> Result<u64> {
        Ok(RpcClient::get_block_count(self).await?)
    }

    async fn get_best_block_hash(&self) -> Result<String> {
        Ok(RpcClient::get_best_block_hash(self).await?)
    }

    async fn get_raw_mempool(&self) -> Result<Vec<String>> {
        Ok(RpcClient::get_raw_mempool(self).await?)
    }
}

#[async_trait]
impl<'a, T: ChainRpc + ?Sized> ChainRpc for &'a T {
    async fn get_block_count(&self) -> Result<u64> {
        (**self).get_block_count().await
    }

    async fn get_best_block_hash(&self) -> Result<String> {
        (**self).get_best_block_hash().await
    }

    async fn get_raw_mempool(&self) -> Result<Vec<String>> {
        (**self).get_raw_mempool().await
    }
}

/// Cluster-wide launch options.
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    /// Explicit daemon binary; falls back to `FORKNET_DAEMON`, then PATH.
    pub daemon_path: Option<PathBuf>,
    /// Persistent base directory instead of a fresh temp dir.
    pub base_dir: Option<PathBuf>,
    /// Keep data directories after the run for post-mortem inspection.
    pub keep_datadirs: bool,
    /// Leave the daemons running when the cluster is dropped.
    pub leave_running: bool,
    /// Log every RPC request/response pair.
    pub trace_rpc: bool,
    pub readiness_timeout: Duration,
    /// Extra CLI flags appended to every node.
    pub extra_args: Vec<String>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            daemon_path: None,
            base_dir: None,
            keep_datadirs: false,
            leave_running: false,
            trace_rpc: false,
            readiness_timeout: crate::node::DEFAULT_READINESS_TIMEOUT,
            extra_args: vec!["--rpc-server-timeout".to_owned(), "0".to_owned()],
        }
    }
}

/// A set of running daemons sharing one base directory.
#[derive(Debug)]
pub struct Cluster {
    nodes: Vec<NodeHandle>,
    base_path: PathBuf,
    // Present only for temp dirs that should be removed on drop.
    _base_dir: Option<TempDir>,
    options: ClusterOptions,
}

impl Cluster {
    /// Launch `count` nodes. Data directories are `node0..nodeN-1` under
    /// the base directory.
    pub async fn start(count: usize, options: ClusterOptions) -> Result<Self> {
        ensure!(count > 0, "cluster needs at least one node");

        let (base_path, base_dir) = match &options.base_dir {
            Some(path) => {
                std::fs::create_dir_all(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                (path.clone(), None)
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("forknet-cluster-")
                    .tempdir()
                    .context("failed to create cluster temp directory")?;
                let path = dir.path().to_path_buf();
                if options.keep_datadirs {
                    // Leak the temp dir handle so it survives the run.
                    info!("keeping data directories at {}", path.display());
                    std::mem::forget(dir);
                    (path, None)
                } else {
                    (path, Some(dir))
                }
            }
        };

        let daemon_path = resolve_daemon_path(options.daemon_path.as_deref());
        let mut nodes = Vec::with_capacity(count);
        for index in 0..count {
            let mut config = NodeConfig::new(index, base_path.join(format!("node{index}")))?;
            config.daemon_path = daemon_path.clone();
            config.readiness_timeout = options.readiness_timeout;
            config.extra_args = options.extra_args.clone();
            config.kill_on_drop = !options.leave_running;
            nodes.push(NodeHandle::start(config, options.trace_rpc).await?);
        }

        Ok(Self {
            nodes,
            base_path,
            _base_dir: base_dir,
            options,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &NodeHandle {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    /// RPC clients of every node, in index order.
    pub fn clients(&self) -> Vec<&RpcClient> {
        self.nodes.iter().map(|node| node.rpc()).collect()
    }

    /// RPC clients of a subset of nodes.
    pub fn clients_of(&self, indices: &[usize]) -> Vec<&RpcClient> {
        indices.iter().map(|&i| self.nodes[i].rpc()).collect()
    }

    /// Connect every node to every other node, then wait until each one
    /// reports a full peer table.
    pub async fn interconnect(&self) -> Result<()> {
        for node in &self.nodes {
            for peer in &self.nodes {
                if node.index() != peer.index() {
                    node.rpc()
                        .add_peer(&peer.p2p_address())
                        .await
                        .with_context(|| {
                            format!(
                                "node {} failed to add peer {}",
                                node.index(),
                                peer.index()
                            )
                        })?;
                }
            }
        }

        let expected = self.nodes.len() - 1;
        let deadline = Instant::now() + MESH_TIMEOUT;
        loop {
            let mut pending = None;
            for node in &self.nodes {
                let peers = node.rpc().get_peer_count().await?;
                if peers < expected {
                    pending = Some((node.index(), peers));
                    break;
                }
            }
            match pending {
                None => return Ok(()),
                Some((index, peers)) if Instant::now() >= deadline => {
                    bail!(
                        "node {index} only connected {peers}/{expected} peers within {:?}",
                        MESH_TIMEOUT
                    );
                }
                Some(_) => sleep(MESH_POLL_INTERVAL).await,
            }
        }
    }

    /// Stop one node; the handle stays in place so indices remain stable.
    pub async fn stop_node(&mut self, index: usize) -> Result<()> {
        info!("stopping node {index}");
        self.nodes[index].stop().await
    }

    /// Stop every node that is still running.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.options.leave_running {
            info!(
                "leaving {} node(s) running at {}",
                self.nodes.len(),
                self.base_path.display()
            );
            return Ok(());
        }
        for index in 0..self.nodes.len() {
            self.nodes[index].stop().await?;
        }
        Ok(())
    }
}
