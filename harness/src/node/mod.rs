//! Daemon process lifecycle.
//!
//! [`NodeHandle`] owns one external daemon process: it spawns the binary
//! with a private data directory, waits until the RPC server answers, and
//! tears the process down again. The daemon itself is a black box; every
//! interaction past the spawn goes through [`RpcClient`].

pub mod config;

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use forknet_rpc::RpcClient;
use log::{info, warn};
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};

pub use config::{NodeConfig, DAEMON_ENV, DEFAULT_DAEMON, DEFAULT_READINESS_TIMEOUT};

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(200);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// A running daemon instance and its RPC client.
#[derive(Debug)]
pub struct NodeHandle {
    config: NodeConfig,
    child: Option<Child>,
    rpc: RpcClient,
}

impl NodeHandle {
    /// Spawn the daemon described by `config` and wait for its RPC server.
    ///
    /// stdout/stderr are redirected into `debug.log` inside the node's data
    /// directory for post-mortem inspection. Fails if the process exits
    /// during startup or the readiness timeout expires.
    pub async fn start(config: NodeConfig, trace_rpc: bool) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!(
                "failed to create data directory {}",
                config.data_dir.display()
            )
        })?;

        let log_path = config.data_dir.join("debug.log");
        let log_file = std::fs::File::create(&log_path)
            .with_context(|| format!("failed to create {}", log_path.display()))?;
        let log_clone = log_file
            .try_clone()
            .context("failed to clone daemon log handle")?;

        info!(
            "starting node {} ({} {})",
            config.index,
            config.daemon_path.display(),
            config.command_args().join(" ")
        );

        let mut child = Command::new(&config.daemon_path)
            .args(config.command_args())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_clone))
            .stderr(Stdio::from(log_file))
            .kill_on_drop(config.kill_on_drop)
            .spawn()
            .with_context(|| {
                format!(
                    "failed to spawn daemon binary {}",
                    config.daemon_path.display()
                )
            })?;

        let rpc = RpcClient::new(config.rpc_url()).with_tracing(trace_rpc);

        let deadline = Instant::now() + config.readiness_timeout;
        loop {
            if let Some(status) = child.try_wait().context("failed to poll daemon process")? {
                bail!(
                    "node {} exited during startup ({}), see {}",
                    config.index,
                    status,
                    log_path.display()
                );
            }
            match rpc.get_block_count().await {
                Ok(_) => break,
                Err(err) => {
                    if Instant::now() >= deadline {
                        let _ = child.start_kill();
                        bail!(
                            "node {} RPC not ready within {:?}: {err:#}",
                            config.index,
                            config.readiness_timeout
                        );
                    }
                    sleep(READINESS_POLL_INTERVAL).await;
                }
            }
        }

        info!("node {} ready at {}", config.index, rpc.endpoint());
        Ok(Self {
            config,
            child: Some(child),
            rpc,
        })
    }

    pub fn index(&self) -> usize {
        self.config.index
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Address other nodes use to dial this one.
    pub fn p2p_address(&self) -> String {
        self.config.p2p_address()
    }

    /// True while the child process has not been reaped.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Graceful shutdown: `stop` RPC, bounded wait, kill fallback.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Err(err) = self.rpc.stop().await {
            warn!("node {}: stop RPC failed: {err:#}", self.config.index);
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
            Ok(status) => {
                let status = status.context("failed to reap daemon process")?;
                info!("node {} exited ({})", self.config.index, status);
            }
            Err(_) => {
                warn!(
                    "node {} did not exit within {:?}, killing",
                    self.config.index, SHUTDOWN_TIMEOUT
                );
                child
                    .kill()
                    .await
                    .context("failed to kill daemon process")?;
            }
        }
        Ok(())
    }

    /// Hard termination without the stop RPC.
    pub async fn kill(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            child
                .kill()
                .await
                .context("failed to kill daemon process")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_fails_fast_on_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::new(0, dir.path().join("node0")).unwrap();
        config.daemon_path = dir.path().join("definitely-not-a-daemon");
        config.readiness_timeout = Duration::from_secs(1);

        let err = NodeHandle::start(config, false).await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn daemon binary"));
    }

    #[tokio::test]
    async fn start_reports_child_exit_during_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::new(3, dir.path().join("node3")).unwrap();
        // A binary that exists but exits immediately never becomes ready.
        config.daemon_path = "/bin/true".into();
        config.readiness_timeout = Duration::from_secs(5);

        let err = NodeHandle::start(config, false).await.unwrap_err();
        assert!(
            err.to_string().contains("exited during startup"),
            "unexpected error: {err:#}"
        );
    }
}
