use std::env;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

/// Environment variable naming the daemon binary to launch.
pub const DAEMON_ENV: &str = "FORKNET_DAEMON";

/// Binary looked up on PATH when nothing else is configured.
pub const DEFAULT_DAEMON: &str = "forkd";

/// Default time allowed for a freshly spawned daemon to answer RPC.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Launch configuration for one daemon instance.
///
/// Ports are allocated from the OS by binding to `127.0.0.1:0` and
/// releasing the listener, the same trick the daemon's own test tooling
/// uses. There is a small race window between allocation and the daemon
/// binding the port; harness runs are short-lived enough that it has not
/// mattered in practice.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub index: usize,
    pub data_dir: PathBuf,
    pub rpc_port: u16,
    pub p2p_port: u16,
    pub network: String,
    pub extra_args: Vec<String>,
    pub daemon_path: PathBuf,
    pub readiness_timeout: Duration,
    /// Kill the child when the handle is dropped. Disabled by
    /// `ClusterOptions::leave_running`.
    pub kill_on_drop: bool,
}

impl NodeConfig {
    pub fn new(index: usize, data_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            index,
            data_dir: data_dir.into(),
            rpc_port: allocate_port().context("failed to allocate RPC port")?,
            p2p_port: allocate_port().context("failed to allocate P2P port")?,
            network: "devnet".to_owned(),
            extra_args: Vec::new(),
            daemon_path: resolve_daemon_path(None),
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            kill_on_drop: true,
        })
    }

    pub fn rpc_url(&self) -> String {
        format!("http://127.0.0.1:{}/json_rpc", self.rpc_port)
    }

    pub fn p2p_address(&self) -> String {
        format!("127.0.0.1:{}", self.p2p_port)
    }

    /// Command-line arguments passed to the daemon binary.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            "--network".to_owned(),
            self.network.clone(),
            "--data-dir".to_owned(),
            self.data_dir.display().to_string(),
            "--rpc-bind-address".to_owned(),
            format!("127.0.0.1:{}", self.rpc_port),
            "--p2p-bind-address".to_owned(),
            format!("127.0.0.1:{}", self.p2p_port),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Resolve the daemon binary: explicit path, else `FORKNET_DAEMON`, else
/// `forkd` on PATH.
pub fn resolve_daemon_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env::var_os(DAEMON_ENV) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_DAEMON)
}

fn allocate_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_args_carry_bind_addresses_and_extras() {
        let mut config = NodeConfig::new(2, "/tmp/forknet/node2").unwrap();
        config.extra_args = vec!["--rpc-server-timeout".to_owned(), "0".to_owned()];

        let args = config.command_args();
        assert!(args.contains(&"--data-dir".to_owned()));
        assert!(args.contains(&format!("127.0.0.1:{}", config.rpc_port)));
        assert!(args.contains(&format!("127.0.0.1:{}", config.p2p_port)));
        assert_eq!(args.last().unwrap(), "0");
        assert_eq!(args[0], "--network");
        assert_eq!(args[1], "devnet");
    }

    #[test]
    fn allocated_ports_are_distinct() {
        let config = NodeConfig::new(0, "/tmp/forknet/node0").unwrap();
        assert_ne!(config.rpc_port, config.p2p_port);
    }

    #[test]
    fn explicit_daemon_path_wins() {
        let path = resolve_daemon_path(Some(Path::new("/opt/forkd/bin/forkd")));
        assert_eq!(path, PathBuf::from("/opt/forkd/bin/forkd"));
    }

    #[test]
    fn rpc_url_points_at_loopback() {
        let config = NodeConfig::new(1, "/tmp/forknet/node1").unwrap();
        assert!(config.rpc_url().starts_with("http://127.0.0.1:"));
        assert!(config.rpc_url().ends_with("/json_rpc"));
    }
}
