//! CLI runner for the fork-activation scenario.
//!
//! Drives a local forkd cluster through the full scenario. The daemon
//! binary comes from `--daemon`, the `FORKNET_DAEMON` environment variable
//! or PATH, in that order.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use forknet_harness::{run_fork_activation, ClusterOptions, ScenarioOptions};

#[derive(Parser, Debug)]
#[command(
    name = "forknet-run",
    about = "Run the fork-activation scenario against a local forkd cluster"
)]
struct Args {
    /// Path to the daemon binary
    #[arg(long)]
    daemon: Option<PathBuf>,

    /// Persistent base directory for node data (default: fresh temp dir)
    #[arg(long)]
    tmpdir: Option<PathBuf>,

    /// Keep node data directories after the run
    #[arg(long)]
    no_cleanup: bool,

    /// Leave the daemons running after the run
    #[arg(long)]
    no_shutdown: bool,

    /// Log every RPC request/response pair
    #[arg(long)]
    trace_rpc: bool,

    /// Addresses drawn into the fan-out pool
    #[arg(long, default_value_t = 500)]
    addr_count: usize,

    /// Outputs created per UTXO fan-out round
    #[arg(long, default_value_t = 3000)]
    utxo_target: usize,

    /// Seconds allowed for each convergence wait
    #[arg(long, default_value_t = 120)]
    sync_timeout: u64,

    /// Seconds allowed for a freshly spawned daemon to answer RPC
    #[arg(long, default_value_t = 60)]
    readiness_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let scenario = ScenarioOptions {
        addr_count: args.addr_count,
        utxo_target: args.utxo_target,
        sync_timeout: Duration::from_secs(args.sync_timeout),
        ..ScenarioOptions::default()
    };
    let cluster = ClusterOptions {
        daemon_path: args.daemon,
        base_dir: args.tmpdir,
        keep_datadirs: args.no_cleanup,
        leave_running: args.no_shutdown,
        trace_rpc: args.trace_rpc,
        readiness_timeout: Duration::from_secs(args.readiness_timeout),
        ..ClusterOptions::default()
    };

    run_fork_activation(scenario, cluster).await
}
