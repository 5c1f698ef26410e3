//! ovsmgrd - Open vSwitch Bridge Configuration Manager Daemon
//!
//! Entry point for the ovsmgrd daemon.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use sonic_cfgmgr_common::{defaults, CfgMgr};
use sonic_ovsmgrd::{
    ConfigSnapshot, LinkMonitor, LinkTable, OvsMgr, ShellControlPlane, CFG_OVS_BRIDGE_TABLE_NAME,
    DEFAULT_SYSFS_NET,
};

/// Open vSwitch bridge configuration manager
#[derive(Parser, Debug)]
#[command(name = "ovsmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON snapshot of the OVS_BRIDGE and OVS_BRIDGE_MEMBER tables
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Capture ovs-vsctl commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Do not request activation of configured bridges
    #[arg(long)]
    no_auto_activate: bool,

    /// Directory whose entries are the present network devices
    #[arg(long, default_value = DEFAULT_SYSFS_NET)]
    sysfs_root: PathBuf,

    /// Link poll interval in milliseconds
    #[arg(long, default_value_t = defaults::SELECT_TIMEOUT_MS)]
    poll_interval_ms: u64,

    /// Write the bridge status as JSON to this file on every poll
    #[arg(long)]
    status_file: Option<PathBuf>,
}

/// Initializes tracing/logging subsystem
fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn load_snapshot(path: &Path) -> Result<ConfigSnapshot> {
    ConfigSnapshot::load(path).context("Failed to load the configuration snapshot")
}

fn write_status(path: &Path, mgr: &OvsMgr) -> Result<()> {
    let json = serde_json::to_string_pretty(&mgr.status())?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("--- Starting ovsmgrd ---");

    match run(args).await {
        Ok(()) => {
            info!("ovsmgrd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("ovsmgrd exiting with error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let snapshot = match &args.config {
        Some(path) => load_snapshot(path)?,
        None => ConfigSnapshot::default(),
    };

    let control = Arc::new(if args.dry_run {
        info!("Dry-run mode: ovs-vsctl commands are logged, not executed");
        ShellControlPlane::dry_run()
    } else {
        ShellControlPlane::new()
    });

    let (table, events) = LinkTable::new();
    let table = Arc::new(table);
    let mut mgr = OvsMgr::new(control.clone(), table.clone(), events)
        .with_auto_activate(!args.no_auto_activate);
    let monitor = LinkMonitor::new(&args.sysfs_root);

    for bridge in snapshot.keys(CFG_OVS_BRIDGE_TABLE_NAME) {
        if let Err(e) = control.clear_state(&bridge).await {
            warn!("Failed to clear stale state of {}: {}", bridge, e);
        }
    }

    let tables: Vec<String> = mgr
        .config_table_names()
        .iter()
        .map(|table| table.to_string())
        .collect();
    for name in &tables {
        for entry in snapshot.entries(name) {
            let key = entry.key.clone();
            if let Err(e) = mgr.process_entry(name, entry).await {
                warn!("Failed to apply {} entry {}: {}", name, key, e);
            }
        }
    }
    info!("Configured {} bridge(s)", mgr.bridge_names().len());

    let mut ticker = tokio::time::interval(Duration::from_millis(args.poll_interval_ms.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let devices = mgr.monitored_devices();
                monitor.poll(devices.iter().map(String::as_str), table.as_ref());
                mgr.on_timer().await;

                if let Some(path) = &args.status_file {
                    if let Err(e) = write_status(path, &mgr) {
                        warn!("{:#}", e);
                    }
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for ctrl-c: {}", e);
                }
                warn!("Received SIGINT, shutting down");
                break;
            }
        }
    }

    mgr.shutdown().await;
    Ok(())
}
