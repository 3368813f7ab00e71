//! qs-probe - check whether TWS / IB Gateway is listening
//!
//! Usage:
//!   qs-probe                      # configured host:port (default 127.0.0.1:7497)
//!   qs-probe --port 4002 --read-banner
//!   qs-probe --scan               # all well-known TWS/Gateway ports
//!
//! Exits non-zero when no probed port accepts a connection.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use qs_gateway::{probe_endpoint, scan_well_known, BridgeConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "qs-probe")]
#[command(about = "Probe TWS / IB Gateway API ports")]
#[command(version)]
struct Args {
    /// Bridge configuration file (JSON); QS_TWS_* variables still apply
    #[arg(short, long)]
    config: Option<String>,

    /// Host to probe, overrides the configuration
    #[arg(long)]
    host: Option<String>,

    /// Port to probe, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Probe every well-known port (7497, 7496, 4002, 4001)
    #[arg(long)]
    scan: bool,

    /// Connect and read timeout per port
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,

    /// Wait for the first bytes the peer sends after connecting
    #[arg(long)]
    read_banner: bool,
}

/// Configuration file, environment, then command-line flags, validated
fn resolve_config(args: &Args) -> Result<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("loading {}", path))?,
        None => BridgeConfig::default(),
    }
    .with_env_overrides()
    .context("applying environment overrides")?;

    if let Some(host) = &args.host {
        config = config.with_host(host);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    config.validate().context("invalid probe configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = resolve_config(&args)?;
    let host = config.host.clone();
    let timeout = Duration::from_millis(args.timeout_ms);

    let reports = if args.scan {
        info!("Scanning well-known ports on {}", host);
        scan_well_known(&host, timeout, args.read_banner)
    } else {
        vec![probe_endpoint(&host, config.port, timeout, args.read_banner)]
    };

    for report in &reports {
        println!("{}", report);
    }

    if !reports.iter().any(|r| r.outcome.is_open()) {
        bail!("no API port is accepting connections on {}", host);
    }
    Ok(())
}
