use std::{net::IpAddr, path::PathBuf};

use clap::Parser;
use tracing::Level;

/// Prometheus exporter for Slurm queue, account, user and per node job usage.
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(version)]
pub struct Args {
    /// Extra configuration file, layered over `config/default` and `config/$RUN_MODE`
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on, overrides the configuration
    #[arg(long)]
    pub listen_ip: Option<IpAddr>,

    /// Port to listen on, overrides the configuration
    #[arg(short = 'p', long)]
    pub listen_port: Option<u16>,

    #[arg(short, long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Print a single scrape to stdout and exit instead of serving
    #[arg(long)]
    pub once: bool,
}
