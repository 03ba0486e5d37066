//! Command-line arguments

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "pinba-collector", version, about = "Pinba request statistics collector")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive Pinba datagrams and export per-view aggregates
    Serve(ServeArgs),
    /// Send synthetic Pinba traffic to a collector
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Configuration file path
    #[arg(short, long, env = "PINBA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address (overrides config file)
    #[arg(long, env = "PINBA_ADDRESS")]
    pub address: Option<String>,

    /// Listen port (overrides config file)
    #[arg(short, long, env = "PINBA_PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// HTTP API bind address (overrides config file)
    #[arg(long, env = "PINBA_HTTP")]
    pub http: Option<SocketAddr>,
}

impl ServeArgs {
    /// Fold command-line overrides into a loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(address) = &self.address {
            config.listen.address = address.clone();
        }
        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(http) = self.http {
            config.export.http = Some(http.to_string());
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Collector address
    #[arg(short, long, default_value = "127.0.0.1:30002")]
    pub target: SocketAddr,

    /// Number of concurrent senders
    #[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..=500))]
    pub concurrency: u32,

    /// How long to send for (seconds)
    #[arg(short, long, default_value_t = 10)]
    pub duration_secs: u64,

    /// Base RNG seed; each sender derives its own
    #[arg(long, default_value_t = 1000)]
    pub seed: u64,
}
