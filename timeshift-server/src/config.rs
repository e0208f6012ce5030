//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::rating::DEFAULT_K;

#[derive(Parser, Debug, Clone)]
#[command(name = "timeshift-server", about = "Time-shift chess match server")]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: SocketAddr,

    /// SQLite database file.
    #[arg(long, env = "DB_PATH", default_value = "./data.sqlite3")]
    pub db_path: PathBuf,

    /// How often flagged clocks are swept, in milliseconds.
    #[arg(long, env = "SWEEP_INTERVAL_MS", default_value_t = 1000)]
    pub sweep_interval_ms: u64,

    /// Elo K-factor.
    #[arg(long, env = "RATING_K", default_value_t = DEFAULT_K)]
    pub rating_k: f64,
}
