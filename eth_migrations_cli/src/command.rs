use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// every step goes through the zos command line tool
    Cli,
    /// creates go through zos, calls are sent over JSON-RPC with ethers
    Rpc,
}

#[derive(Parser, Debug)]
#[command(version, about = "Apply pending contract migrations to a network", long_about = None)]
pub struct Cli {
    /// The network to migrate, as named in the networks file, e.g. `local` or `ropsten`
    #[arg(short, long, env = "MIGRATE_NETWORK")]
    pub network: String,

    /// Networks file describing every deployment target
    #[arg(long, env = "MIGRATE_CONFIG", default_value = "networks.toml")]
    pub config: PathBuf,

    /// Declarative list of steps to apply
    #[arg(long, env = "MIGRATE_PLAN", default_value = "migrations.toml")]
    pub plan: PathBuf,

    /// Where the per network migration records are kept
    #[arg(long, env = "MIGRATE_RECORDS_DIR", default_value = "migrations")]
    pub records_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = TransportKind::Rpc)]
    pub transport: TransportKind,

    /// Command used to invoke zos, e.g. `npx zos`
    #[arg(long, env = "ZOS_BIN", default_value = "zos")]
    pub zos_bin: String,

    /// Upper bound for a single step, e.g. `90s` or `10m`
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10m")]
    pub timeout: Duration,

    /// Forget the record of this network and run every step again
    #[arg(long, default_value_t = false)]
    pub reset: bool,

    /// Only list the steps that would run
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Log filter, env_logger syntax
    #[arg(long, env = "LOG_FILTER", default_value = "warn,eth_migrations=info,migrate=info")]
    pub log_filter: String,
}
