//! # CLI Interface
//!
//! Defines the command-line argument structure for `waypoint-node` using
//! `clap` derive. Supports five subcommands: `run`, `init`, `status`,
//! `salt`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use waypoint_protocol::config::{DEFAULT_API_PORT, DEFAULT_EPOCH_WINDOW, DEFAULT_METRICS_PORT};

/// Waypoint sponsor backend and devnet ledger.
///
/// Registers users who signed in with an OAuth provider, co-signs their
/// transfers as gas owner, and serves a devnet ledger over JSON-RPC.
#[derive(Parser, Debug)]
#[command(
    name = "waypoint-node",
    about = "Waypoint sponsor backend and devnet ledger",
    version,
    propagate_version = true
)]
pub struct WaypointNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the backend.
    Run(RunArgs),
    /// Create the data directory and generate a sponsor key.
    Init(InitArgs),
    /// Query the status of a running node.
    Status(StatusArgs),
    /// Print the salt for a subject id.
    Salt(SaltArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Data directory holding the user registry and the sponsor key.
    #[arg(long, short = 'd', env = "WAYPOINT_DATA_DIR", default_value = ".waypoint")]
    pub data_dir: PathBuf,

    /// OAuth client id. Tokens whose audience does not include it are refused.
    #[arg(long, env = "WAYPOINT_CLIENT_ID")]
    pub client_id: String,

    /// Port for the REST and JSON-RPC API.
    #[arg(long, env = "WAYPOINT_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "WAYPOINT_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Hex-encoded Ed25519 sponsor secret key.
    ///
    /// If not provided, the node reads `sponsor.key` from the data directory.
    /// Do not pass this flag outside of development.
    #[arg(long, env = "WAYPOINT_SPONSOR_KEY")]
    pub sponsor_key: Option<String>,

    /// Epochs a sponsored transaction stays valid past the current one.
    #[arg(long, env = "WAYPOINT_EPOCH_WINDOW", default_value_t = DEFAULT_EPOCH_WINDOW)]
    pub epoch_window: u64,

    /// Seconds between devnet epochs.
    #[arg(long, env = "WAYPOINT_EPOCH_SECS", default_value_t = 600)]
    pub epoch_secs: u64,

    /// Native coins credited to a user on first registration (devnet faucet).
    #[arg(long, env = "WAYPOINT_FAUCET_AMOUNT", default_value_t = 1_000_000_000)]
    pub faucet_amount: u64,

    /// Native coins the sponsor starts with on the devnet ledger.
    #[arg(long, env = "WAYPOINT_SPONSOR_FUNDING", default_value_t = 1_000_000_000_000_000)]
    pub sponsor_funding: u64,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "WAYPOINT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "WAYPOINT_DATA_DIR", default_value = ".waypoint")]
    pub data_dir: PathBuf,

    /// Overwrite an existing sponsor key.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Base URL of the running node.
    #[arg(long, env = "WAYPOINT_API_URL", default_value = "http://127.0.0.1:9741")]
    pub api_url: String,
}

/// Arguments for the `salt` subcommand.
#[derive(Parser, Debug)]
pub struct SaltArgs {
    /// Provider subject id (`sub` claim).
    pub subject: String,

    /// Deployment prefix. Defaults to the protocol's.
    #[arg(long)]
    pub prefix: Option<String>,
}
