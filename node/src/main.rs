// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Waypoint Node
//!
//! Entry point for the `waypoint-node` binary: the sponsor backend that
//! devices talk to, with an in-process devnet ledger behind it.
//!
//! The binary supports five subcommands:
//!
//! - `run`     start the backend and the devnet ledger
//! - `init`    create the data directory and a sponsor key
//! - `status`  query a running node's status endpoint
//! - `salt`    print the salt of a subject id
//! - `version` print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use waypoint_protocol::config::{
    BridgeConfig, DEFAULT_REQUEST_TIMEOUT, NATIVE_COIN_TYPE, PROTOCOL_VERSION, TRANSACTION_VERSION,
    USER_AGENT,
};
use waypoint_protocol::crypto::LedgerKeypair;
use waypoint_protocol::identity::{derive_salt, derive_salt_with_prefix};
use waypoint_protocol::ledger::DevnetLedger;
use waypoint_protocol::sponsor::SponsorService;
use waypoint_protocol::storage::WaypointDb;

use cli::{Commands, WaypointNodeCli};
use logging::{LogFormat, LogProfile};
use metrics::NodeMetrics;

/// File in the data directory holding the hex sponsor secret key.
const SPONSOR_KEY_FILE: &str = "sponsor.key";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = WaypointNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Salt(args) => {
            print_salt(args);
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the API server, the metrics endpoint and the devnet epoch clock.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(LogProfile::Server, LogFormat::from_str_lossy(&args.log_format));

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        client_id = %args.client_id,
        data_dir = %args.data_dir.display(),
        "starting waypoint-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = WaypointDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), users = db.user_count(), "database opened");

    // --- Sponsor key ---
    let sponsor = load_sponsor_key(args.sponsor_key.as_deref(), &args.data_dir)?;

    // --- Devnet ledger ---
    let ledger = Arc::new(DevnetLedger::new());
    let sponsor_address = waypoint_protocol::identity::LedgerAddress::from_public_key(&sponsor.public_key());
    ledger.credit(sponsor_address, NATIVE_COIN_TYPE, args.sponsor_funding);
    tracing::info!(sponsor = %sponsor_address, funding = args.sponsor_funding, "sponsor funded on devnet");

    // --- Sponsor service ---
    let config = BridgeConfig {
        client_id: args.client_id.clone(),
        epoch_window: args.epoch_window,
        ..BridgeConfig::default()
    };
    let service = Arc::new(SponsorService::new(&config, sponsor, ledger.clone(), db));

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (tx v{})", env!("CARGO_PKG_VERSION"), TRANSACTION_VERSION),
        network: "devnet".to_string(),
        service,
        ledger: Arc::clone(&ledger),
        metrics: Arc::clone(&node_metrics),
        faucet_amount: args.faucet_amount,
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Epoch clock ---
    let epoch_ledger = Arc::clone(&ledger);
    let epoch_secs = args.epoch_secs.max(1);
    let epoch_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(epoch_secs));
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let epoch = epoch_ledger.advance_epoch();
            tracing::debug!(epoch, "devnet epoch advanced");
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    epoch_loop.abort();
    tracing::info!("waypoint-node stopped");
    Ok(())
}

/// Sponsor key from the flag if given, else from the data directory.
fn load_sponsor_key(flag: Option<&str>, data_dir: &Path) -> Result<LedgerKeypair> {
    if let Some(hex_key) = flag {
        return LedgerKeypair::from_hex(hex_key.trim()).context("invalid --sponsor-key");
    }
    let key_path = data_dir.join(SPONSOR_KEY_FILE);
    let hex_key = std::fs::read_to_string(&key_path).with_context(|| {
        format!(
            "failed to read sponsor key from {} (run `waypoint-node init` first)",
            key_path.display()
        )
    })?;
    LedgerKeypair::from_hex(hex_key.trim())
        .with_context(|| format!("invalid sponsor key in {}", key_path.display()))
}

/// Initializes a data directory and generates a sponsor keypair.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging(LogProfile::Setup, LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join(SPONSOR_KEY_FILE);
    if key_path.exists() && !args.force {
        anyhow::bail!(
            "sponsor key already exists at {} (pass --force to replace it)",
            key_path.display()
        );
    }

    let keypair = LedgerKeypair::generate();
    let pubkey_hex = keypair.public_key().to_hex();
    let address = waypoint_protocol::identity::LedgerAddress::from_public_key(&keypair.public_key());

    std::fs::write(&key_path, hex::encode(keypair.secret_key_bytes()))
        .with_context(|| format!("failed to write sponsor key to {}", key_path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", key_path.display()))?;
    }

    tracing::info!(
        public_key = %pubkey_hex,
        key_path = %key_path.display(),
        "sponsor keypair generated"
    );

    println!("Node initialized successfully.");
    println!("  Data directory  : {}", data_dir.display());
    println!("  Sponsor key     : {}", key_path.display());
    println!("  Public key      : {}", pubkey_hex);
    println!("  Sponsor address : {}", address);

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.api_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")?;

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?;
    if !response.status().is_success() {
        anyhow::bail!("{} returned HTTP {}", url, response.status());
    }
    let body: serde_json::Value = response.json().await.context("invalid status response")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// Prints the salt a subject id derives.
fn print_salt(args: cli::SaltArgs) {
    let salt = match args.prefix.as_deref() {
        Some(prefix) => derive_salt_with_prefix(prefix, &args.subject),
        None => derive_salt(&args.subject),
    };
    println!("{}", salt);
}

/// Prints version information to stdout.
fn print_version() {
    println!("waypoint-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", PROTOCOL_VERSION);
    println!("transaction   v{}", TRANSACTION_VERSION);
    println!("rustc         {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
