//! # Node Logging
//!
//! `tracing` setup for the `waypoint-node` binary. Only `run` and `init`
//! install a subscriber. `status`, `salt` and `version` print their result
//! on stdout and log nothing, so their output can be piped into `jq` or a
//! shell variable untouched.
//!
//! When a subscriber is installed it writes to stderr. `RUST_LOG`
//! replaces the profile's default filter entirely.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Which subcommand is logging, and so which default filter applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogProfile {
    /// The long-running backend. Request spans from tower-http are kept at
    /// debug so every `/sponsor`, `/user` and `/rpc` call is traced.
    Server,
    /// One-shot setup such as `init`. Node progress lines only.
    Setup,
}

impl LogProfile {
    pub fn default_filter(self) -> &'static str {
        match self {
            LogProfile::Server => "waypoint_node=info,waypoint_protocol=info,tower_http=debug",
            LogProfile::Setup => "waypoint_node=info",
        }
    }
}

/// Output format, from `--log-format` / `WAYPOINT_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored, with file and line. The default.
    Pretty,
    /// JSON lines for a log shipper.
    Json,
}

impl LogFormat {
    /// `"json"` in any case selects JSON. Anything else is pretty.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// `RUST_LOG` if it parses, otherwise the profile default.
fn filter_for(profile: LogProfile) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(profile.default_filter()))
}

/// Install the global subscriber. Call once, before the first log line.
pub fn init_logging(profile: LogProfile, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(filter_for(profile));

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .init(),
    }

    tracing::debug!(?profile, ?format, "logging initialized");
}
