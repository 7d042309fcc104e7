//! # Prometheus Metrics
//!
//! Operational metrics for the sponsor backend and the devnet ledger,
//! scraped at `/metrics` on the metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] with the
//! `waypoint` prefix.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Metric handles shared by request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Users registered for the first time.
    pub registrations_total: IntCounter,
    /// Transactions co-signed by the sponsor.
    pub sponsorships_total: IntCounter,
    /// Sponsorship requests refused or failed.
    pub sponsorship_failures_total: IntCounter,
    /// Co-signed transactions executed by the ledger.
    pub ledger_executions_total: IntCounter,
    /// Co-signed transactions the ledger refused.
    pub ledger_rejections_total: IntCounter,
    /// Time to answer `POST /sponsor`, in seconds.
    pub sponsor_latency_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("waypoint".into()), None)?;

        let registrations_total = counter(
            &registry,
            "registrations_total",
            "Users registered for the first time",
        )?;
        let sponsorships_total = counter(
            &registry,
            "sponsorships_total",
            "Transactions co-signed by the sponsor",
        )?;
        let sponsorship_failures_total = counter(
            &registry,
            "sponsorship_failures_total",
            "Sponsorship requests refused or failed",
        )?;
        let ledger_executions_total = counter(
            &registry,
            "ledger_executions_total",
            "Co-signed transactions executed by the ledger",
        )?;
        let ledger_rejections_total = counter(
            &registry,
            "ledger_rejections_total",
            "Co-signed transactions refused by the ledger",
        )?;

        let sponsor_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "sponsor_latency_seconds",
                "Time to answer a sponsorship request in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(sponsor_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            registrations_total,
            sponsorships_total,
            sponsorship_failures_total,
            ledger_executions_total,
            ledger_rejections_total,
            sponsor_latency_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
