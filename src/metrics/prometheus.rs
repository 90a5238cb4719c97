use std::net::SocketAddr;

use anyhow::Context;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus HTTP exporter on `addr`.
/// After this call, any metrics recorded via the `metrics` crate
/// macros (counter!, histogram!) are exported at /metrics.
pub fn init_metrics_server(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to start Prometheus metrics server")
}

// ── Feed metrics ─────────────────────────────────────────────────

pub fn record_feed_events(count: usize) {
    counter!("feed_events_total").increment(count as u64);
}

pub fn record_listener_error() {
    counter!("feed_listener_errors_total").increment(1);
}

// ── Store metrics ────────────────────────────────────────────────

pub fn record_update_applied() {
    counter!("store_updates_applied_total").increment(1);
}

/// Update for an id the store does not hold.
pub fn record_update_dropped() {
    counter!("store_updates_dropped_total").increment(1);
}

// ── Projection metrics ───────────────────────────────────────────

pub fn record_projection(kind: &'static str) {
    counter!("projection_recomputes_total", "kind" => kind).increment(1);
}

// ── Fetch metrics ────────────────────────────────────────────────

pub fn record_fetch_attempt(outcome: &'static str) {
    counter!("fetch_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_fetch_latency_ms(latency_ms: f64) {
    histogram!("fetch_latency_ms").record(latency_ms);
}
