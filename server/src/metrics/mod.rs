//! Prometheus metrics export
//!
//! The exporter runs on its own listener so the proxied namespace stays
//! untouched; every path on the main port belongs to the upstream.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use crate::config::MetricsConfig;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from inside a tokio runtime.
pub fn init_metrics(config: &MetricsConfig) -> Result<Option<SocketAddr>> {
    if !config.enabled {
        return Ok(None);
    }

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid metrics listen address: {}", config.listen_addr))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("zurg_edge_upstream_duration_seconds".to_string()),
            &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .context("Invalid histogram buckets")?
        .install()
        .context("Failed to install Prometheus exporter")?;

    Ok(Some(addr))
}

/// Record a proxied request and its final status
pub fn record_request(method: &str, status: u16) {
    counter!("zurg_edge_requests_total", "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record the time spent waiting for upstream response headers
pub fn record_upstream_duration(method: &str, duration_secs: f64) {
    histogram!("zurg_edge_upstream_duration_seconds", "method" => method.to_string()).record(duration_secs);
}

/// Record a request that never got an upstream response
pub fn record_upstream_error() {
    counter!("zurg_edge_upstream_errors_total").increment(1);
}

/// Record a rewritten multi-status body
pub fn record_body_rewrite() {
    counter!("zurg_edge_body_rewrites_total").increment(1);
}

/// Record a `getlastmodified` value that could not be converted
pub fn record_timestamp_failure() {
    counter!("zurg_edge_timestamp_failures_total").increment(1);
}

/// Record a rewritten `Location` header
pub fn record_location_rewrite() {
    counter!("zurg_edge_location_rewrites_total").increment(1);
}
