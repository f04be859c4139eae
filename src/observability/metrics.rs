//! Metrics collection and exposition.
//!
//! # Metrics
//! - `logwire_config_connections_total` (counter): connections accepted by the listener
//! - `logwire_reconfigurations_total` (counter): documents received, by outcome
//! - `logwire_config_bytes_total` (counter): payload bytes received
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - The Prometheus endpoint is opt-in, installed only by the daemon

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_connection() {
    metrics::counter!("logwire_config_connections_total").increment(1);
}

/// `outcome` is one of `applied`, `protocol_error`, `rejected`,
/// `decode_error`, `destructive`, `engine_error`.
pub fn record_reconfiguration(outcome: &'static str) {
    metrics::counter!("logwire_reconfigurations_total", "outcome" => outcome).increment(1);
}

pub fn record_payload_bytes(bytes: usize) {
    metrics::counter!("logwire_config_bytes_total").increment(bytes as u64);
}
