//! Metrics collection and exposition.
//!
//! # Metrics
//! - `seed_maintenance_runs_total` (counter): maintenance iterations by task, outcome
//! - `seed_routing_table_peers` (gauge): current routing table size
//! - `seed_static_peers_missing` (gauge): static peers absent at the last reconciliation
//! - `seed_inbound_messages_total` (counter): inbound messages by kind
//! - `seed_transport_busy_workers` (gauge): inbound connections holding a worker slot
//! - `seed_routing_table_deferred_total` (counter): new peers sent to the replacement cache because the table was full
//!
//! Recording is a no-op until `init_metrics` installs the Prometheus recorder.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_maintenance_run(task: &str, outcome: &'static str) {
    counter!(
        "seed_maintenance_runs_total",
        "task" => task.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_table_size(peers: usize) {
    gauge!("seed_routing_table_peers").set(peers as f64);
}

pub fn record_static_peers_missing(missing: usize) {
    gauge!("seed_static_peers_missing").set(missing as f64);
}

pub fn record_inbound(kind: &'static str) {
    counter!("seed_inbound_messages_total", "kind" => kind).increment(1);
}

pub fn record_busy_workers(busy: usize) {
    gauge!("seed_transport_busy_workers").set(busy as f64);
}

pub fn record_table_deferred() {
    counter!("seed_routing_table_deferred_total").increment(1);
}
