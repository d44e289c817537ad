//! Metrics (C9, §4.9) recorded through the `metrics` facade, with a
//! Prometheus recorder installed once at boot — SPEC_FULL §4.9a mirrors the
//! teacher's "install a global recorder/subscriber once" shape
//! (`tracing_subscriber::fmt().init()` in `services/server::main`).
//!
//! The scrape endpoint itself is an edge concern per §1's Non-goals on
//! "metrics export endpoints"; this module only installs the recorder and
//! exposes the rendered snapshot for whatever mounts it.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn install() -> PrometheusHandle {
    PrometheusBuilder::new().install_recorder().expect("failed to install prometheus recorder")
}

/// Command counters/histograms labeled by (device, module, action, status) —
/// the dimensions §4.9 calls out.
pub fn record_command(device_id: &str, module: Option<&str>, action: &str, status: &str) {
    metrics::counter!(
        "hub_commands_total",
        "device" => device_id.to_owned(),
        "module" => module.unwrap_or("-").to_owned(),
        "action" => action.to_owned(),
        "status" => status.to_owned(),
    )
    .increment(1);
}

pub fn record_command_duration(device_id: &str, module: &str, action: &str, duration_ms: i64) {
    metrics::histogram!(
        "hub_command_duration_ms",
        "device" => device_id.to_owned(),
        "module" => module.to_owned(),
        "action" => action.to_owned(),
    )
    .record(duration_ms.max(0) as f64);
}

pub fn record_bus_publish(topic: &str, bytes: usize) {
    metrics::counter!("hub_bus_out_total", "topic" => topic.to_owned()).increment(1);
    metrics::histogram!("hub_bus_out_bytes", "topic" => topic.to_owned()).record(bytes as f64);
}

pub fn record_bus_inbound(topic: &str, bytes: usize) {
    metrics::counter!("hub_bus_in_total", "topic" => topic.to_owned()).increment(1);
    metrics::histogram!("hub_bus_in_bytes", "topic" => topic.to_owned()).record(bytes as f64);
}

pub fn record_persistence_op(op: &str, duration_ms: f64, ok: bool) {
    metrics::counter!("hub_persistence_ops_total", "op" => op.to_owned(), "ok" => ok.to_string()).increment(1);
    metrics::histogram!("hub_persistence_latency_ms", "op" => op.to_owned()).record(duration_ms);
}

pub fn set_connected_devices(count: usize) {
    metrics::gauge!("hub_connected_devices").set(count as f64);
}

pub fn set_pending_correlations(count: usize) {
    metrics::gauge!("hub_pending_correlations").set(count as f64);
}

pub fn set_active_dlq_entries(count: i64) {
    metrics::gauge!("hub_dlq_active_entries").set(count as f64);
}
