//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define engine metrics (subsystem state, failures, background work)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `engine_subsystem_running` (gauge): 1=running, 0=stopped, by subsystem
//! - `engine_subsystem_failures_total` (counter): by subsystem, phase, kind
//! - `engine_background_tasks` (gauge): tracked background tasks
//! - `engine_state` (gauge): 0=idle, 1=starting, 2=up, 3=stopping
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - Labels are subsystem names and stable error labels only

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::lifecycle::state::EngineState;

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_subsystem_running(subsystem: &str, running: bool) {
    gauge!("engine_subsystem_running", "subsystem" => subsystem.to_string())
        .set(if running { 1.0 } else { 0.0 });
}

/// `phase` is one of setup, start, stop.
pub fn record_subsystem_failure(subsystem: &str, phase: &'static str, kind: &'static str) {
    counter!(
        "engine_subsystem_failures_total",
        "subsystem" => subsystem.to_string(),
        "phase" => phase,
        "kind" => kind
    )
    .increment(1);
}

pub fn record_background_tasks(active: usize) {
    gauge!("engine_background_tasks").set(active as f64);
}

pub fn record_engine_state(state: EngineState) {
    gauge!("engine_state").set(f64::from(u8::from(state)));
}
