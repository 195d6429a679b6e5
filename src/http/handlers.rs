use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::lifecycle::{Roster, SubsystemStatus};

/// State shared by every API handler.
#[derive(Clone)]
pub struct ApiState {
    pub engine_name: Arc<str>,
    pub roster: Roster,
    pub started: Instant,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub name: String,
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub running: usize,
    pub subsystems: usize,
}

pub async fn get_health(State(state): State<ApiState>) -> Json<HealthStatus> {
    let statuses = state.roster.statuses();
    let running = statuses.iter().filter(|s| s.running).count();
    Json(HealthStatus {
        name: state.engine_name.to_string(),
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        running,
        subsystems: statuses.len(),
    })
}

pub async fn get_subsystems(State(state): State<ApiState>) -> Json<Vec<SubsystemStatus>> {
    Json(state.roster.statuses())
}

pub async fn get_subsystem(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.roster.statuses().into_iter().find(|s| s.name == name) {
        Some(status) => Json(status).into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown subsystem {name}")).into_response(),
    }
}
