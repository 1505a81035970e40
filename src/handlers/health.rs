//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
    model_ready: bool,
    profile: &'static str,
    reference_rows: usize,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state.session.classifier.model();

    Json(HealthResponse {
        status: if model.is_some() { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
        model_ready: model.is_some(),
        profile: state.session.profile.as_str(),
        reference_rows: model.map(|m| m.len()).unwrap_or(0),
    })
}
