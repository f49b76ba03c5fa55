use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub staged_objects: usize,
    pub records: usize,
    pub version: String,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        staged_objects: state.temp_store.len(),
        records: state.records.len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Upload limits the server enforces, so a client can mirror them locally.
pub async fn get_validation_rules(
    State(state): State<AppState>,
) -> Json<crate::utils::validation::FileRules> {
    Json(state.config.upload.rules())
}
