use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::api::error::AppError;
use crate::infrastructure::DurableRecord;
use crate::models::ChildRecordRequest;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: i64,
}

/// `POST /records`: turns a staged object into a durable child record.
pub async fn create_record(
    State(state): State<AppState>,
    Json(request): Json<ChildRecordRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let record = state.records.create(&request)?;
    tracing::info!("✅ Created record {} '{}'", record.id, record.title);
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: record.id })))
}

pub async fn list_records(State(state): State<AppState>) -> Json<Vec<DurableRecord>> {
    Json(state.records.list())
}

pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DurableRecord>, AppError> {
    state
        .records
        .get(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Record {id} not found")))
}
