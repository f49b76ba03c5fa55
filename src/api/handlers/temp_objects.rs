use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::api::error::AppError;
use crate::infrastructure::TempObject;
use crate::utils::filename::{content_disposition, is_previewable, strip_staging_prefix};

#[derive(Debug, Serialize, Deserialize)]
pub struct TempObjectResponse {
    pub token: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

fn multipart_error(e: MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}

/// `PUT /temp-objects`: stores the `file` part and answers with its token.
pub async fn upload_temp_object(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<TempObjectResponse>), AppError> {
    let mut upload: Option<(Option<String>, Option<String>, Bytes)> = None;
    let mut original_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                upload = Some((file_name, content_type, bytes));
            }
            "original_name" => {
                original_name = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("Missing 'file' field".to_string()))?;
    let file_name = file_name
        .filter(|n| !n.trim().is_empty())
        .or(original_name)
        .ok_or_else(|| AppError::BadRequest("Missing file name".to_string()))?;

    let size_bytes = bytes.len() as u64;
    let token = state
        .temp_store
        .stage(&file_name, content_type.as_deref(), bytes)
        .inspect_err(|e| tracing::warn!("Rejected staged upload '{}': {}", file_name, e))?;

    let object = state
        .temp_store
        .get(token.as_str())
        .ok_or_else(|| AppError::Internal(format!("staged object {token} vanished")))?;
    tracing::info!("📦 Staged '{}' ({} bytes) as {}", file_name, size_bytes, token);

    Ok((
        StatusCode::CREATED,
        Json(TempObjectResponse {
            token: token.to_string(),
            file_name: strip_staging_prefix(&object.stored_name).to_string(),
            content_type: object.content_type,
            size_bytes,
        }),
    ))
}

fn find_object(state: &AppState, token: &str) -> Result<TempObject, AppError> {
    state
        .temp_store
        .get(token)
        .ok_or_else(|| AppError::NotFound("Temporary file not found".to_string()))
}

fn object_response(object: TempObject, disposition_type: &str, file_name: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, object.content_type),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(disposition_type, file_name),
            ),
        ],
        object.bytes,
    )
        .into_response()
}

/// `GET /temp-objects/:token/preview`
pub async fn preview_temp_object(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let object = find_object(&state, &token)?;
    let file_name = strip_staging_prefix(&object.stored_name).to_string();
    let disposition = if is_previewable(&object.content_type) {
        "inline"
    } else {
        "attachment"
    };
    Ok(object_response(object, disposition, &file_name))
}

/// `GET /temp-objects/:token/download`: the suggested name keeps the staging
/// prefix, clients strip it.
pub async fn download_temp_object(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let object = find_object(&state, &token)?;
    let stored_name = object.stored_name.clone();
    Ok(object_response(object, "attachment", &stored_name))
}

/// `DELETE /temp-objects/:token`
pub async fn delete_temp_object(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    if !state.temp_store.remove(&token) {
        return Err(AppError::NotFound("Temporary file not found".to_string()));
    }
    tracing::info!("🗑️ Deleted staged object {}", token);
    Ok(Json(DeleteResponse { deleted: true }))
}
