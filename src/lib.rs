pub mod api;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::ServerConfig;
use crate::infrastructure::{InMemoryRecordStore, InMemoryTempStore};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post, put},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub temp_store: InMemoryTempStore,
    pub records: InMemoryRecordStore,
    pub config: ServerConfig,
}

impl AppState {
    /// In-memory backend enforcing the configured upload rules.
    pub fn in_memory(config: ServerConfig) -> Self {
        let temp_store = InMemoryTempStore::with_rules(config.upload.rules());
        let records = InMemoryRecordStore::new(temp_store.clone());
        Self {
            temp_store,
            records,
            config,
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    let allow_origin = if origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}

pub fn create_app(state: AppState) -> Router {
    let max_body = usize::try_from(state.config.upload.max_file_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(10 * 1024 * 1024); // Add 10MB buffer for multipart overhead

    Router::new()
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/system/validation-rules",
            get(api::handlers::health::get_validation_rules),
        )
        .route(
            "/temp-objects",
            put(api::handlers::temp_objects::upload_temp_object),
        )
        .route(
            "/temp-objects/:token",
            axum::routing::delete(api::handlers::temp_objects::delete_temp_object),
        )
        .route(
            "/temp-objects/:token/preview",
            get(api::handlers::temp_objects::preview_temp_object),
        )
        .route(
            "/temp-objects/:token/download",
            get(api::handlers::temp_objects::download_temp_object),
        )
        .route(
            "/records",
            post(api::handlers::records::create_record).get(api::handlers::records::list_records),
        )
        .route("/records/:id", get(api::handlers::records::get_record))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}
