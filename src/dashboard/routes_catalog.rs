//! Public catalog routes: packs and services, list and detail.
//!
//! These endpoints are unauthenticated; only active catalog rows are
//! exposed. The admin back office reads the full catalog through the
//! admin routes instead.

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use super::AppState;

/// `GET /api/packs`
pub(super) async fn handler_list_packs(State(state): State<Arc<AppState>>) -> Response {
    match state.db.get_active_packs().await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error(e),
    }
}

/// `GET /api/packs/{slug}`
pub(super) async fn handler_get_pack(
    State(state): State<Arc<AppState>>,
    AxumPath(slug): AxumPath<String>,
) -> Response {
    match state.db.get_pack_by_slug(&slug).await {
        Ok(Some(pack)) if pack.is_active => Json(pack).into_response(),
        Ok(_) => not_found("Pack not found"),
        Err(e) => internal_error(e),
    }
}

/// `GET /api/services`
pub(super) async fn handler_list_services(State(state): State<Arc<AppState>>) -> Response {
    match state.db.get_active_services().await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error(e),
    }
}

/// `GET /api/services/{slug}`
pub(super) async fn handler_get_service(
    State(state): State<Arc<AppState>>,
    AxumPath(slug): AxumPath<String>,
) -> Response {
    match state.db.get_service_by_slug(&slug).await {
        Ok(Some(service)) if service.is_active => Json(service).into_response(),
        Ok(_) => not_found("Service not found"),
        Err(e) => internal_error(e),
    }
}

pub(super) fn internal_error(e: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": e.to_string()})),
    )
        .into_response()
}

pub(super) fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

pub(super) fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}
