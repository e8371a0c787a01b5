//! Locally mounted privileged function endpoints.
//!
//! Self-hosted deployments point `FUNCTIONS_URL` at this same server; these
//! routes accept the exact payloads [`crate::functions::HttpEdgeFunctions`]
//! sends and perform the writes directly, so the HTTP boundary works without
//! a separate functions runtime. The only credential accepted is the service
//! role key; user JWTs never reach these paths.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::project::MilestonePlan;

use super::routes_catalog::internal_error;
use super::AppState;

/// Service-key gate. `None` means the caller is authorized.
fn authorize_service(headers: &HeaderMap) -> Option<Response> {
    let key = std::env::var("SERVICE_ROLE_KEY").unwrap_or_default();
    if key.is_empty() {
        // Without a configured key there is no way to guard these routes.
        return Some(
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Functions endpoint not enabled"})),
            )
                .into_response(),
        );
    }

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    if presented != key {
        return Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "Invalid service credentials"})),
            )
                .into_response(),
        );
    }
    None
}

#[derive(Deserialize)]
pub(super) struct CreateMilestonesPayload {
    pub project_id: i64,
    pub milestones: Vec<MilestonePlan>,
}

/// `POST /functions/v1/create-milestones`
pub(super) async fn handler_create_milestones(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateMilestonesPayload>,
) -> Response {
    if let Some(resp) = authorize_service(&headers) {
        return resp;
    }
    match state
        .db
        .insert_milestones(payload.project_id, &payload.milestones)
        .await
    {
        Ok(()) => Json(serde_json::json!({
            "success": true,
            "created": payload.milestones.len(),
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct CreateUpdatePayload {
    pub project_id: i64,
    pub title: String,
    pub content: String,
}

/// `POST /functions/v1/create-project-update`
pub(super) async fn handler_create_project_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateUpdatePayload>,
) -> Response {
    if let Some(resp) = authorize_service(&headers) {
        return resp;
    }
    match state
        .db
        .insert_project_update(payload.project_id, &payload.title, &payload.content, None)
        .await
    {
        Ok(update_id) => {
            Json(serde_json::json!({"success": true, "update_id": update_id})).into_response()
        }
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct DeleteAccountPayload {
    pub user_id: String,
}

/// `POST /functions/v1/delete-account`
pub(super) async fn handler_delete_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<DeleteAccountPayload>,
) -> Response {
    if let Some(resp) = authorize_service(&headers) {
        return resp;
    }
    if let Err(e) = state.db.delete_carts_for_user(&payload.user_id).await {
        return internal_error(e);
    }
    match state.db.delete_user_profile(&payload.user_id).await {
        Ok(_) => Json(serde_json::json!({"success": true})).into_response(),
        Err(e) => internal_error(e),
    }
}
