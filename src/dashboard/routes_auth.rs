//! Auth API: the caller's own identity, profile edits, account deletion.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::routes_catalog::internal_error;
use super::AppState;

/// `GET /api/auth/me`. Identity, role, profile fields and the unread-update
/// badge in one call; a missing profile row is not an error.
pub(super) async fn handler_me(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Response {
    let profile = match state.db.get_user_profile(&user.user_id).await {
        Ok(profile) => profile,
        Err(e) => return internal_error(e),
    };
    let unread = match state.db.count_unread_updates_for_user(&user.user_id).await {
        Ok(count) => count,
        Err(e) => return internal_error(e),
    };
    Json(serde_json::json!({
        "user_id": user.user_id,
        "role": user.role,
        "profile": profile,
        "unread_updates": unread,
    }))
    .into_response()
}

#[derive(Deserialize)]
pub(super) struct ProfilePayload {
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
}

/// `PUT /api/auth/profile`. Upserts contact fields; the role column is
/// untouchable from here.
pub(super) async fn handler_update_profile(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<ProfilePayload>,
) -> Response {
    if let Err(e) = state
        .db
        .upsert_user_profile(
            &user.user_id,
            payload.full_name.as_deref(),
            payload.company.as_deref(),
            payload.phone.as_deref(),
        )
        .await
    {
        return internal_error(e);
    }
    match state.db.get_user_profile(&user.user_id).await {
        Ok(profile) => Json(serde_json::json!({"profile": profile})).into_response(),
        Err(e) => internal_error(e),
    }
}

/// `DELETE /api/auth/account`
///
/// Runs through the privileged boundary: profile and carts go, orders and
/// projects stay as business records. The Supabase auth user itself is
/// deleted by the function in production.
pub(super) async fn handler_delete_account(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Response {
    match state.functions.delete_account(&user.user_id).await {
        Ok(()) => Json(serde_json::json!({"deleted": true})).into_response(),
        Err(e) => internal_error(e),
    }
}
