//! Per-project WebSocket: live change notifications plus periodic refreshes.
//!
//! `GET /ws/projects/{id}?token=<jwt>`. Browsers cannot set an
//! `Authorization` header on a WebSocket upgrade, so the JWT travels as a
//! query parameter and goes through the same resolution as the header path.
//! Only the project owner and admins may subscribe.
//!
//! After the upgrade the session receives one snapshot message, then every
//! change notice touching the project as it happens, and a fresh snapshot
//! every 30 seconds (progress is time-derived, so it moves even when no row
//! changes).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::project;

use super::{middleware_auth, AppState};

const SNAPSHOT_CHANGES: usize = 50;
const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
pub(super) struct WsQuery {
    token: Option<String>,
}

pub(super) async fn handler_ws_project(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    AxumPath(project_id): AxumPath<i64>,
    Query(query): Query<WsQuery>,
) -> Response {
    let Some(token) = query.token.as_deref() else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Authentication required"})),
        )
            .into_response();
    };
    let Some(user) = middleware_auth::resolve_token(&state, token).await else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Authentication required"})),
        )
            .into_response();
    };

    match state.db.get_project(project_id).await {
        Ok(Some(row)) if row.user_id == user.user_id || user.is_admin() => {}
        Ok(_) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Project not found"})),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    }

    let notif_rx = state.feed.subscribe();
    ws.on_upgrade(move |socket| ws_loop(socket, state, project_id, notif_rx))
}

async fn ws_loop(
    mut socket: WebSocket,
    state: Arc<AppState>,
    project_id: i64,
    mut notif_rx: tokio::sync::broadcast::Receiver<String>,
) {
    if let Some(msg) = build_snapshot(&state, project_id).await {
        if socket.send(Message::Text(msg.into())).await.is_err() {
            return;
        }
    }

    let mut interval = tokio::time::interval(REFRESH_INTERVAL);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(msg) = build_snapshot(&state, project_id).await {
                    if socket.send(Message::Text(msg.into())).await.is_err() {
                        break;
                    }
                }
            }
            result = notif_rx.recv() => {
                match result {
                    Ok(msg) => {
                        if notice_touches_project(&msg, project_id)
                            && socket.send(Message::Text(msg.into())).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(_) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }
}

/// The broadcast payload is already JSON text; peek at its project id
/// instead of re-serializing per subscriber.
fn notice_touches_project(msg: &str, project_id: i64) -> bool {
    serde_json::from_str::<serde_json::Value>(msg)
        .ok()
        .and_then(|v| v["change"]["project_id"].as_i64())
        .is_some_and(|id| id == project_id)
}

async fn build_snapshot(state: &Arc<AppState>, project_id: i64) -> Option<String> {
    let details = match project::get_project_details(&state.db, project_id).await {
        Ok(Some(details)) => details,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(project_id, error = %e, "snapshot build failed");
            return None;
        }
    };
    let changes = state.feed.recent_changes(SNAPSHOT_CHANGES, Some(project_id));
    serde_json::to_string(&serde_json::json!({
        "type": "snapshot",
        "project": details,
        "changes": changes,
    }))
    .ok()
}
