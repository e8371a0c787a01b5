//! Admin back-office routes.
//!
//! Everything here sits behind the `RequireAdmin` extractor: client list and
//! detail, order triage, project lifecycle (status, milestones, updates),
//! mass broadcast, and the overview counters the dashboard landing page
//! renders.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::db::ClientFilter;
use crate::events::Change;
use crate::order::{self, OrderStatus};
use crate::project::{self, CreateProjectOutcome, ProjectStatus};

use super::middleware_auth::RequireAdmin;
use super::routes_catalog::{bad_request, internal_error, not_found};
use super::AppState;

const CLIENT_LIST_LIMIT: i64 = 200;

// ── Clients ─────────────────────────────────────────────────────

/// `GET /api/admin/clients?search=&sort_by=&sort_dir=`
pub(super) async fn handler_list_clients(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Query(filter): Query<ClientFilter>,
) -> Response {
    match state.db.get_clients(&filter, CLIENT_LIST_LIMIT).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error(e),
    }
}

/// `GET /api/admin/clients/{user_id}`. Profile plus order and project
/// history in one payload.
pub(super) async fn handler_get_client(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(user_id): AxumPath<String>,
) -> Response {
    let profile = match state.db.get_user_profile(&user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return not_found("Client not found"),
        Err(e) => return internal_error(e),
    };
    let orders = match state.db.get_orders_for_user(&user_id).await {
        Ok(rows) => rows,
        Err(e) => return internal_error(e),
    };
    let projects = match project::list_user_projects(&state.db, &user_id).await {
        Ok(rows) => rows,
        Err(e) => return internal_error(e),
    };
    Json(serde_json::json!({
        "profile": profile,
        "orders": orders,
        "projects": projects,
    }))
    .into_response()
}

#[derive(Deserialize)]
pub(super) struct SetRolePayload {
    pub role: String,
}

/// `PUT /api/admin/clients/{user_id}/role`
pub(super) async fn handler_set_role(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(user_id): AxumPath<String>,
    Json(payload): Json<SetRolePayload>,
) -> Response {
    if payload.role != "client" && payload.role != "admin" {
        return bad_request("role must be \"client\" or \"admin\"");
    }
    match state.db.set_user_role(&user_id, &payload.role).await {
        Ok(true) => Json(serde_json::json!({"updated": true})).into_response(),
        Ok(false) => not_found("Client not found"),
        Err(e) => internal_error(e),
    }
}

// ── Orders ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RecentOrdersQuery {
    #[serde(default)]
    limit: Option<i64>,
}

/// `GET /api/admin/orders?limit=50`
pub(super) async fn handler_recent_orders(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<RecentOrdersQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    match state.db.get_recent_orders(limit).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct SetOrderStatusPayload {
    pub status: String,
    pub payment_id: Option<String>,
}

/// `PUT /api/admin/orders/{order_id}/status`. Any known status is accepted;
/// there is no transition matrix.
pub(super) async fn handler_set_order_status(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(order_id): AxumPath<i64>,
    Json(payload): Json<SetOrderStatusPayload>,
) -> Response {
    let Some(status) = OrderStatus::parse(&payload.status) else {
        return bad_request("Unknown order status");
    };
    match order::update_order_status(&state.db, order_id, status, payload.payment_id.as_deref())
        .await
    {
        Ok(true) => Json(serde_json::json!({"updated": true})).into_response(),
        Ok(false) => not_found("Order not found"),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct CreateProjectPayload {
    pub name: Option<String>,
}

/// `POST /api/admin/orders/{order_id}/project`
///
/// Back-office retry for the project creation that normally happens right
/// after checkout.
pub(super) async fn handler_create_project(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(order_id): AxumPath<i64>,
    Json(payload): Json<CreateProjectPayload>,
) -> Response {
    match project::create_project_from_order(
        &state.db,
        state.functions.as_ref(),
        order_id,
        payload.name.as_deref(),
    )
    .await
    {
        Ok(CreateProjectOutcome::Created { project_id }) => {
            state.prom_metrics.projects_created.inc();
            state.feed.emit(Change::ProjectCreated {
                project_id,
                order_id,
            });
            (
                StatusCode::CREATED,
                Json(serde_json::json!({"project_id": project_id})),
            )
                .into_response()
        }
        Ok(CreateProjectOutcome::OrderNotFound) => not_found("Order not found"),
        Ok(CreateProjectOutcome::NoPackInOrder) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": "Order has no pack item"})),
        )
            .into_response(),
        Ok(CreateProjectOutcome::AlreadyExists { project_id }) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "Order already has a project",
                "project_id": project_id,
            })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Projects ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct ProjectListQuery {
    status: Option<String>,
}

/// `GET /api/admin/projects?status=in_progress`
pub(super) async fn handler_list_all_projects(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<ProjectListQuery>,
) -> Response {
    let status_filter = match query.status.as_deref() {
        Some(raw) => match ProjectStatus::parse(raw) {
            Some(status) => Some(status),
            None => return bad_request("Unknown project status"),
        },
        None => None,
    };
    match project::list_projects(&state.db, status_filter).await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct SetStatusPayload {
    pub status: String,
}

/// `PUT /api/admin/projects/{project_id}/status`
pub(super) async fn handler_set_project_status(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(project_id): AxumPath<i64>,
    Json(payload): Json<SetStatusPayload>,
) -> Response {
    let Some(status) = ProjectStatus::parse(&payload.status) else {
        return bad_request("Unknown project status");
    };
    match project::set_project_status(&state.db, project_id, status).await {
        Ok(true) => {
            state.feed.emit(Change::ProjectStatusChanged {
                project_id,
                status: status.as_str().to_string(),
            });
            Json(serde_json::json!({"updated": true})).into_response()
        }
        Ok(false) => not_found("Project not found"),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct MilestonePayload {
    pub is_completed: bool,
}

/// `PUT /api/admin/projects/{project_id}/milestones/{milestone_id}`
pub(super) async fn handler_set_milestone(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath((project_id, milestone_id)): AxumPath<(i64, i64)>,
    Json(payload): Json<MilestonePayload>,
) -> Response {
    match state
        .db
        .set_milestone_completed(project_id, milestone_id, payload.is_completed)
        .await
    {
        Ok(true) => {
            state.feed.emit(Change::MilestoneToggled {
                project_id,
                milestone_id,
                is_completed: payload.is_completed,
            });
            Json(serde_json::json!({"updated": true})).into_response()
        }
        Ok(false) => not_found("Milestone not found"),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct PostUpdatePayload {
    pub title: String,
    pub content: String,
}

/// `POST /api/admin/projects/{project_id}/updates`
pub(super) async fn handler_post_update(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    AxumPath(project_id): AxumPath<i64>,
    Json(payload): Json<PostUpdatePayload>,
) -> Response {
    if payload.title.trim().is_empty() || payload.content.trim().is_empty() {
        return bad_request("title and content must not be empty");
    }
    match project::post_project_update(
        &state.db,
        project_id,
        &payload.title,
        &payload.content,
        Some(&admin.user_id),
    )
    .await
    {
        Ok(Some(update_id)) => {
            state.prom_metrics.updates_posted.inc();
            state.feed.emit(Change::UpdatePosted {
                project_id,
                update_id,
                title: payload.title.clone(),
            });
            (
                StatusCode::CREATED,
                Json(serde_json::json!({"update_id": update_id})),
            )
                .into_response()
        }
        Ok(None) => not_found("Project not found"),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct BroadcastPayload {
    pub status: Option<String>,
    pub title: String,
    pub content: String,
}

/// `POST /api/admin/broadcast`. One update into every project matching the
/// status filter; failures are reported, not fatal.
pub(super) async fn handler_broadcast(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Json(payload): Json<BroadcastPayload>,
) -> Response {
    if payload.title.trim().is_empty() || payload.content.trim().is_empty() {
        return bad_request("title and content must not be empty");
    }
    let status_filter = match payload.status.as_deref() {
        Some(raw) => match ProjectStatus::parse(raw) {
            Some(status) => Some(status),
            None => return bad_request("Unknown project status"),
        },
        None => None,
    };
    match project::broadcast_update(&state.db, status_filter, &payload.title, &payload.content)
        .await
    {
        Ok(report) => {
            state.prom_metrics.updates_posted.inc_by(report.posted as u64);
            Json(report).into_response()
        }
        Err(e) => internal_error(e),
    }
}

// ── Overview ────────────────────────────────────────────────────

/// `GET /api/admin/overview`. The counters behind the back-office landing
/// page; mirrors what the maintenance tick exports as gauges.
pub(super) async fn handler_overview(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> Response {
    let orders_by_status = match state.db.count_orders_by_status().await {
        Ok(counts) => counts,
        Err(e) => return internal_error(e),
    };
    let projects_in_progress = match state.db.count_projects_in_progress().await {
        Ok(n) => n,
        Err(e) => return internal_error(e),
    };
    let active_carts = match state.db.count_active_carts().await {
        Ok(n) => n,
        Err(e) => return internal_error(e),
    };
    let duplicate_cart_users = match state.db.count_users_with_duplicate_carts().await {
        Ok(n) => n,
        Err(e) => return internal_error(e),
    };
    let orphaned_paid_orders = match state.db.count_orphaned_paid_orders().await {
        Ok(n) => n,
        Err(e) => return internal_error(e),
    };
    let guest_carts = {
        let store = super::lock_or_recover(&state.anon_carts);
        store.len()
    };

    Json(serde_json::json!({
        "orders_by_status": orders_by_status,
        "projects_in_progress": projects_in_progress,
        "active_carts": active_carts,
        "duplicate_cart_users": duplicate_cart_users,
        "orphaned_paid_orders": orphaned_paid_orders,
        "guest_carts": guest_carts,
    }))
    .into_response()
}
