//! Order routes: checkout and the caller's order history.
//!
//! Checkout snapshots the cart into an order through the compensating saga
//! in [`crate::order`], then kicks off project creation. The order stands
//! on its own: a failed project creation is logged and left for an admin to
//! retry from the back office, never rolled back into the checkout.

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::events::Change;
use crate::order::{self, CreateOrderOutcome};
use crate::project::CreateProjectOutcome;

use super::middleware_auth::RequireAuth;
use super::routes_catalog::{bad_request, internal_error, not_found};
use super::AppState;

#[derive(Deserialize)]
pub(super) struct CheckoutPayload {
    pub payment_method: Option<String>,
    pub installment_plan: Option<i32>,
    /// Optional display name for the project created from this order.
    pub project_name: Option<String>,
}

/// `POST /api/orders`
pub(super) async fn handler_checkout(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<CheckoutPayload>,
) -> Response {
    if let Some(months) = payload.installment_plan {
        if !(1..=36).contains(&months) {
            return bad_request("installment_plan must be between 1 and 36 months");
        }
    }

    let outcome = match order::create_order_from_cart(
        &state.db,
        &user.user_id,
        payload.payment_method.as_deref(),
        payload.installment_plan,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => return internal_error(e),
    };

    let order_id = match outcome {
        CreateOrderOutcome::Created { order_id } => order_id,
        CreateOrderOutcome::EmptyCart => {
            return (
                StatusCode::CONFLICT,
                Json(serde_json::json!({"error": "Cart is empty"})),
            )
                .into_response();
        }
        CreateOrderOutcome::NoPackInCart => {
            return (
                StatusCode::CONFLICT,
                Json(serde_json::json!({"error": "Cart has no pack"})),
            )
                .into_response();
        }
    };

    state.prom_metrics.orders_created.inc();
    state.feed.emit(Change::OrderCreated {
        order_id,
        user_id: user.user_id.clone(),
    });

    let project_id = match crate::project::create_project_from_order(
        &state.db,
        state.functions.as_ref(),
        order_id,
        payload.project_name.as_deref(),
    )
    .await
    {
        Ok(CreateProjectOutcome::Created { project_id }) => {
            state.prom_metrics.projects_created.inc();
            state.feed.emit(Change::ProjectCreated {
                project_id,
                order_id,
            });
            Some(project_id)
        }
        Ok(other) => {
            tracing::warn!(order_id, ?other, "project not created after checkout");
            None
        }
        Err(e) => {
            tracing::warn!(order_id, error = %e, "project creation failed after checkout");
            None
        }
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "order_id": order_id,
            "project_id": project_id,
        })),
    )
        .into_response()
}

/// `GET /api/orders`
pub(super) async fn handler_list_orders(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Response {
    match order::get_user_orders(&state.db, &user.user_id).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal_error(e),
    }
}

/// `GET /api/orders/{order_id}`. Owners and admins only.
pub(super) async fn handler_get_order(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(order_id): AxumPath<i64>,
) -> Response {
    match order::get_order_with_items(&state.db, order_id).await {
        Ok(Some(view)) => {
            if view.order.user_id != user.user_id && !user.is_admin() {
                return not_found("Order not found");
            }
            Json(view).into_response()
        }
        Ok(None) => not_found("Order not found"),
        Err(e) => internal_error(e),
    }
}
