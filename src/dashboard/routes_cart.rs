//! Cart routes, authenticated and guest.
//!
//! The authenticated cart lives in PostgreSQL and is addressed through the
//! caller's JWT. The guest cart lives in the local snapshot store and is
//! addressed by the `x-guest-token` header the storefront generates per
//! browser. Both paths map [`CartMutation`] outcomes to the same status
//! codes, so the storefront handles pack-rule rejections and the last-pack
//! confirmation gate identically before and after login.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::anon_cart::GuestCart;
use crate::cart::{self, CartMutation, ItemDetails, ItemKind};

use super::middleware_auth::RequireAuth;
use super::routes_catalog::{bad_request, internal_error, not_found};
use super::{lock_or_recover, AppState};

const GUEST_TOKEN_HEADER: &str = "x-guest-token";

// ── Shared payloads and mappings ────────────────────────────────

#[derive(Deserialize)]
pub(super) struct AddItemPayload {
    pub item_type: String,
    pub item_id: i64,
}

#[derive(Deserialize)]
pub(super) struct QuantityPayload {
    pub quantity: i32,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Deserialize)]
pub(super) struct ConfirmQuery {
    #[serde(default)]
    pub confirm: bool,
}

/// Map a cart mutation outcome onto the wire. Rule violations are contract
/// statuses, not 500s: the pack rule and the unconfirmed cascade both come
/// back as 409 so the storefront can react.
fn mutation_response<T: Serialize>(mutation: CartMutation<T>) -> Response {
    match mutation {
        CartMutation::Applied(line) => Json(serde_json::json!({"item": line})).into_response(),
        CartMutation::NoPackInCart => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "A pack is required before adding services"
            })),
        )
            .into_response(),
        CartMutation::UnknownItem => not_found("Item not found"),
        CartMutation::NeedsConfirmation(impact) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "confirm_required": true,
                "impact": impact,
            })),
        )
            .into_response(),
        CartMutation::Removed { cascaded } => {
            Json(serde_json::json!({"removed": true, "cascaded_services": cascaded}))
                .into_response()
        }
        CartMutation::NotFound => not_found("Cart item not found"),
    }
}

// ── Authenticated cart ──────────────────────────────────────────

/// `GET /api/cart`. Reading the cart also merges duplicate carts for the
/// user, so this is the canonical entry point after login.
pub(super) async fn handler_get_cart(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Response {
    match cart::get_cart_with_items(&state.db, &user.user_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => internal_error(e),
    }
}

/// `POST /api/cart/items`
pub(super) async fn handler_add_cart_item(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<AddItemPayload>,
) -> Response {
    let result = match ItemKind::parse(&payload.item_type) {
        Some(ItemKind::Pack) => {
            cart::add_pack_to_cart(&state.db, &user.user_id, payload.item_id).await
        }
        Some(ItemKind::Service) => {
            cart::add_service_to_cart(&state.db, &user.user_id, payload.item_id).await
        }
        None => return bad_request("item_type must be \"pack\" or \"service\""),
    };
    match result {
        Ok(mutation) => mutation_response(mutation),
        Err(e) => internal_error(e),
    }
}

/// `PUT /api/cart/items/{item_id}`
pub(super) async fn handler_update_cart_item(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(item_id): AxumPath<i64>,
    Json(payload): Json<QuantityPayload>,
) -> Response {
    match cart::update_cart_item_quantity(
        &state.db,
        &user.user_id,
        item_id,
        payload.quantity,
        payload.confirm,
    )
    .await
    {
        Ok(mutation) => mutation_response(mutation),
        Err(e) => internal_error(e),
    }
}

/// `GET /api/cart/items/{item_id}/impact`
pub(super) async fn handler_cart_item_impact(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(item_id): AxumPath<i64>,
) -> Response {
    match cart::removal_impact(&state.db, &user.user_id, item_id).await {
        Ok(Some(impact)) => Json(impact).into_response(),
        Ok(None) => not_found("Cart item not found"),
        Err(e) => internal_error(e),
    }
}

/// `DELETE /api/cart/items/{item_id}?confirm=true`
pub(super) async fn handler_remove_cart_item(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(item_id): AxumPath<i64>,
    Query(query): Query<ConfirmQuery>,
) -> Response {
    match cart::remove_cart_item(&state.db, &user.user_id, item_id, query.confirm).await {
        Ok(mutation) => mutation_response(mutation),
        Err(e) => internal_error(e),
    }
}

/// `DELETE /api/cart`
pub(super) async fn handler_clear_cart(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Response {
    match cart::clear_cart(&state.db, &user.user_id).await {
        Ok(cleared) => Json(serde_json::json!({"cleared": cleared})).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct MigratePayload {
    pub guest_token: String,
}

/// `POST /api/cart/migrate`
///
/// Replays the guest cart into the caller's database cart. The snapshot
/// entry is drained only after the replay succeeds, so a failed migration
/// leaves the guest cart intact for a retry.
pub(super) async fn handler_migrate_cart(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<MigratePayload>,
) -> Response {
    let token = payload.guest_token.trim().to_string();
    if token.is_empty() {
        return bad_request("guest_token must not be empty");
    }

    let guest = {
        let store = lock_or_recover(&state.anon_carts);
        store.get(&token).cloned()
    };
    let Some(guest) = guest else {
        return Json(cart::MigrationReport::nothing_to_do()).into_response();
    };

    match cart::migrate_guest_cart(&state.db, &guest, &user.user_id).await {
        Ok(report) => {
            let drained = {
                let mut store = lock_or_recover(&state.anon_carts);
                store.take(&token)
            };
            if let Err(e) = drained {
                tracing::warn!(error = %e, "guest cart drain failed after migration");
            }
            if report.migrated {
                state.prom_metrics.carts_migrated.inc();
            }
            Json(report).into_response()
        }
        Err(e) => internal_error(e),
    }
}

// ── Guest cart ──────────────────────────────────────────────────

fn guest_token(headers: &HeaderMap) -> Result<String, Response> {
    let token = headers
        .get(GUEST_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if token.is_empty() || token.len() > 128 {
        return Err(bad_request("Missing or invalid x-guest-token header"));
    }
    Ok(token.to_string())
}

#[derive(Serialize)]
struct GuestLineView {
    item_type: &'static str,
    item_id: i64,
    quantity: i32,
    item_details: Option<ItemDetails>,
    line_total: f64,
}

#[derive(Serialize)]
struct GuestCartView {
    id: String,
    items: Vec<GuestLineView>,
    total: f64,
    item_count: i32,
}

/// Attach catalog details to guest lines. Lines whose catalog row vanished
/// stay visible with a zero line total, same as the authenticated view.
async fn hydrate_guest(state: &AppState, guest: &GuestCart) -> anyhow::Result<GuestCartView> {
    let pack_ids: Vec<i64> = guest
        .lines
        .iter()
        .filter(|l| l.kind == ItemKind::Pack)
        .map(|l| l.item_id)
        .collect();
    let service_ids: Vec<i64> = guest
        .lines
        .iter()
        .filter(|l| l.kind == ItemKind::Service)
        .map(|l| l.item_id)
        .collect();

    let packs: HashMap<i64, _> = state
        .db
        .get_packs_by_ids(&pack_ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let services: HashMap<i64, _> = state
        .db
        .get_services_by_ids(&service_ids)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let items: Vec<GuestLineView> = guest
        .lines
        .iter()
        .map(|line| {
            let details: Option<ItemDetails> = match line.kind {
                ItemKind::Pack => packs.get(&line.item_id).map(ItemDetails::from),
                ItemKind::Service => services.get(&line.item_id).map(ItemDetails::from),
            };
            let line_total = details
                .as_ref()
                .map(|d| d.price * line.quantity as f64)
                .unwrap_or(0.0);
            GuestLineView {
                item_type: line.kind.as_str(),
                item_id: line.item_id,
                quantity: line.quantity,
                item_details: details,
                line_total,
            }
        })
        .collect();
    let total = items.iter().map(|i| i.line_total).sum();
    let item_count = items.iter().map(|i| i.quantity).sum();

    Ok(GuestCartView {
        id: guest.id.clone(),
        items,
        total,
        item_count,
    })
}

/// `GET /api/guest/cart`
pub(super) async fn handler_get_guest_cart(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let token = match guest_token(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    let guest = {
        let mut store = lock_or_recover(&state.anon_carts);
        store.get_or_create(&token)
    };
    match guest {
        Ok(guest) => match hydrate_guest(&state, &guest).await {
            Ok(view) => Json(view).into_response(),
            Err(e) => internal_error(e),
        },
        Err(e) => internal_error(e),
    }
}

/// `POST /api/guest/cart/items`
///
/// The snapshot store knows nothing about the catalog, so the existence and
/// active checks happen here before the line is written.
pub(super) async fn handler_add_guest_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AddItemPayload>,
) -> Response {
    let token = match guest_token(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    let Some(kind) = ItemKind::parse(&payload.item_type) else {
        return bad_request("item_type must be \"pack\" or \"service\"");
    };

    let live = match kind {
        ItemKind::Pack => state
            .db
            .get_pack(payload.item_id)
            .await
            .map(|p| p.is_some_and(|p| p.is_active)),
        ItemKind::Service => state
            .db
            .get_service(payload.item_id)
            .await
            .map(|s| s.is_some_and(|s| s.is_active)),
    };
    match live {
        Ok(true) => {}
        Ok(false) => return not_found("Item not found"),
        Err(e) => return internal_error(e),
    }

    let result = {
        let mut store = lock_or_recover(&state.anon_carts);
        store.add_line(&token, kind, payload.item_id)
    };
    match result {
        Ok(mutation) => mutation_response(mutation),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct GuestQuantityPayload {
    pub item_type: String,
    pub item_id: i64,
    pub quantity: i32,
    #[serde(default)]
    pub confirm: bool,
}

/// `PUT /api/guest/cart/items`
pub(super) async fn handler_update_guest_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<GuestQuantityPayload>,
) -> Response {
    let token = match guest_token(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    let Some(kind) = ItemKind::parse(&payload.item_type) else {
        return bad_request("item_type must be \"pack\" or \"service\"");
    };
    let result = {
        let mut store = lock_or_recover(&state.anon_carts);
        store.update_quantity(&token, kind, payload.item_id, payload.quantity, payload.confirm)
    };
    match result {
        Ok(mutation) => mutation_response(mutation),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct GuestLineQuery {
    pub item_type: String,
    pub item_id: i64,
    #[serde(default)]
    pub confirm: bool,
}

/// `GET /api/guest/cart/impact?item_type=pack&item_id=1`
pub(super) async fn handler_guest_item_impact(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<GuestLineQuery>,
) -> Response {
    let token = match guest_token(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    let Some(kind) = ItemKind::parse(&query.item_type) else {
        return bad_request("item_type must be \"pack\" or \"service\"");
    };
    let impact = {
        let store = lock_or_recover(&state.anon_carts);
        store.removal_impact(&token, kind, query.item_id)
    };
    Json(impact).into_response()
}

/// `DELETE /api/guest/cart/items?item_type=pack&item_id=1&confirm=true`
pub(super) async fn handler_remove_guest_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<GuestLineQuery>,
) -> Response {
    let token = match guest_token(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    let Some(kind) = ItemKind::parse(&query.item_type) else {
        return bad_request("item_type must be \"pack\" or \"service\"");
    };
    let result = {
        let mut store = lock_or_recover(&state.anon_carts);
        store.remove_line(&token, kind, query.item_id, query.confirm)
    };
    match result {
        Ok(mutation) => mutation_response(mutation),
        Err(e) => internal_error(e),
    }
}

/// `DELETE /api/guest/cart`
pub(super) async fn handler_clear_guest_cart(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let token = match guest_token(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    let result = {
        let mut store = lock_or_recover(&state.anon_carts);
        store.clear(&token)
    };
    match result {
        Ok(()) => Json(serde_json::json!({"cleared": true})).into_response(),
        Err(e) => internal_error(e),
    }
}
