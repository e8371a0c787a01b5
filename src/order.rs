//! # Order Manager — immutable purchase snapshots
//!
//! Turns a validated cart into an order plus its item snapshot. Creation is
//! a multi-step saga across aggregates (order header, order items, cart
//! clear) with compensating actions recorded per stage: a failed item
//! snapshot deletes the order header again. `price_at_purchase` freezes the
//! catalog price at order time; the snapshot never changes afterwards.
//!
//! Status updates are deliberately permissive: any known status string is
//! accepted without a transition matrix, because the admin back-office is
//! the only caller.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::cart::{self, ItemDetails, ItemKind};
use crate::db::{Database, OrderItemRow, OrderRow, PackRow, ServiceRow};

// ── Status ──────────────────────────────────────────────────────

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "processing" => Some(OrderStatus::Processing),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Parse a stored status, coercing unknown strings to `Pending` with a
    /// warning instead of failing the whole read.
    pub fn parse_or_pending(s: &str) -> Self {
        OrderStatus::parse(s).unwrap_or_else(|| {
            warn!(status = s, "unknown order status in store, treating as pending");
            OrderStatus::Pending
        })
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Views ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct OrderItemView {
    pub id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub quantity: i32,
    pub price_at_purchase: f64,
    /// Display-only; the authoritative price is `price_at_purchase`.
    pub item_details: Option<ItemDetails>,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order: OrderRow,
    pub items: Vec<OrderItemView>,
}

// ── Creation saga ───────────────────────────────────────────────

#[derive(Debug)]
pub enum CreateOrderOutcome {
    Created { order_id: i64 },
    /// Precondition failed: the cart has no lines at all.
    EmptyCart,
    /// Precondition failed: no pack line with a live catalog row.
    NoPackInCart,
}

/// Compensating actions recorded as the saga advances; run newest-first
/// when a later stage fails.
enum Compensation {
    DeleteOrder(i64),
}

async fn run_compensations(db: &Database, steps: &[Compensation]) {
    for step in steps.iter().rev() {
        match step {
            Compensation::DeleteOrder(order_id) => {
                if let Err(e) = db.delete_order(*order_id).await {
                    // The saga does not re-verify compensations; an operator
                    // has to clean this order up by hand.
                    error!(order_id, error = %e, "order compensation failed");
                }
            }
        }
    }
}

/// Snapshot the user's cart into a new order.
///
/// Preconditions are checked before any write: the cart must be non-empty
/// and must contain at least one pack line whose catalog row still resolves.
/// Stages: insert the order header (status `paid`, total = current cart
/// total), snapshot each line with the current catalog price, clear the
/// cart. Lines whose catalog row vanished are skipped with a warning,
/// consistent with their exclusion from the total. A failed snapshot stage
/// runs the recorded compensations and reports the error; the caller
/// retries manually.
pub async fn create_order_from_cart(
    db: &Database,
    user_id: &str,
    payment_method: Option<&str>,
    installment_plan: Option<i32>,
) -> Result<CreateOrderOutcome> {
    let cart = cart::get_cart_with_items(db, user_id).await?;
    if cart.items.is_empty() {
        return Ok(CreateOrderOutcome::EmptyCart);
    }
    let has_live_pack = cart.items.iter().any(|i| {
        matches!(&i.item_details, Some(d) if d.kind == ItemKind::Pack)
    });
    if !has_live_pack {
        return Ok(CreateOrderOutcome::NoPackInCart);
    }

    let mut compensations: Vec<Compensation> = Vec::new();

    let order_id = db
        .insert_order(
            user_id,
            OrderStatus::Paid.as_str(),
            payment_method,
            installment_plan,
            cart.total,
        )
        .await?;
    compensations.push(Compensation::DeleteOrder(order_id));

    for item in &cart.items {
        let Some(details) = &item.item_details else {
            warn!(
                line = item.id,
                item_id = item.item_id,
                "cart line lost its catalog row, leaving it out of the order"
            );
            continue;
        };
        if let Err(e) = db
            .insert_order_item(
                order_id,
                &item.item_type,
                item.item_id,
                item.quantity,
                details.price,
            )
            .await
        {
            error!(order_id, error = %e, "order item snapshot failed, compensating");
            run_compensations(db, &compensations).await;
            return Err(e);
        }
    }

    // The order is complete at this point; a failed cart clear is left for
    // the user to retry rather than undoing a valid purchase.
    if let Err(e) = cart::clear_cart(db, user_id).await {
        warn!(order_id, error = %e, "cart clear failed after order creation");
    }

    Ok(CreateOrderOutcome::Created { order_id })
}

// ── Reads ───────────────────────────────────────────────────────

/// An order with its snapshot lines and display details attached.
pub async fn get_order_with_items(db: &Database, order_id: i64) -> Result<Option<OrderView>> {
    let Some(order) = db.get_order(order_id).await? else {
        return Ok(None);
    };
    let rows = db.get_order_items(order_id).await?;

    let mut pack_ids: Vec<i64> = Vec::new();
    let mut service_ids: Vec<i64> = Vec::new();
    for row in &rows {
        match ItemKind::parse(&row.item_type) {
            Some(ItemKind::Pack) if !pack_ids.contains(&row.item_id) => {
                pack_ids.push(row.item_id)
            }
            Some(ItemKind::Service) if !service_ids.contains(&row.item_id) => {
                service_ids.push(row.item_id)
            }
            _ => {}
        }
    }

    // Each batch lookup is skipped entirely when its id list is empty.
    let packs: HashMap<i64, PackRow> = if pack_ids.is_empty() {
        HashMap::new()
    } else {
        db.get_packs_by_ids(&pack_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };
    let services: HashMap<i64, ServiceRow> = if service_ids.is_empty() {
        HashMap::new()
    } else {
        db.get_services_by_ids(&service_ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect()
    };

    let items = hydrate_order_items(rows, &packs, &services);
    Ok(Some(OrderView { order, items }))
}

pub(crate) fn hydrate_order_items(
    rows: Vec<OrderItemRow>,
    packs: &HashMap<i64, PackRow>,
    services: &HashMap<i64, ServiceRow>,
) -> Vec<OrderItemView> {
    rows.into_iter()
        .map(|row| {
            let details = match ItemKind::parse(&row.item_type) {
                Some(ItemKind::Pack) => packs.get(&row.item_id).map(ItemDetails::from),
                Some(ItemKind::Service) => services.get(&row.item_id).map(ItemDetails::from),
                None => None,
            };
            OrderItemView {
                id: row.id,
                item_type: row.item_type,
                item_id: row.item_id,
                quantity: row.quantity,
                price_at_purchase: row.price_at_purchase,
                item_details: details,
            }
        })
        .collect()
}

/// All orders of a user, newest first.
pub async fn get_user_orders(db: &Database, user_id: &str) -> Result<Vec<OrderRow>> {
    db.get_orders_for_user(user_id).await
}

/// Set an order's status. No transition matrix: the back-office is trusted
/// to know what it is doing. Returns false when the order does not exist.
pub async fn update_order_status(
    db: &Database,
    order_id: i64,
    status: OrderStatus,
    payment_id: Option<&str>,
) -> Result<bool> {
    db.update_order_status(order_id, status.as_str(), payment_id)
        .await
}

// ── Presentation helpers ────────────────────────────────────────

/// Per-month amount for an installment plan, rounded up to whole currency
/// units so the plan never under-collects. Presentation only; stored totals
/// stay exact.
pub fn installment_amount(total: f64, months: i32) -> f64 {
    if months <= 1 {
        return total;
    }
    (total / months as f64).ceil()
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn status_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("refunded"), None);
    }

    #[test]
    fn unknown_status_coerces_to_pending() {
        assert_eq!(OrderStatus::parse_or_pending("refunded"), OrderStatus::Pending);
        assert_eq!(OrderStatus::parse_or_pending(""), OrderStatus::Pending);
        assert_eq!(OrderStatus::parse_or_pending("paid"), OrderStatus::Paid);
    }

    #[test]
    fn installment_rounds_up() {
        assert_eq!(installment_amount(890.0, 3), 297.0);
        assert_eq!(installment_amount(900.0, 3), 300.0);
        assert_eq!(installment_amount(1890.0, 6), 315.0);
        assert_eq!(installment_amount(100.0, 7), 15.0);
    }

    #[test]
    fn installment_single_month_is_total() {
        assert_eq!(installment_amount(890.0, 1), 890.0);
        assert_eq!(installment_amount(890.0, 0), 890.0);
    }

    #[test]
    fn order_item_hydration_prefers_snapshot_price() {
        let mut packs = HashMap::new();
        packs.insert(
            1,
            PackRow {
                id: 1,
                slug: "pack-pro".into(),
                name: "Pack Pro".into(),
                description: String::new(),
                price: 2190.0, // raised after the purchase
                features: serde_json::json!([]),
                is_active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        let rows = vec![OrderItemRow {
            id: 1,
            order_id: 9,
            item_type: "pack".into(),
            item_id: 1,
            quantity: 1,
            price_at_purchase: 1890.0,
        }];
        let views = hydrate_order_items(rows, &packs, &HashMap::new());
        assert_eq!(views[0].price_at_purchase, 1890.0);
        assert_eq!(views[0].item_details.as_ref().map(|d| d.price), Some(2190.0));
    }

    #[test]
    fn order_item_hydration_tolerates_missing_rows() {
        let rows = vec![OrderItemRow {
            id: 1,
            order_id: 9,
            item_type: "service".into(),
            item_id: 404,
            quantity: 2,
            price_at_purchase: 290.0,
        }];
        let views = hydrate_order_items(rows, &HashMap::new(), &HashMap::new());
        assert!(views[0].item_details.is_none());
        assert_eq!(views[0].price_at_purchase, 290.0);
    }
}
