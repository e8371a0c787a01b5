//! # Cart Manager — the single source of truth for the active cart
//!
//! Serves both cart states: authenticated carts live in PostgreSQL (one per
//! user, duplicates merged on read), guest carts live in the
//! [`crate::anon_cart::AnonCartStore`] snapshot. The business rules are the
//! same on both paths:
//!
//! - adds upsert by `(kind, item_id)` — repeated adds grow quantity
//! - a service line requires at least one pack line in the cart
//! - removing the last pack while services remain is a two-phase operation:
//!   preview the [`RemovalImpact`], then confirm the cascade
//!
//! Rule violations are not errors: mutations return [`CartMutation`] so the
//! HTTP layer can map each outcome to its own status code. `Err` is reserved
//! for storage failures.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::anon_cart::{GuestCart, GuestLine};
use crate::db::{CartItemRow, Database, PackRow, ServiceRow};

// ── Item kinds ──────────────────────────────────────────────────

/// What a cart or order line points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Pack,
    Service,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Pack => "pack",
            ItemKind::Service => "service",
        }
    }

    /// Parse a stored `item_type` string. Unknown values return `None`;
    /// callers decide whether that warrants a warning or a skip.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pack" => Some(ItemKind::Pack),
            "service" => Some(ItemKind::Service),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Removal impact (two-phase cascade) ──────────────────────────

/// Dry-run result of removing a line: whether the target is the cart's last
/// pack and which service lines a confirmed removal would take with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemovalImpact {
    pub last_pack: bool,
    pub cascaded_service_ids: Vec<i64>,
}

impl RemovalImpact {
    /// Compute the impact of removing a line of `target` kind from a cart
    /// with `pack_line_count` pack lines and the given service item ids.
    pub fn compute(target: ItemKind, pack_line_count: usize, service_ids: Vec<i64>) -> Self {
        let last_pack = target == ItemKind::Pack && pack_line_count <= 1;
        RemovalImpact {
            last_pack,
            cascaded_service_ids: if last_pack { service_ids } else { Vec::new() },
        }
    }

    /// True when the removal must be confirmed before it mutates anything.
    pub fn requires_confirmation(&self) -> bool {
        self.last_pack && !self.cascaded_service_ids.is_empty()
    }
}

// ── Mutation outcomes ───────────────────────────────────────────

/// Business outcome of a cart mutation. `T` is the resulting line type
/// (`CartItemRow` on the authenticated path, `GuestLine` on the guest path).
#[derive(Debug)]
pub enum CartMutation<T> {
    /// The mutation landed; the resulting line is attached.
    Applied(T),
    /// Service add rejected: the cart holds no pack line.
    NoPackInCart,
    /// The referenced catalog item does not exist or is inactive.
    UnknownItem,
    /// Last-pack removal with services present, not yet confirmed.
    NeedsConfirmation(RemovalImpact),
    /// Line removed; `cascaded` counts the service lines dropped with it.
    Removed { cascaded: u64 },
    /// The targeted line does not exist in the caller's cart.
    NotFound,
}

// ── Hydrated views ──────────────────────────────────────────────

/// Catalog display fields attached to a cart or order line.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDetails {
    pub kind: ItemKind,
    pub name: String,
    pub slug: String,
    pub price: f64,
}

impl From<&PackRow> for ItemDetails {
    fn from(p: &PackRow) -> Self {
        ItemDetails {
            kind: ItemKind::Pack,
            name: p.name.clone(),
            slug: p.slug.clone(),
            price: p.price,
        }
    }
}

impl From<&ServiceRow> for ItemDetails {
    fn from(s: &ServiceRow) -> Self {
        ItemDetails {
            kind: ItemKind::Service,
            name: s.name.clone(),
            slug: s.slug.clone(),
            price: s.price,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CartItemView {
    pub id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub quantity: i32,
    /// `None` when the catalog row was deactivated or deleted after the line
    /// was added; such lines stay visible and contribute zero to the total.
    pub item_details: Option<ItemDetails>,
    pub line_total: f64,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: i64,
    pub items: Vec<CartItemView>,
    pub total: f64,
    pub item_count: i32,
}

/// Attach catalog details to raw cart lines. Pure so the arithmetic is
/// testable without a database.
pub(crate) fn hydrate_items(
    rows: Vec<CartItemRow>,
    packs: &HashMap<i64, PackRow>,
    services: &HashMap<i64, ServiceRow>,
) -> Vec<CartItemView> {
    rows.into_iter()
        .map(|row| {
            let details: Option<ItemDetails> = match ItemKind::parse(&row.item_type) {
                Some(ItemKind::Pack) => packs.get(&row.item_id).map(ItemDetails::from),
                Some(ItemKind::Service) => services.get(&row.item_id).map(ItemDetails::from),
                None => {
                    warn!(item_type = %row.item_type, line = row.id, "unknown cart item type");
                    None
                }
            };
            let line_total = details
                .as_ref()
                .map(|d| d.price * row.quantity as f64)
                .unwrap_or(0.0);
            CartItemView {
                id: row.id,
                item_type: row.item_type,
                item_id: row.item_id,
                quantity: row.quantity,
                item_details: details,
                line_total,
            }
        })
        .collect()
}

pub(crate) fn cart_total(items: &[CartItemView]) -> f64 {
    items.iter().map(|i| i.line_total).sum()
}

// ── Authenticated cart operations ───────────────────────────────

/// The user's surviving cart id after duplicate merge, creating a fresh cart
/// when none exists.
pub async fn get_or_create_cart(db: &Database, user_id: &str) -> Result<i64> {
    match cleanup_duplicate_carts(db, user_id).await? {
        Some(id) => Ok(id),
        None => db.create_cart(user_id).await,
    }
}

/// Merge duplicate carts down to the most recent one.
///
/// The store has no uniqueness constraint on `carts.user_id`; races and
/// retries occasionally leave a user with several carts. The newest cart
/// survives, older carts fold their lines into it (summing quantities per
/// `(item_type, item_id)`) and are deleted. Returns the surviving id, or
/// `None` when the user has no cart at all.
pub async fn cleanup_duplicate_carts(db: &Database, user_id: &str) -> Result<Option<i64>> {
    let carts = db.get_carts_for_user(user_id).await?;
    let Some((kept, stale)) = carts.split_first() else {
        return Ok(None);
    };
    if !stale.is_empty() {
        let stale_ids: Vec<i64> = stale.iter().map(|c| c.id).collect();
        warn!(
            user_id,
            kept = kept.id,
            merged = stale_ids.len(),
            "merging duplicate carts"
        );
        db.merge_carts(kept.id, &stale_ids).await?;
    }
    Ok(Some(kept.id))
}

/// The user's cart with catalog details and the computed total.
pub async fn get_cart_with_items(db: &Database, user_id: &str) -> Result<CartView> {
    let cart_id = get_or_create_cart(db, user_id).await?;
    let rows = db.get_cart_items(cart_id).await?;

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

    let items = hydrate_items(rows, &packs, &services);
    let total = cart_total(&items);
    let item_count = items.iter().map(|i| i.quantity).sum();
    Ok(CartView {
        id: cart_id,
        items,
        total,
        item_count,
    })
}

/// Add one unit of a pack. Upserts: an existing line gains quantity.
pub async fn add_pack_to_cart(
    db: &Database,
    user_id: &str,
    pack_id: i64,
) -> Result<CartMutation<CartItemRow>> {
    let Some(pack) = db.get_pack(pack_id).await? else {
        return Ok(CartMutation::UnknownItem);
    };
    if !pack.is_active {
        return Ok(CartMutation::UnknownItem);
    }
    let cart_id = get_or_create_cart(db, user_id).await?;
    let row = db
        .upsert_cart_item(cart_id, ItemKind::Pack.as_str(), pack_id, 1)
        .await?;
    Ok(CartMutation::Applied(row))
}

/// Add one unit of a service. Fails before any write when the cart holds no
/// pack line.
pub async fn add_service_to_cart(
    db: &Database,
    user_id: &str,
    service_id: i64,
) -> Result<CartMutation<CartItemRow>> {
    let Some(service) = db.get_service(service_id).await? else {
        return Ok(CartMutation::UnknownItem);
    };
    if !service.is_active {
        return Ok(CartMutation::UnknownItem);
    }
    let cart_id = get_or_create_cart(db, user_id).await?;
    let items = db.get_cart_items(cart_id).await?;
    let has_pack = items
        .iter()
        .any(|i| ItemKind::parse(&i.item_type) == Some(ItemKind::Pack));
    if !has_pack {
        return Ok(CartMutation::NoPackInCart);
    }
    let row = db
        .upsert_cart_item(cart_id, ItemKind::Service.as_str(), service_id, 1)
        .await?;
    Ok(CartMutation::Applied(row))
}

/// Set a line's quantity. Anything below 1 delegates to removal, including
/// the last-pack confirmation gate.
pub async fn update_cart_item_quantity(
    db: &Database,
    user_id: &str,
    item_row_id: i64,
    quantity: i32,
    confirm: bool,
) -> Result<CartMutation<CartItemRow>> {
    if quantity < 1 {
        return remove_cart_item(db, user_id, item_row_id, confirm).await;
    }

    let cart_id = get_or_create_cart(db, user_id).await?;
    let Some(item) = db.get_cart_item(cart_id, item_row_id).await? else {
        return Ok(CartMutation::NotFound);
    };
    if !db.set_cart_item_quantity(item.id, quantity).await? {
        return Ok(CartMutation::NotFound);
    }
    let Some(updated) = db.get_cart_item(cart_id, item_row_id).await? else {
        return Ok(CartMutation::NotFound);
    };
    Ok(CartMutation::Applied(updated))
}

/// Dry-run removal preview for a line in the user's cart. `None` when the
/// line does not exist.
pub async fn removal_impact(
    db: &Database,
    user_id: &str,
    item_row_id: i64,
) -> Result<Option<RemovalImpact>> {
    let cart_id = get_or_create_cart(db, user_id).await?;
    let Some(item) = db.get_cart_item(cart_id, item_row_id).await? else {
        return Ok(None);
    };
    let items = db.get_cart_items(cart_id).await?;
    Ok(Some(impact_for(&item, &items)))
}

fn impact_for(target: &CartItemRow, items: &[CartItemRow]) -> RemovalImpact {
    let Some(kind) = ItemKind::parse(&target.item_type) else {
        return RemovalImpact::default();
    };
    let pack_count = items
        .iter()
        .filter(|i| ItemKind::parse(&i.item_type) == Some(ItemKind::Pack))
        .count();
    let service_ids = items
        .iter()
        .filter(|i| ItemKind::parse(&i.item_type) == Some(ItemKind::Service))
        .map(|i| i.item_id)
        .collect();
    RemovalImpact::compute(kind, pack_count, service_ids)
}

/// Remove a line. Removing the last pack while services remain requires
/// `confirm`; declined confirmation aborts with the impact attached and no
/// mutation. A confirmed removal cascades all service lines.
pub async fn remove_cart_item(
    db: &Database,
    user_id: &str,
    item_row_id: i64,
    confirm: bool,
) -> Result<CartMutation<CartItemRow>> {
    let cart_id = get_or_create_cart(db, user_id).await?;
    let Some(item) = db.get_cart_item(cart_id, item_row_id).await? else {
        return Ok(CartMutation::NotFound);
    };
    let items = db.get_cart_items(cart_id).await?;
    let impact = impact_for(&item, &items);

    if impact.requires_confirmation() && !confirm {
        return Ok(CartMutation::NeedsConfirmation(impact));
    }

    let cascaded = if impact.requires_confirmation() {
        db.delete_cart_item(item.id).await?;
        db.delete_service_items(cart_id).await?
    } else {
        db.delete_cart_item(item.id).await?;
        0
    };
    Ok(CartMutation::Removed { cascaded })
}

/// Empty the user's cart. Returns the number of lines removed.
pub async fn clear_cart(db: &Database, user_id: &str) -> Result<u64> {
    let cart_id = get_or_create_cart(db, user_id).await?;
    db.clear_cart_items(cart_id).await
}

// ── Guest cart migration ────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MigrationReport {
    pub migrated: bool,
    pub lines: usize,
    pub skipped: usize,
}

impl MigrationReport {
    pub fn nothing_to_do() -> Self {
        MigrationReport {
            migrated: false,
            lines: 0,
            skipped: 0,
        }
    }
}

/// Pack lines first so replayed service lines satisfy the pack rule, guest
/// insertion order preserved within each kind.
pub(crate) fn migration_order(lines: &[GuestLine]) -> Vec<GuestLine> {
    let mut ordered: Vec<GuestLine> = lines
        .iter()
        .filter(|l| l.kind == ItemKind::Pack)
        .cloned()
        .collect();
    ordered.extend(lines.iter().filter(|l| l.kind == ItemKind::Service).cloned());
    ordered
}

/// Replay a drained guest cart into the user's database cart.
///
/// Each line goes through the authenticated add path (so the pack rule and
/// upsert semantics hold); a line the rules reject is skipped with a warning
/// rather than aborting the whole migration. The caller removes the guest
/// cart from the snapshot store only after this returns `Ok`.
pub async fn migrate_guest_cart(
    db: &Database,
    guest: &GuestCart,
    user_id: &str,
) -> Result<MigrationReport> {
    if guest.lines.is_empty() {
        return Ok(MigrationReport::nothing_to_do());
    }

    let cart_id = get_or_create_cart(db, user_id).await?;
    let mut migrated = 0usize;
    let mut skipped = 0usize;

    for line in migration_order(&guest.lines) {
        match line.kind {
            ItemKind::Pack => {
                if !db.get_pack(line.item_id).await?.is_some_and(|p| p.is_active) {
                    warn!(item_id = line.item_id, "skipping guest pack line, not purchasable");
                    skipped += 1;
                    continue;
                }
                db.upsert_cart_item(cart_id, line.kind.as_str(), line.item_id, line.quantity)
                    .await?;
                migrated += 1;
            }
            ItemKind::Service => {
                if !db.get_service(line.item_id).await?.is_some_and(|s| s.is_active) {
                    warn!(item_id = line.item_id, "skipping guest service line, not purchasable");
                    skipped += 1;
                    continue;
                }
                let items = db.get_cart_items(cart_id).await?;
                let has_pack = items
                    .iter()
                    .any(|i| ItemKind::parse(&i.item_type) == Some(ItemKind::Pack));
                if !has_pack {
                    warn!(
                        item_id = line.item_id,
                        "skipping guest service line, no pack after migration"
                    );
                    skipped += 1;
                    continue;
                }
                db.upsert_cart_item(cart_id, line.kind.as_str(), line.item_id, line.quantity)
                    .await?;
                migrated += 1;
            }
        }
    }

    Ok(MigrationReport {
        migrated: migrated > 0,
        lines: migrated,
        skipped,
    })
}

// ── Tests ───────────────────────────────────────────────────────
