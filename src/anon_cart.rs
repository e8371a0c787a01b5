//! # Anonymous Cart Store — Guest Cart Persistence
//!
//! Holds the carts of not-yet-authenticated visitors, keyed by an opaque
//! guest token, in a single JSON snapshot file with SHA-256 integrity
//! verification and generational backups. Guest carts never touch
//! PostgreSQL; on sign-in the cart manager drains them through
//! [`crate::cart::migrate_guest_cart`].
//!
//! ## Atomic Writes
//!
//! The snapshot is written atomically: write to a temp file, then rename.
//! This prevents corruption from mid-write crashes or power loss.
//!
//! ## Integrity
//!
//! A SHA-256 hash is stored alongside the JSON data. On load, the hash is
//! verified — corrupted snapshots are detected and skipped, falling back
//! to the most recent valid generation (up to 3 generations kept).
//!
//! ## Semantics
//!
//! Guest mutations mirror the authenticated cart rules: adds upsert by
//! `(kind, item_id)`, services require a pack in the cart, and removing the
//! last pack cascades service lines only after explicit confirmation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cart::{CartMutation, ItemKind, RemovalImpact};

/// Number of backup generations to keep.
const GENERATIONS: usize = 3;

/// Guest carts idle longer than this are pruned by housekeeping.
pub const MAX_GUEST_CART_AGE_DAYS: i64 = 30;

/// One line of a guest cart. Guest lines have no row id; they are addressed
/// by `(kind, item_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestLine {
    pub kind: ItemKind,
    pub item_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestCart {
    pub id: String,
    pub lines: Vec<GuestLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GuestCart {
    fn new() -> Self {
        let now = Utc::now();
        GuestCart {
            id: uuid::Uuid::new_v4().to_string(),
            lines: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn pack_count(&self) -> usize {
        self.lines.iter().filter(|l| l.kind == ItemKind::Pack).count()
    }

    fn service_ids(&self) -> Vec<i64> {
        self.lines
            .iter()
            .filter(|l| l.kind == ItemKind::Service)
            .map(|l| l.item_id)
            .collect()
    }
}

#[derive(Default, Serialize, Deserialize)]
struct StoreData {
    carts: HashMap<String, GuestCart>,
}

/// Wrapper that includes a SHA-256 checksum for integrity verification.
#[derive(Serialize, Deserialize)]
struct SnapshotEnvelope {
    checksum: String,
    data: serde_json::Value,
}

/// Compute SHA-256 hex digest of a string.
fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Return the path for generation `gen` (0 = current, 1 = .1, 2 = .2, ...).
fn generation_path(base: &Path, gen: usize) -> PathBuf {
    if gen == 0 {
        base.to_path_buf()
    } else {
        let mut p = base.as_os_str().to_os_string();
        p.push(format!(".{}", gen));
        PathBuf::from(p)
    }
}

/// Try to load and verify a single snapshot file.
fn load_single(path: &Path) -> Option<StoreData> {
    let raw = fs::read_to_string(path).ok()?;
    let envelope: SnapshotEnvelope = serde_json::from_str(&raw).ok()?;

    let data_str = serde_json::to_string_pretty(&envelope.data).ok()?;
    let expected = sha256_hex(&data_str);
    if expected != envelope.checksum {
        tracing::warn!(
            path = %path.display(),
            "guest cart snapshot integrity check failed, trying older generation"
        );
        return None;
    }

    serde_json::from_value(envelope.data).ok()
}

/// File-backed store of guest carts. Held behind a `Mutex` in the dashboard
/// state; every mutation persists synchronously before returning.
pub struct AnonCartStore {
    path: PathBuf,
    data: StoreData,
}

impl AnonCartStore {
    /// Open the store at `path`, recovering from the newest valid generation.
    /// A missing or unrecoverable snapshot starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = (0..GENERATIONS)
            .find_map(|gen| {
                let p = generation_path(&path, gen);
                let loaded = load_single(&p);
                if loaded.is_some() && gen > 0 {
                    tracing::warn!(generation = gen, path = %p.display(),
                        "recovered guest carts from backup generation");
                }
                loaded
            })
            .unwrap_or_default();
        AnonCartStore { path, data }
    }

    /// Save with integrity checksum and rotating generations.
    ///
    /// Rotation: current → .1 → .2 (oldest .2 is discarded).
    /// The new snapshot is written atomically via a .tmp file.
    fn persist(&self) -> Result<()> {
        for gen in (1..GENERATIONS).rev() {
            let src = generation_path(&self.path, gen - 1);
            let dst = generation_path(&self.path, gen);
            if src.exists() {
                let _ = fs::rename(&src, &dst);
            }
        }

        let data = serde_json::to_value(&self.data)?;
        let data_str = serde_json::to_string_pretty(&data)?;
        let checksum = sha256_hex(&data_str);

        let envelope = SnapshotEnvelope { checksum, data };
        let json = serde_json::to_string_pretty(&envelope)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &json)
            .with_context(|| format!("writing guest cart snapshot {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing guest cart snapshot {}", self.path.display()))?;

        Ok(())
    }

    /// Number of guest carts currently held.
    pub fn len(&self) -> usize {
        self.data.carts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.carts.is_empty()
    }

    pub fn get(&self, token: &str) -> Option<&GuestCart> {
        self.data.carts.get(token)
    }

    /// The cart for `token`, created empty on first sight.
    pub fn get_or_create(&mut self, token: &str) -> Result<GuestCart> {
        if !self.data.carts.contains_key(token) {
            self.data.carts.insert(token.to_string(), GuestCart::new());
            self.persist()?;
        }
        Ok(self.data.carts[token].clone())
    }

    /// Add one unit of a catalog item. An existing `(kind, item_id)` line
    /// gains quantity instead of duplicating; service adds require a pack
    /// line in the cart.
    pub fn add_line(
        &mut self,
        token: &str,
        kind: ItemKind,
        item_id: i64,
    ) -> Result<CartMutation<GuestLine>> {
        let cart = self
            .data
            .carts
            .entry(token.to_string())
            .or_insert_with(GuestCart::new);

        if kind == ItemKind::Service && cart.pack_count() == 0 {
            return Ok(CartMutation::NoPackInCart);
        }

        let line = match cart
            .lines
            .iter_mut()
            .find(|l| l.kind == kind && l.item_id == item_id)
        {
            Some(line) => {
                line.quantity += 1;
                line.clone()
            }
            None => {
                let line = GuestLine {
                    kind,
                    item_id,
                    quantity: 1,
                };
                cart.lines.push(line.clone());
                line
            }
        };
        cart.updated_at = Utc::now();
        self.persist()?;
        Ok(CartMutation::Applied(line))
    }

    /// Set a line's quantity. Anything below 1 delegates to removal,
    /// including its confirmation gate.
    pub fn update_quantity(
        &mut self,
        token: &str,
        kind: ItemKind,
        item_id: i64,
        quantity: i32,
        confirm: bool,
    ) -> Result<CartMutation<GuestLine>> {
        if quantity < 1 {
            return self.remove_line(token, kind, item_id, confirm);
        }

        let Some(cart) = self.data.carts.get_mut(token) else {
            return Ok(CartMutation::NotFound);
        };
        let Some(line) = cart
            .lines
            .iter_mut()
            .find(|l| l.kind == kind && l.item_id == item_id)
        else {
            return Ok(CartMutation::NotFound);
        };

        line.quantity = quantity;
        let line = line.clone();
        cart.updated_at = Utc::now();
        self.persist()?;
        Ok(CartMutation::Applied(line))
    }

    /// Dry-run removal preview. Pure read, no mutation.
    pub fn removal_impact(&self, token: &str, kind: ItemKind, item_id: i64) -> RemovalImpact {
        match self.data.carts.get(token) {
            Some(cart)
                if cart
                    .lines
                    .iter()
                    .any(|l| l.kind == kind && l.item_id == item_id) =>
            {
                RemovalImpact::compute(kind, cart.pack_count(), cart.service_ids())
            }
            _ => RemovalImpact::default(),
        }
    }

    /// Remove a line. Removing the last pack while services remain requires
    /// `confirm`; a declined confirmation mutates nothing.
    pub fn remove_line(
        &mut self,
        token: &str,
        kind: ItemKind,
        item_id: i64,
        confirm: bool,
    ) -> Result<CartMutation<GuestLine>> {
        let Some(cart) = self.data.carts.get_mut(token) else {
            return Ok(CartMutation::NotFound);
        };
        if !cart
            .lines
            .iter()
            .any(|l| l.kind == kind && l.item_id == item_id)
        {
            return Ok(CartMutation::NotFound);
        }

        let impact = RemovalImpact::compute(kind, cart.pack_count(), cart.service_ids());
        if impact.requires_confirmation() && !confirm {
            return Ok(CartMutation::NeedsConfirmation(impact));
        }

        let before = cart.lines.len();
        if impact.requires_confirmation() {
            // Confirmed last-pack removal: drop the pack and every service.
            cart.lines
                .retain(|l| !(l.kind == kind && l.item_id == item_id) && l.kind != ItemKind::Service);
        } else {
            cart.lines
                .retain(|l| !(l.kind == kind && l.item_id == item_id));
        }
        let removed = before - cart.lines.len();
        cart.updated_at = Utc::now();
        self.persist()?;
        Ok(CartMutation::Removed {
            cascaded: removed.saturating_sub(1) as u64,
        })
    }

    /// Empty a guest cart, keeping the cart record itself.
    pub fn clear(&mut self, token: &str) -> Result<()> {
        if let Some(cart) = self.data.carts.get_mut(token) {
            cart.lines.clear();
            cart.updated_at = Utc::now();
            self.persist()?;
        }
        Ok(())
    }

    /// Remove and return a guest cart (migration drain).
    pub fn take(&mut self, token: &str) -> Result<Option<GuestCart>> {
        let cart = self.data.carts.remove(token);
        if cart.is_some() {
            self.persist()?;
        }
        Ok(cart)
    }

    /// Drop guest carts idle for more than `max_age_days`. Returns how many
    /// were pruned.
    pub fn prune_stale(&mut self, max_age_days: i64, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - chrono::Duration::days(max_age_days);
        let before = self.data.carts.len();
        self.data.carts.retain(|_, cart| cart.updated_at >= cutoff);
        let pruned = before - self.data.carts.len();
        if pruned > 0 {
            self.persist()?;
        }
        Ok(pruned)
    }

    /// Remove all snapshot files (current + all generations).
    pub fn clear_files(path: &Path) {
        for gen in 0..GENERATIONS {
            let _ = fs::remove_file(generation_path(path, gen));
        }
        let _ = fs::remove_file(path.with_extension("tmp"));
    }
}
