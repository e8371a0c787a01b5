//! # Database — PostgreSQL Storage Layer
//!
//! Provides async database operations for catalog, carts, orders, and project
//! tracking via `sqlx::PgPool` connecting to Supabase PostgreSQL.
//!
//! ## Schema
//!
//! - `packs` / `services`: the purchasable catalog
//! - `carts` / `cart_items`: one active cart per authenticated user
//! - `orders` / `order_items`: immutable purchase snapshots
//! - `projects` / `project_milestones`: delivery tracking with a fixed schedule
//! - `project_updates` / `project_forms`: client-facing thread and questionnaire
//! - `user_profiles`: role and contact data keyed by the auth user id
//!
//! ## Module Structure
//!
//! Operations are split into submodules by domain:
//!
//! - [`catalog`] — Pack/service reads, admin upserts, batch hydration lookups
//! - [`carts`] — Cart and cart-item CRUD, duplicate-cart merge
//! - [`orders`] — Order snapshot inserts, compensation delete, status updates
//! - [`projects`] — Project lifecycle and milestone schedule storage
//! - [`updates`] — Project update thread and questionnaire form
//! - [`profiles`] — User roles, admin client list, account deletion
//!
//! Auth user ids are `uuid` columns; queries bind them as `$n::uuid` and
//! select them back as `::text`, so the Rust types stay plain `String`.

mod carts;
mod catalog;
mod orders;
mod profiles;
mod projects;
mod updates;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

// ── Catalog types ───────────────────────────────────────────────

#[derive(Clone, Serialize, sqlx::FromRow)]
pub struct PackRow {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub features: Value,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Serialize, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

// ── Cart types ──────────────────────────────────────────────────

#[derive(Serialize, sqlx::FromRow)]
pub struct CartRow {
    pub id: i64,
    pub user_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartItemRow {
    pub id: i64,
    pub cart_id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub quantity: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

// ── Order types ─────────────────────────────────────────────────

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub user_id: String,
    pub status: String,
    pub payment_method: Option<String>,
    pub payment_id: Option<String>,
    pub total_amount: f64,
    pub installment_plan: Option<i32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItemRow {
    pub id: i64,
    pub order_id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub quantity: i32,
    pub price_at_purchase: f64,
}

// ── Project types ───────────────────────────────────────────────

#[derive(Serialize, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub name: String,
    pub user_id: String,
    pub order_id: i64,
    pub status: String,
    pub estimated_completion_days: i32,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub expected_end_date: Option<chrono::DateTime<chrono::Utc>>,
    pub actual_end_date: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MilestoneRow {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub due_date: chrono::DateTime<chrono::Utc>,
    pub is_completed: bool,
    pub position: i32,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct ProjectUpdateRow {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub content: String,
    pub admin_id: Option<String>,
    pub is_read: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct ProjectFormRow {
    pub id: i64,
    pub project_id: i64,
    pub form_data: Value,
    pub is_completed: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

// ── Profile types ───────────────────────────────────────────────

#[derive(Serialize, sqlx::FromRow)]
pub struct UserProfileRow {
    pub id: String,
    pub role: String,
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Admin client-list filter. Search matches name/company/id, sort fields are
/// whitelisted before interpolation.
#[derive(Deserialize, Default, Clone)]
pub struct ClientFilter {
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

impl ClientFilter {
    /// Whitelist sort column to prevent SQL injection.
    /// Unknown values default to "created_at".
    pub(crate) fn safe_sort_column(&self) -> &str {
        match self.sort_by.as_deref() {
            Some("full_name") => "full_name",
            Some("company") => "company",
            Some("role") => "role",
            Some("updated_at") => "updated_at",
            _ => "created_at",
        }
    }

    /// Whitelist sort direction to prevent SQL injection.
    /// Only "asc"/"ASC" are accepted; everything else defaults to "DESC".
    pub(crate) fn safe_sort_dir(&self) -> &str {
        match self.sort_dir.as_deref() {
            Some("asc") | Some("ASC") => "ASC",
            _ => "DESC",
        }
    }
}

// ── Maintenance counters ────────────────────────────────────────

/// One row of the orders-by-status breakdown.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

// ── Database struct and connection ──────────────────────────────

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// Manually parses the URL to preserve the full username; sqlx's built-in
    /// parser strips the ".project-ref" suffix that the Supabase pooler requires.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username)
            .statement_cache_capacity(0);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    ///
    /// Used by the `/readyz` readiness probe. Returns `Ok(())` if the
    /// database responds, or an error if the connection is broken.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────
