//! Catalog operations: packs and services.
//!
//! Packs are the purchasable root items; services are add-ons that can only be
//! bought alongside a pack. Public reads return active rows only; admin paths
//! see everything. Rows are deactivated rather than deleted so existing cart
//! and order references keep resolving for as long as they can.
//!
//! `NUMERIC` price columns are selected with `::FLOAT8` casts; monetary math
//! stays in `f64` end to end.

use super::{Database, PackRow, ServiceRow};
use anyhow::Result;

impl Database {
    /// List active packs, cheapest first.
    pub async fn get_active_packs(&self) -> Result<Vec<PackRow>> {
        let rows = sqlx::query_as::<_, PackRow>(
            "SELECT id, slug, name, description, price::FLOAT8 AS price, features,
                    is_active, created_at, updated_at
             FROM packs WHERE is_active ORDER BY price, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// List active services grouped by category then price.
    pub async fn get_active_services(&self) -> Result<Vec<ServiceRow>> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, slug, name, description, price::FLOAT8 AS price, category,
                    is_active, created_at, updated_at
             FROM services WHERE is_active ORDER BY category, price, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// List the full catalog including deactivated rows (admin view).
    pub async fn get_all_packs(&self) -> Result<Vec<PackRow>> {
        let rows = sqlx::query_as::<_, PackRow>(
            "SELECT id, slug, name, description, price::FLOAT8 AS price, features,
                    is_active, created_at, updated_at
             FROM packs ORDER BY price, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_all_services(&self) -> Result<Vec<ServiceRow>> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, slug, name, description, price::FLOAT8 AS price, category,
                    is_active, created_at, updated_at
             FROM services ORDER BY category, price, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Get a single pack by slug (active or not).
    pub async fn get_pack_by_slug(&self, slug: &str) -> Result<Option<PackRow>> {
        let row = sqlx::query_as::<_, PackRow>(
            "SELECT id, slug, name, description, price::FLOAT8 AS price, features,
                    is_active, created_at, updated_at
             FROM packs WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_service_by_slug(&self, slug: &str) -> Result<Option<ServiceRow>> {
        let row = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, slug, name, description, price::FLOAT8 AS price, category,
                    is_active, created_at, updated_at
             FROM services WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_pack(&self, pack_id: i64) -> Result<Option<PackRow>> {
        let row = sqlx::query_as::<_, PackRow>(
            "SELECT id, slug, name, description, price::FLOAT8 AS price, features,
                    is_active, created_at, updated_at
             FROM packs WHERE id = $1",
        )
        .bind(pack_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_service(&self, service_id: i64) -> Result<Option<ServiceRow>> {
        let row = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, slug, name, description, price::FLOAT8 AS price, category,
                    is_active, created_at, updated_at
             FROM services WHERE id = $1",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Batch fetch packs by id for cart/order hydration.
    ///
    /// Callers skip the call entirely when `ids` is empty; the guard here is a
    /// backstop so an empty `ANY` array never reaches the planner.
    pub async fn get_packs_by_ids(&self, ids: &[i64]) -> Result<Vec<PackRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, PackRow>(
            "SELECT id, slug, name, description, price::FLOAT8 AS price, features,
                    is_active, created_at, updated_at
             FROM packs WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_services_by_ids(&self, ids: &[i64]) -> Result<Vec<ServiceRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, slug, name, description, price::FLOAT8 AS price, category,
                    is_active, created_at, updated_at
             FROM services WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Insert or update a pack keyed by slug. Returns the row id.
    ///
    /// Backs both the admin CRUD endpoints and `catalog sync`; re-running a
    /// sync with an unchanged file is a no-op apart from `updated_at`.
    pub async fn upsert_pack(
        &self,
        slug: &str,
        name: &str,
        description: &str,
        price: f64,
        features: &serde_json::Value,
        is_active: bool,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO packs (slug, name, description, price, features, is_active)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (slug) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price = EXCLUDED.price,
                features = EXCLUDED.features,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
             RETURNING id",
        )
        .bind(slug)
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(features)
        .bind(is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn upsert_service(
        &self,
        slug: &str,
        name: &str,
        description: &str,
        price: f64,
        category: &str,
        is_active: bool,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO services (slug, name, description, price, category, is_active)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (slug) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price = EXCLUDED.price,
                category = EXCLUDED.category,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
             RETURNING id",
        )
        .bind(slug)
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(category)
        .bind(is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Deactivate a pack. Returns false when the id does not exist.
    pub async fn deactivate_pack(&self, pack_id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE packs SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
                .bind(pack_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn deactivate_service(&self, service_id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE services SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
                .bind(service_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
