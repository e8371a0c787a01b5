//! Cart and cart-item operations.
//!
//! The store carries no uniqueness constraint on `carts.user_id` (retries and
//! concurrent sign-ins can race a second cart into existence), so the cart
//! manager merges duplicates on read via [`Database::merge_carts`]. Lines
//! inside a single cart are unique per `(cart_id, item_type, item_id)` and
//! adds go through an `ON CONFLICT` quantity upsert.

use super::{CartItemRow, CartRow, Database};
use anyhow::Result;

impl Database {
    /// All carts owned by a user, newest first. The head of the list is the
    /// survivor when duplicates get merged.
    pub async fn get_carts_for_user(&self, user_id: &str) -> Result<Vec<CartRow>> {
        let rows = sqlx::query_as::<_, CartRow>(
            "SELECT id, user_id::text AS user_id, created_at, updated_at
             FROM carts WHERE user_id = $1::uuid
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Create an empty cart for a user and return its id.
    pub async fn create_cart(&self, user_id: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO carts (user_id) VALUES ($1::uuid) RETURNING id",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Items of a cart in insertion order.
    pub async fn get_cart_items(&self, cart_id: i64) -> Result<Vec<CartItemRow>> {
        let rows = sqlx::query_as::<_, CartItemRow>(
            "SELECT id, cart_id, item_type, item_id, quantity, created_at, updated_at
             FROM cart_items WHERE cart_id = $1
             ORDER BY created_at, id",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// A single cart line, scoped to its cart so callers can enforce ownership.
    pub async fn get_cart_item(
        &self,
        cart_id: i64,
        item_row_id: i64,
    ) -> Result<Option<CartItemRow>> {
        let row = sqlx::query_as::<_, CartItemRow>(
            "SELECT id, cart_id, item_type, item_id, quantity, created_at, updated_at
             FROM cart_items WHERE cart_id = $1 AND id = $2",
        )
        .bind(cart_id)
        .bind(item_row_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Add `quantity` of a catalog item to a cart. An existing line for the
    /// same `(item_type, item_id)` gains the quantity instead of duplicating.
    pub async fn upsert_cart_item(
        &self,
        cart_id: i64,
        item_type: &str,
        item_id: i64,
        quantity: i32,
    ) -> Result<CartItemRow> {
        let row = sqlx::query_as::<_, CartItemRow>(
            "INSERT INTO cart_items (cart_id, item_type, item_id, quantity)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (cart_id, item_type, item_id) DO UPDATE SET
                quantity = cart_items.quantity + EXCLUDED.quantity,
                updated_at = NOW()
             RETURNING id, cart_id, item_type, item_id, quantity, created_at, updated_at",
        )
        .bind(cart_id)
        .bind(item_type)
        .bind(item_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;
        self.touch_cart(cart_id).await?;
        Ok(row)
    }

    /// Set the quantity of an existing line. Returns false when the line is gone.
    pub async fn set_cart_item_quantity(&self, item_row_id: i64, quantity: i32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE cart_items SET quantity = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(quantity)
        .bind(item_row_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_cart_item(&self, item_row_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_row_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every service line of a cart. Returns the number of lines removed.
    ///
    /// Cascade step when the last pack leaves the cart; the confirmation gate
    /// lives in the cart manager, not here.
    pub async fn delete_service_items(&self, cart_id: i64) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND item_type = 'service'")
                .bind(cart_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Delete all lines of a cart. Returns the number of lines removed.
    pub async fn clear_cart_items(&self, cart_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Fold the items of `stale_cart_ids` into `kept_cart_id` and delete the
    /// stale carts, all in one transaction. Overlapping lines sum quantities.
    pub async fn merge_carts(&self, kept_cart_id: i64, stale_cart_ids: &[i64]) -> Result<()> {
        if stale_cart_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO cart_items (cart_id, item_type, item_id, quantity)
             SELECT $1, item_type, item_id, quantity
             FROM cart_items WHERE cart_id = ANY($2)
             ON CONFLICT (cart_id, item_type, item_id) DO UPDATE SET
                quantity = cart_items.quantity + EXCLUDED.quantity,
                updated_at = NOW()",
        )
        .bind(kept_cart_id)
        .bind(stale_cart_ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = ANY($1)")
            .bind(stale_cart_ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM carts WHERE id = ANY($1)")
            .bind(stale_cart_ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(kept_cart_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete a user's carts and their items (account deletion path).
    pub async fn delete_carts_for_user(&self, user_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM cart_items WHERE cart_id IN
                (SELECT id FROM carts WHERE user_id = $1::uuid)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM carts WHERE user_id = $1::uuid")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    pub async fn count_active_carts(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Users holding more than one cart. Surfaced as a gauge by housekeeping;
    /// the actual merge happens lazily in the cart manager.
    pub async fn count_users_with_duplicate_carts(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM
                (SELECT user_id FROM carts GROUP BY user_id HAVING COUNT(*) > 1) dups",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn touch_cart(&self, cart_id: i64) -> Result<()> {
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
