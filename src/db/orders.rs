//! Order and order-item operations.
//!
//! Orders are immutable snapshots: items carry `price_at_purchase` frozen at
//! creation time and are never updated afterwards. The order manager drives
//! the multi-step creation saga; this module only provides the individual
//! steps, including the compensating [`Database::delete_order`].

use super::{Database, OrderItemRow, OrderRow, StatusCount};
use anyhow::Result;

impl Database {
    /// Insert an order header and return its id. First saga step.
    pub async fn insert_order(
        &self,
        user_id: &str,
        status: &str,
        payment_method: Option<&str>,
        installment_plan: Option<i32>,
        total_amount: f64,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO orders (user_id, status, payment_method, installment_plan, total_amount)
             VALUES ($1::uuid, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(user_id)
        .bind(status)
        .bind(payment_method)
        .bind(installment_plan)
        .bind(total_amount)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Insert one snapshot line of an order.
    pub async fn insert_order_item(
        &self,
        order_id: i64,
        item_type: &str,
        item_id: i64,
        quantity: i32,
        price_at_purchase: f64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO order_items (order_id, item_type, item_id, quantity, price_at_purchase)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order_id)
        .bind(item_type)
        .bind(item_id)
        .bind(quantity)
        .bind(price_at_purchase)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete an order and whatever items it accumulated. Compensation step
    /// for a failed creation saga; also used by tests.
    pub async fn delete_order(&self, order_id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_order(&self, order_id: i64) -> Result<Option<OrderRow>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id::text AS user_id, status, payment_method, payment_id,
                    total_amount::FLOAT8 AS total_amount, installment_plan,
                    created_at, updated_at
             FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Snapshot lines in insertion order. The first pack line is the primary
    /// pack that drives the project duration estimate.
    pub async fn get_order_items(&self, order_id: i64) -> Result<Vec<OrderItemRow>> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, item_type, item_id, quantity,
                    price_at_purchase::FLOAT8 AS price_at_purchase
             FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_orders_for_user(&self, user_id: &str) -> Result<Vec<OrderRow>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id::text AS user_id, status, payment_method, payment_id,
                    total_amount::FLOAT8 AS total_amount, installment_plan,
                    created_at, updated_at
             FROM orders WHERE user_id = $1::uuid ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Recent orders across all users (admin view).
    pub async fn get_recent_orders(&self, limit: i64) -> Result<Vec<OrderRow>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id::text AS user_id, status, payment_method, payment_id,
                    total_amount::FLOAT8 AS total_amount, installment_plan,
                    created_at, updated_at
             FROM orders ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Set an order's status, keeping any previously recorded payment id.
    /// Returns false when the order does not exist.
    pub async fn update_order_status(
        &self,
        order_id: i64,
        status: &str,
        payment_id: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = NOW(),
                    payment_id = COALESCE($2, payment_id)
             WHERE id = $3",
        )
        .bind(status)
        .bind(payment_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_orders_by_status(&self) -> Result<Vec<StatusCount>> {
        let rows = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM orders GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Paid orders that never received their snapshot lines. A crash between
    /// the order insert and the item inserts leaves this shape behind;
    /// housekeeping warns about it and a human decides the repair.
    pub async fn count_orphaned_paid_orders(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders o
             WHERE o.status = 'paid'
               AND NOT EXISTS (SELECT 1 FROM order_items oi WHERE oi.order_id = o.id)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
