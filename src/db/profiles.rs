//! User profile queries — role lookup, profile CRUD, admin client list.

use anyhow::Result;
use serde::Serialize;

use super::{ClientFilter, Database, UserProfileRow};

/// Admin client-list row: profile fields plus order/project counts.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ClientSummaryRow {
    pub id: String,
    pub role: String,
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub orders_count: i64,
    pub projects_count: i64,
}

impl Database {
    /// Look up a user profile by Supabase auth user ID.
    pub async fn get_user_profile(&self, user_id: &str) -> Result<Option<UserProfileRow>> {
        let row = sqlx::query_as::<_, UserProfileRow>(
            "SELECT id::text, role, full_name, company, phone, created_at, updated_at
             FROM user_profiles WHERE id = $1::uuid",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Get the role for a user (returns "client" as default if no profile exists).
    pub async fn get_user_role(&self, user_id: &str) -> Result<String> {
        let role =
            sqlx::query_scalar::<_, String>("SELECT role FROM user_profiles WHERE id = $1::uuid")
                .bind(user_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(role.unwrap_or_else(|| "client".to_string()))
    }

    /// Create or update the caller's profile contact fields. The role column
    /// is deliberately untouched here; role changes are an admin operation.
    pub async fn upsert_user_profile(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        company: Option<&str>,
        phone: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_profiles (id, full_name, company, phone)
             VALUES ($1::uuid, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE SET
                full_name = COALESCE(EXCLUDED.full_name, user_profiles.full_name),
                company = COALESCE(EXCLUDED.company, user_profiles.company),
                phone = COALESCE(EXCLUDED.phone, user_profiles.phone),
                updated_at = NOW()",
        )
        .bind(user_id)
        .bind(full_name)
        .bind(company)
        .bind(phone)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Set a user's role (admin operation).
    pub async fn set_user_role(&self, user_id: &str, role: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE user_profiles SET role = $2, updated_at = NOW() WHERE id = $1::uuid",
        )
        .bind(user_id)
        .bind(role)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Admin client list with search and whitelisted sorting.
    ///
    /// Search matches name, company, or the auth id itself; the sort column
    /// and direction come from `ClientFilter`'s whitelists, never from raw
    /// request input.
    pub async fn get_clients(&self, filter: &ClientFilter, limit: i64) -> Result<Vec<ClientSummaryRow>> {
        let where_clause = if filter.search.is_some() {
            " WHERE up.full_name ILIKE $2 OR up.company ILIKE $2 OR up.id::text ILIKE $2"
        } else {
            ""
        };
        let sql = format!(
            "SELECT up.id::text AS id, up.role, up.full_name, up.company, up.phone,
                    up.created_at,
                    (SELECT COUNT(*) FROM orders o WHERE o.user_id = up.id) AS orders_count,
                    (SELECT COUNT(*) FROM projects p WHERE p.user_id = up.id) AS projects_count
             FROM user_profiles up{}
             ORDER BY up.{} {} LIMIT $1",
            where_clause,
            filter.safe_sort_column(),
            filter.safe_sort_dir(),
        );

        let mut query = sqlx::query_as::<_, ClientSummaryRow>(&sql).bind(limit);
        if let Some(ref search) = filter.search {
            query = query.bind(format!("%{}%", search));
        }
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows)
    }

    /// Delete a user's profile (account deletion path). Orders and projects
    /// are retained as business records.
    pub async fn delete_user_profile(&self, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_profiles WHERE id = $1::uuid")
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
