//! Project update thread and questionnaire form operations.
//!
//! Updates are an append-only thread per project, newest first, with a
//! client-side read flag. The questionnaire form is a single jsonb row per
//! project; the typed shape lives in `crate::project::form`.

use super::{Database, ProjectFormRow, ProjectUpdateRow};
use anyhow::Result;

impl Database {
    /// Append an update to a project's thread. `admin_id` is NULL for
    /// system-generated updates (project creation, broadcasts from the CLI).
    pub async fn insert_project_update(
        &self,
        project_id: i64,
        title: &str,
        content: &str,
        admin_id: Option<&str>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO project_updates (project_id, title, content, admin_id)
             VALUES ($1, $2, $3, $4::uuid)
             RETURNING id",
        )
        .bind(project_id)
        .bind(title)
        .bind(content)
        .bind(admin_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Updates of a project, newest first.
    pub async fn get_project_updates(&self, project_id: i64) -> Result<Vec<ProjectUpdateRow>> {
        let rows = sqlx::query_as::<_, ProjectUpdateRow>(
            "SELECT id, project_id, title, content, admin_id::text AS admin_id,
                    is_read, created_at
             FROM project_updates WHERE project_id = $1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// One update, scoped to its project so callers can enforce ownership.
    pub async fn get_project_update(
        &self,
        project_id: i64,
        update_id: i64,
    ) -> Result<Option<ProjectUpdateRow>> {
        let row = sqlx::query_as::<_, ProjectUpdateRow>(
            "SELECT id, project_id, title, content, admin_id::text AS admin_id,
                    is_read, created_at
             FROM project_updates WHERE project_id = $1 AND id = $2",
        )
        .bind(project_id)
        .bind(update_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Flag an update as read. Returns the number of rows touched so the
    /// caller can distinguish "already read" from "no such update".
    pub async fn mark_update_read(&self, project_id: i64, update_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE project_updates SET is_read = TRUE
             WHERE project_id = $1 AND id = $2 AND NOT is_read",
        )
        .bind(project_id)
        .bind(update_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Unread updates across all of a user's projects (dashboard badge).
    pub async fn count_unread_updates_for_user(&self, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM project_updates pu
             JOIN projects p ON p.id = pu.project_id
             WHERE p.user_id = $1::uuid AND NOT pu.is_read",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Create the questionnaire form row for a project. Idempotent: a second
    /// call for the same project keeps the existing answers.
    pub async fn insert_project_form(
        &self,
        project_id: i64,
        form_data: &serde_json::Value,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO project_forms (project_id, form_data)
             VALUES ($1, $2)
             ON CONFLICT (project_id) DO UPDATE SET updated_at = NOW()
             RETURNING id",
        )
        .bind(project_id)
        .bind(form_data)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_project_form(&self, project_id: i64) -> Result<Option<ProjectFormRow>> {
        let row = sqlx::query_as::<_, ProjectFormRow>(
            "SELECT id, project_id, form_data, is_completed, created_at, updated_at
             FROM project_forms WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Overwrite a project's questionnaire answers. Returns false when no
    /// form row exists yet.
    pub async fn save_project_form(
        &self,
        project_id: i64,
        form_data: &serde_json::Value,
        is_completed: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE project_forms SET form_data = $1, is_completed = $2, updated_at = NOW()
             WHERE project_id = $3",
        )
        .bind(form_data)
        .bind(is_completed)
        .bind(project_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
