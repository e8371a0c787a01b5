//! Project and milestone operations.
//!
//! Projects are delivery engagements derived from a paid order. Each project
//! carries a fixed milestone schedule generated at creation time; progress is
//! derived from dates and milestone completion, never stored.
//!
//! ## Lifecycle
//!
//! 1. `insert_project` — header row with the duration estimate and date window
//! 2. `insert_milestones` — the generated schedule, one transaction
//! 3. Admin transitions via `update_project_status`; terminal states stamp
//!    `actual_end_date`
//! 4. Milestone completion toggles feed the derived progress fallback

use super::{Database, MilestoneRow, ProjectRow};
use anyhow::Result;

impl Database {
    /// Insert a project header and return its id. Status starts at `pending`
    /// until an admin picks the work up.
    pub async fn insert_project(
        &self,
        name: &str,
        user_id: &str,
        order_id: i64,
        estimated_completion_days: i32,
        start_date: chrono::DateTime<chrono::Utc>,
        expected_end_date: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO projects (name, user_id, order_id, status,
                                   estimated_completion_days, start_date, expected_end_date)
             VALUES ($1, $2::uuid, $3, 'pending', $4, $5, $6)
             RETURNING id",
        )
        .bind(name)
        .bind(user_id)
        .bind(order_id)
        .bind(estimated_completion_days)
        .bind(start_date)
        .bind(expected_end_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Insert the milestone schedule for a project in one transaction.
    pub async fn insert_milestones(
        &self,
        project_id: i64,
        milestones: &[crate::project::MilestonePlan],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for m in milestones {
            sqlx::query(
                "INSERT INTO project_milestones
                    (project_id, title, description, due_date, is_completed, position)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(project_id)
            .bind(&m.title)
            .bind(&m.description)
            .bind(m.due_date)
            .bind(m.is_completed)
            .bind(m.position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_project(&self, project_id: i64) -> Result<Option<ProjectRow>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, user_id::text AS user_id, order_id, status,
                    estimated_completion_days, start_date, expected_end_date,
                    actual_end_date, created_at, updated_at
             FROM projects WHERE id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// The project derived from an order, if one exists already.
    pub async fn get_project_by_order(&self, order_id: i64) -> Result<Option<ProjectRow>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, user_id::text AS user_id, order_id, status,
                    estimated_completion_days, start_date, expected_end_date,
                    actual_end_date, created_at, updated_at
             FROM projects WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_projects_for_user(&self, user_id: &str) -> Result<Vec<ProjectRow>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, user_id::text AS user_id, order_id, status,
                    estimated_completion_days, start_date, expected_end_date,
                    actual_end_date, created_at, updated_at
             FROM projects WHERE user_id = $1::uuid ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// List projects, optionally filtered by status (admin view).
    pub async fn get_projects(&self, status_filter: Option<&str>) -> Result<Vec<ProjectRow>> {
        let rows = if let Some(status) = status_filter {
            sqlx::query_as::<_, ProjectRow>(
                "SELECT id, name, user_id::text AS user_id, order_id, status,
                        estimated_completion_days, start_date, expected_end_date,
                        actual_end_date, created_at, updated_at
                 FROM projects WHERE status = $1 ORDER BY created_at DESC, id DESC",
            )
            .bind(status)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, ProjectRow>(
                "SELECT id, name, user_id::text AS user_id, order_id, status,
                        estimated_completion_days, start_date, expected_end_date,
                        actual_end_date, created_at, updated_at
                 FROM projects ORDER BY created_at DESC, id DESC",
            )
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }

    /// Update a project's status (pending -> in_progress, etc.).
    ///
    /// Stamps `actual_end_date` for terminal states (completed, cancelled)
    /// without overwriting an earlier stamp. Returns false when the project
    /// does not exist.
    pub async fn update_project_status(&self, project_id: i64, status: &str) -> Result<bool> {
        let ended = if matches!(status, "completed" | "cancelled") {
            Some(chrono::Utc::now())
        } else {
            None
        };

        let result = sqlx::query(
            "UPDATE projects SET status = $1, updated_at = NOW(),
                    actual_end_date = COALESCE($2, actual_end_date)
             WHERE id = $3",
        )
        .bind(status)
        .bind(ended)
        .bind(project_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Milestones of a project in schedule order.
    pub async fn get_project_milestones(&self, project_id: i64) -> Result<Vec<MilestoneRow>> {
        let rows = sqlx::query_as::<_, MilestoneRow>(
            "SELECT id, project_id, title, description, due_date, is_completed, position
             FROM project_milestones WHERE project_id = $1 ORDER BY position",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Toggle a milestone, scoped to its project so callers can enforce
    /// ownership. Returns false when no such milestone exists.
    pub async fn set_milestone_completed(
        &self,
        project_id: i64,
        milestone_id: i64,
        is_completed: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE project_milestones SET is_completed = $1
             WHERE id = $2 AND project_id = $3",
        )
        .bind(is_completed)
        .bind(milestone_id)
        .bind(project_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_projects_in_progress(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE status = 'in_progress'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
