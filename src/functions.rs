//! Privileged write boundary.
//!
//! Client-facing requests run with the caller's row-level rights, which are
//! read-mostly. Writes that outrank the caller (milestone schedules, system
//! updates, account removal) go through this boundary instead. Two backends:
//!
//! * [`HttpEdgeFunctions`] — POSTs to the deployed serverless functions,
//!   authenticated with the service role key. Production mode.
//! * [`DirectEdgeFunctions`] — performs the same writes straight through the
//!   database connection, which already holds full rights. Used when no
//!   functions endpoint is configured, and by the CLI and tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::db::Database;
use crate::project::MilestonePlan;

/// The privileged operations the platform needs beyond per-user rights.
#[async_trait]
pub trait EdgeFunctions: Send + Sync {
    /// Insert the generated milestone schedule for a project.
    async fn create_milestones(&self, project_id: i64, milestones: &[MilestonePlan])
        -> Result<()>;

    /// Append a system update (no admin author) to a project's thread.
    async fn create_project_update(&self, project_id: i64, title: &str, content: &str)
        -> Result<()>;

    /// Remove a user's profile and carts. Orders and projects stay for the
    /// books.
    async fn delete_account(&self, user_id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct FunctionError {
    error: String,
}

/// Calls the deployed serverless functions over HTTP.
pub struct HttpEdgeFunctions {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl HttpEdgeFunctions {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build functions HTTP client")?;
        Ok(HttpEdgeFunctions {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            client,
        })
    }

    async fn invoke(&self, name: &str, payload: &Value) -> Result<()> {
        let url = format!("{}/functions/v1/{}", self.base_url, name);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach function {}", name))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<FunctionError>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        anyhow::bail!("Function {} returned {}: {}", name, status, detail)
    }
}

#[async_trait]
impl EdgeFunctions for HttpEdgeFunctions {
    async fn create_milestones(
        &self,
        project_id: i64,
        milestones: &[MilestonePlan],
    ) -> Result<()> {
        let payload = serde_json::json!({
            "project_id": project_id,
            "milestones": milestones,
        });
        self.invoke("create-milestones", &payload).await
    }

    async fn create_project_update(
        &self,
        project_id: i64,
        title: &str,
        content: &str,
    ) -> Result<()> {
        let payload = serde_json::json!({
            "project_id": project_id,
            "title": title,
            "content": content,
        });
        self.invoke("create-project-update", &payload).await
    }

    async fn delete_account(&self, user_id: &str) -> Result<()> {
        let payload = serde_json::json!({ "user_id": user_id });
        self.invoke("delete-account", &payload).await
    }
}

/// Performs the privileged writes in-process.
///
/// The server's own connection string carries full rights, so when no
/// functions endpoint is configured the boundary collapses to plain
/// database calls with identical semantics.
pub struct DirectEdgeFunctions {
    db: Database,
}

impl DirectEdgeFunctions {
    pub fn new(db: Database) -> Self {
        DirectEdgeFunctions { db }
    }
}

#[async_trait]
impl EdgeFunctions for DirectEdgeFunctions {
    async fn create_milestones(
        &self,
        project_id: i64,
        milestones: &[MilestonePlan],
    ) -> Result<()> {
        self.db.insert_milestones(project_id, milestones).await
    }

    async fn create_project_update(
        &self,
        project_id: i64,
        title: &str,
        content: &str,
    ) -> Result<()> {
        self.db
            .insert_project_update(project_id, title, content, None)
            .await?;
        Ok(())
    }

    async fn delete_account(&self, user_id: &str) -> Result<()> {
        self.db.delete_carts_for_user(user_id).await?;
        self.db.delete_user_profile(user_id).await?;
        Ok(())
    }
}

/// Pick the boundary backend from configuration: HTTP when both the
/// endpoint and key are present, direct writes otherwise.
pub fn from_env(db: &Database) -> Result<Box<dyn EdgeFunctions>> {
    let base_url = std::env::var("FUNCTIONS_URL").ok();
    let service_key = std::env::var("SERVICE_ROLE_KEY").ok();

    match (base_url, service_key) {
        (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
            tracing::info!(endpoint = %url, "privileged writes via edge functions");
            Ok(Box::new(HttpEdgeFunctions::new(&url, &key)?))
        }
        _ => {
            tracing::info!("privileged writes direct to database");
            Ok(Box::new(DirectEdgeFunctions::new(db.clone())))
        }
    }
}
