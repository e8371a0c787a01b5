//! Project lifecycle: creation from a paid order, the client detail view,
//! admin status transitions, and the update thread.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::{Database, MilestoneRow, OrderItemRow, ProjectRow, ProjectUpdateRow};
use crate::functions::EdgeFunctions;
use crate::project::{
    estimate_duration_days, milestone_schedule, progress_percentage, ProjectStatus,
    QuestionnaireForm,
};

const WELCOME_TITLE: &str = "¡Proyecto iniciado!";
const WELCOME_CONTENT: &str = "Hemos recibido tu pedido y el equipo ya está en marcha. \
    Completa el formulario inicial para que podamos empezar con el diseño.";

/// Result of attempting to derive a project from an order.
#[derive(Debug, PartialEq)]
pub enum CreateProjectOutcome {
    Created { project_id: i64 },
    OrderNotFound,
    NoPackInOrder,
    AlreadyExists { project_id: i64 },
}

/// First pack line of the order and the summed pack total.
///
/// Order items come back in insertion order, so the first pack line is the
/// one the cart manager placed first. Services never count toward the
/// duration estimate.
fn primary_pack_and_total(items: &[OrderItemRow]) -> Option<(i64, f64)> {
    let mut primary = None;
    let mut total = 0.0;
    for item in items.iter().filter(|i| i.item_type == "pack") {
        if primary.is_none() {
            primary = Some(item.item_id);
        }
        total += item.price_at_purchase * item.quantity as f64;
    }
    primary.map(|id| (id, total))
}

/// Derive a project from a paid order: duration estimate, milestone
/// schedule, blank questionnaire, and a welcome update.
///
/// The project row is the only write that can fail the operation. The
/// companion writes go through the privileged boundary and are individually
/// recoverable, so their failures are logged and swallowed; an admin can
/// re-trigger them from the back office.
pub async fn create_project_from_order(
    db: &Database,
    functions: &dyn EdgeFunctions,
    order_id: i64,
    name: Option<&str>,
) -> Result<CreateProjectOutcome> {
    let Some(order) = db.get_order(order_id).await? else {
        return Ok(CreateProjectOutcome::OrderNotFound);
    };
    if let Some(existing) = db.get_project_by_order(order_id).await? {
        return Ok(CreateProjectOutcome::AlreadyExists {
            project_id: existing.id,
        });
    }

    let items = db.get_order_items(order_id).await?;
    let Some((primary_pack_id, pack_total)) = primary_pack_and_total(&items) else {
        return Ok(CreateProjectOutcome::NoPackInOrder);
    };

    // A pack delisted since purchase loses its name tier and falls back to
    // the price tiers alone.
    let pack_name = match db.get_pack(primary_pack_id).await? {
        Some(pack) => pack.name,
        None => String::new(),
    };

    let estimated_days = estimate_duration_days(&pack_name, pack_total);
    let start = Utc::now();
    let expected_end = start + Duration::days(estimated_days as i64);
    let schedule = milestone_schedule(start, estimated_days);

    let default_name = format!("Proyecto #{}", order_id);
    let project_name = name.unwrap_or(&default_name);

    let project_id = db
        .insert_project(
            project_name,
            &order.user_id,
            order_id,
            estimated_days,
            start,
            expected_end,
        )
        .await?;

    if let Err(e) = functions.create_milestones(project_id, &schedule).await {
        tracing::warn!(project_id, error = %e, "milestone schedule creation failed");
    }
    if let Err(e) = seed_form(db, project_id).await {
        tracing::warn!(project_id, error = %e, "questionnaire form creation failed");
    }
    if let Err(e) = functions
        .create_project_update(project_id, WELCOME_TITLE, WELCOME_CONTENT)
        .await
    {
        tracing::warn!(project_id, error = %e, "welcome update failed");
    }

    tracing::info!(project_id, order_id, estimated_days, "project created");
    Ok(CreateProjectOutcome::Created { project_id })
}

async fn seed_form(db: &Database, project_id: i64) -> Result<()> {
    let blank = QuestionnaireForm::default().to_value()?;
    db.insert_project_form(project_id, &blank).await?;
    Ok(())
}

/// Derived progress for one project row.
pub fn project_progress(
    project: &ProjectRow,
    milestones: &[MilestoneRow],
    now: DateTime<Utc>,
) -> u8 {
    let status = ProjectStatus::parse_or_pending(&project.status);
    let completed = milestones.iter().filter(|m| m.is_completed).count() as u32;
    progress_percentage(
        status,
        project.start_date,
        project.expected_end_date,
        completed,
        milestones.len() as u32,
        now,
    )
}

/// Questionnaire answers with their completion flag, as clients see them.
#[derive(Serialize)]
pub struct QuestionnaireView {
    pub answers: QuestionnaireForm,
    pub is_completed: bool,
}

/// Everything the project page needs in one payload.
#[derive(Serialize)]
pub struct ProjectDetails {
    pub project: ProjectRow,
    pub milestones: Vec<MilestoneRow>,
    pub updates: Vec<ProjectUpdateRow>,
    pub form: Option<QuestionnaireView>,
    pub progress_percentage: u8,
}

pub async fn get_project_details(
    db: &Database,
    project_id: i64,
) -> Result<Option<ProjectDetails>> {
    let Some(project) = db.get_project(project_id).await? else {
        return Ok(None);
    };
    let milestones = db.get_project_milestones(project_id).await?;
    let updates = db.get_project_updates(project_id).await?;
    let form = db.get_project_form(project_id).await?.map(|row| {
        QuestionnaireView {
            answers: QuestionnaireForm::from_value(&row.form_data),
            is_completed: row.is_completed,
        }
    });
    let progress_percentage = project_progress(&project, &milestones, Utc::now());

    Ok(Some(ProjectDetails {
        project,
        milestones,
        updates,
        form,
        progress_percentage,
    }))
}

/// One project plus its derived progress, for list views.
#[derive(Serialize)]
pub struct ProjectSummary {
    pub project: ProjectRow,
    pub progress_percentage: u8,
}

pub async fn list_user_projects(db: &Database, user_id: &str) -> Result<Vec<ProjectSummary>> {
    let projects = db.get_projects_for_user(user_id).await?;
    summarize(db, projects).await
}

/// Admin listing across all users, optionally filtered by status.
pub async fn list_projects(
    db: &Database,
    status_filter: Option<ProjectStatus>,
) -> Result<Vec<ProjectSummary>> {
    let projects = db
        .get_projects(status_filter.map(|s| s.as_str()))
        .await?;
    summarize(db, projects).await
}

async fn summarize(db: &Database, projects: Vec<ProjectRow>) -> Result<Vec<ProjectSummary>> {
    let now = Utc::now();
    let mut out = Vec::with_capacity(projects.len());
    for project in projects {
        let milestones = db.get_project_milestones(project.id).await?;
        let progress_percentage = project_progress(&project, &milestones, now);
        out.push(ProjectSummary {
            project,
            progress_percentage,
        });
    }
    Ok(out)
}

/// Transition a project's status. Returns false when the project does not
/// exist.
pub async fn set_project_status(
    db: &Database,
    project_id: i64,
    status: ProjectStatus,
) -> Result<bool> {
    let changed = db.update_project_status(project_id, status.as_str()).await?;
    if changed {
        tracing::info!(project_id, status = %status, "project status changed");
    }
    Ok(changed)
}

/// Result of a client marking an update as read.
#[derive(Debug, PartialEq)]
pub enum MarkReadOutcome {
    Marked,
    AlreadyRead,
    NotFound,
}

pub async fn mark_update_read(
    db: &Database,
    project_id: i64,
    update_id: i64,
) -> Result<MarkReadOutcome> {
    let Some(update) = db.get_project_update(project_id, update_id).await? else {
        return Ok(MarkReadOutcome::NotFound);
    };
    if update.is_read {
        return Ok(MarkReadOutcome::AlreadyRead);
    }
    if db.mark_update_read(project_id, update_id).await? > 0 {
        Ok(MarkReadOutcome::Marked)
    } else {
        // Lost a race with another session reading the same thread.
        Ok(MarkReadOutcome::AlreadyRead)
    }
}

/// Post an admin-authored update. Returns the new update id, or None when
/// the project does not exist.
pub async fn post_project_update(
    db: &Database,
    project_id: i64,
    title: &str,
    content: &str,
    admin_id: Option<&str>,
) -> Result<Option<i64>> {
    if db.get_project(project_id).await?.is_none() {
        return Ok(None);
    }
    let id = db
        .insert_project_update(project_id, title, content, admin_id)
        .await?;
    tracing::info!(project_id, update_id = id, "project update posted");
    Ok(Some(id))
}

/// Outcome of a broadcast across matching projects.
#[derive(Debug, Default, Serialize)]
pub struct BroadcastReport {
    pub matched: usize,
    pub posted: usize,
    pub failed: usize,
}

/// Post the same update to every project matching the status filter,
/// continuing past individual failures.
pub async fn broadcast_update(
    db: &Database,
    status_filter: Option<ProjectStatus>,
    title: &str,
    content: &str,
) -> Result<BroadcastReport> {
    let projects = db
        .get_projects(status_filter.map(|s| s.as_str()))
        .await?;
    let mut report = BroadcastReport {
        matched: projects.len(),
        ..Default::default()
    };

    for project in projects {
        match db
            .insert_project_update(project.id, title, content, None)
            .await
        {
            Ok(_) => report.posted += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(project_id = project.id, error = %e, "broadcast post failed");
            }
        }
    }

    tracing::info!(
        matched = report.matched,
        posted = report.posted,
        failed = report.failed,
        "broadcast finished"
    );
    Ok(report)
}
