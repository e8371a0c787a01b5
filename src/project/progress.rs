//! Progress derivation.
//!
//! Progress is never stored. It is recomputed from status, dates, and
//! milestone completion every time a project is read, so the figure a client
//! sees can never drift from the underlying state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<ProjectStatus> {
        match s {
            "pending" => Some(ProjectStatus::Pending),
            "in_progress" => Some(ProjectStatus::InProgress),
            "completed" => Some(ProjectStatus::Completed),
            "cancelled" => Some(ProjectStatus::Cancelled),
            _ => None,
        }
    }

    /// Parse a stored status, coercing anything unrecognized to `Pending`.
    ///
    /// Rows written by older revisions or touched by hand can carry stale
    /// strings; reads must not fail on them.
    pub fn parse_or_pending(s: &str) -> ProjectStatus {
        ProjectStatus::parse(s).unwrap_or_else(|| {
            tracing::warn!(status = s, "unknown project status, treating as pending");
            ProjectStatus::Pending
        })
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn milestone_ratio(completed_milestones: u32, total_milestones: u32) -> u8 {
    if total_milestones == 0 {
        return 0;
    }
    let pct = (completed_milestones as f64 / total_milestones as f64) * 100.0;
    (pct.floor() as u8).min(99)
}

/// Derived progress percentage for a project.
///
/// Completed projects report 100 regardless of dates. Cancelled projects
/// freeze at their milestone completion ratio. Everything else is linear in
/// elapsed time between start and expected end, floored, and clamped to
/// 0..=99 so that only an explicit completion ever shows 100. Projects with
/// missing or inverted dates fall back to the milestone ratio.
pub fn progress_percentage(
    status: ProjectStatus,
    start_date: Option<DateTime<Utc>>,
    expected_end_date: Option<DateTime<Utc>>,
    completed_milestones: u32,
    total_milestones: u32,
    now: DateTime<Utc>,
) -> u8 {
    match status {
        ProjectStatus::Completed => 100,
        ProjectStatus::Cancelled => milestone_ratio(completed_milestones, total_milestones),
        ProjectStatus::Pending | ProjectStatus::InProgress => {
            match (start_date, expected_end_date) {
                (Some(start), Some(end)) if end > start => {
                    let total = (end - start).num_seconds() as f64;
                    let elapsed = (now - start).num_seconds() as f64;
                    let pct = (elapsed / total * 100.0).floor();
                    pct.clamp(0.0, 99.0) as u8
                }
                _ => milestone_ratio(completed_milestones, total_milestones),
            }
        }
    }
}
