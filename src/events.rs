//! In-process change feed backing the realtime layer.
//!
//! Mutations on orders, projects, milestones, updates and forms are
//! reported here as [`Change`] values. The feed flattens each change
//! into a [`ChangeNotice`], keeps a bounded ring of recent notices for
//! replay, and fans the JSON-encoded notice out to live WebSocket
//! sessions through a broadcast channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// Maximum notices retained for replay to late subscribers.
const RECENT_CHANGES_CAP: usize = 200;

/// Broadcast channel depth before slow receivers start lagging.
const BROADCAST_CAP: usize = 256;

/// A domain mutation worth announcing to connected clients.
#[derive(Debug, Clone)]
pub enum Change {
    OrderCreated {
        order_id: i64,
        user_id: String,
    },
    ProjectCreated {
        project_id: i64,
        order_id: i64,
    },
    ProjectStatusChanged {
        project_id: i64,
        status: String,
    },
    MilestoneToggled {
        project_id: i64,
        milestone_id: i64,
        is_completed: bool,
    },
    UpdatePosted {
        project_id: i64,
        update_id: i64,
        title: String,
    },
    FormSaved {
        project_id: i64,
        is_completed: bool,
    },
}

/// Flattened, serializable form of a [`Change`].
#[derive(Debug, Clone, Serialize)]
pub struct ChangeNotice {
    pub id: u64,
    pub table: &'static str,
    pub action: &'static str,
    pub project_id: Option<i64>,
    pub title: String,
    pub timestamp_ms: i64,
}

/// Bounded ring of recent changes plus a broadcast fan-out.
pub struct ChangeFeed {
    recent: Mutex<VecDeque<ChangeNotice>>,
    next_id: AtomicU64,
    sender: tokio::sync::broadcast::Sender<String>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(BROADCAST_CAP);
        Self {
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CHANGES_CAP)),
            next_id: AtomicU64::new(1),
            sender,
        }
    }

    /// New receiver for the live stream. Messages are JSON strings of
    /// the form `{"type": "change", "change": {...}}`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Records a change and pushes it to all live subscribers.
    pub fn emit(&self, change: Change) {
        let (table, action, project_id, title) = flatten(&change);
        let notice = ChangeNotice {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            table,
            action,
            project_id,
            title,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };
        tracing::debug!(table, action, project_id, "change emitted");

        {
            let mut recent = self.recent.lock().unwrap();
            if recent.len() >= RECENT_CHANGES_CAP {
                recent.pop_front();
            }
            recent.push_back(notice.clone());
        }

        let payload = serde_json::json!({"type": "change", "change": notice});
        // Send fails when no session is connected, which is fine.
        let _ = self.sender.send(payload.to_string());
    }

    /// Most recent notices, newest first, optionally limited to one project.
    pub fn recent_changes(&self, limit: usize, project_id: Option<i64>) -> Vec<ChangeNotice> {
        let recent = self.recent.lock().unwrap();
        recent
            .iter()
            .rev()
            .filter(|n| match project_id {
                Some(id) => n.project_id == Some(id),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

fn flatten(change: &Change) -> (&'static str, &'static str, Option<i64>, String) {
    match change {
        Change::OrderCreated { order_id, .. } => {
            ("orders", "insert", None, format!("Pedido #{} creado", order_id))
        }
        Change::ProjectCreated {
            project_id,
            order_id,
        } => (
            "projects",
            "insert",
            Some(*project_id),
            format!("Proyecto creado para el pedido #{}", order_id),
        ),
        Change::ProjectStatusChanged { project_id, status } => (
            "projects",
            "update",
            Some(*project_id),
            format!("Estado del proyecto: {}", status),
        ),
        Change::MilestoneToggled {
            project_id,
            is_completed,
            ..
        } => (
            "project_milestones",
            "update",
            Some(*project_id),
            if *is_completed {
                "Hito completado".to_string()
            } else {
                "Hito reabierto".to_string()
            },
        ),
        Change::UpdatePosted {
            project_id, title, ..
        } => ("project_updates", "insert", Some(*project_id), title.clone()),
        Change::FormSaved {
            project_id,
            is_completed,
        } => (
            "project_forms",
            "update",
            Some(*project_id),
            if *is_completed {
                "Formulario completado".to_string()
            } else {
                "Formulario guardado".to_string()
            },
        ),
    }
}
