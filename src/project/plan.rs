//! Duration estimate and milestone schedule generation.
//!
//! Both are pure functions of the purchased pack and the clock, so the same
//! order always produces the same plan. The schedule is in Spanish because
//! that is what clients see in their dashboard.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Pack totals under this amount get the mid-sized schedule.
const PREMIUM_TOTAL_THRESHOLD: f64 = 2000.0;

/// Estimated delivery duration in days, from the primary pack.
///
/// A pack whose name marks it as the base tier ships in 10 days; otherwise
/// the pack total decides between the 20-day and 30-day schedules.
pub fn estimate_duration_days(primary_pack_name: &str, pack_total: f64) -> i32 {
    let name = primary_pack_name.to_lowercase();
    if name.contains("básico") || name.contains("basico") || name.contains("base") {
        10
    } else if pack_total < PREMIUM_TOTAL_THRESHOLD {
        20
    } else {
        30
    }
}

/// One planned milestone, ready for insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestonePlan {
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub is_completed: bool,
    pub position: i32,
}

fn due(start: DateTime<Utc>, estimated_days: i32, fraction: f64) -> DateTime<Utc> {
    let offset = (estimated_days as f64 * fraction).round() as i64;
    start + Duration::days(offset)
}

/// The fixed milestone schedule for a project starting at `start` with the
/// given duration estimate.
///
/// Kickoff lands at day zero already completed; design, development, and
/// final delivery at 30%, 60%, and 100% of the duration. Estimates of 20
/// days and up get a testing milestone at 80%. Positions are 1-based and
/// contiguous, and the final milestone always lands exactly at
/// `start + estimated_days`.
pub fn milestone_schedule(start: DateTime<Utc>, estimated_days: i32) -> Vec<MilestonePlan> {
    let mut plan = vec![
        MilestonePlan {
            title: "Inicio del proyecto".to_string(),
            description: "Confirmación del pedido y arranque del proyecto".to_string(),
            due_date: start,
            is_completed: true,
            position: 1,
        },
        MilestonePlan {
            title: "Entrega de diseño".to_string(),
            description: "Primera propuesta de diseño lista para revisión".to_string(),
            due_date: due(start, estimated_days, 0.3),
            is_completed: false,
            position: 2,
        },
        MilestonePlan {
            title: "Desarrollo".to_string(),
            description: "Implementación del sitio sobre el diseño aprobado".to_string(),
            due_date: due(start, estimated_days, 0.6),
            is_completed: false,
            position: 3,
        },
    ];

    if estimated_days >= 20 {
        plan.push(MilestonePlan {
            title: "Pruebas y revisión".to_string(),
            description: "Pruebas funcionales y ajustes finales".to_string(),
            due_date: due(start, estimated_days, 0.8),
            is_completed: false,
            position: 4,
        });
    }

    plan.push(MilestonePlan {
        title: "Entrega final".to_string(),
        description: "Publicación y entrega del proyecto".to_string(),
        due_date: start + Duration::days(estimated_days as i64),
        is_completed: false,
        position: plan.len() as i32 + 1,
    });

    plan
}
