//! # Project — Delivery Tracking for Purchased Engagements
//!
//! Turns a paid order into a tracked delivery **project**: a duration
//! estimate derived from the purchased pack, a deterministic milestone
//! schedule, a client-facing update thread, and a briefing questionnaire.
//! Progress is derived from dates and milestone completion on every read,
//! never stored.
//!
//! ## Architecture
//!
//! ```text
//! Paid order (orders / order_items)
//!     ↓ create_project_from_order
//! PostgreSQL runtime state (projects, project_milestones, project_forms)
//!     ↓ privileged boundary (create-milestones, create-project-update)
//! Update thread visible to client + admin
//!     ↓ derive on read
//! progress_percentage (time-based, milestone fallback, clamped)
//! ```
//!
//! ## Module Structure
//!
//! - [`plan`] — Duration estimate and the fixed milestone schedule
//! - [`progress`] — Project status parsing and derived progress calculation
//! - [`form`] — Typed briefing questionnaire with default-filling
//! - [`lifecycle`] — Creation from orders, detail reads, update thread

mod form;
mod lifecycle;
mod plan;
mod progress;

pub use form::*;
pub use lifecycle::*;
pub use plan::*;
pub use progress::*;
