//! Application roots: the visit logger and the shift dashboard.
//!
//! Each root owns its stores and collaborators explicitly and reports what happened
//! through a typed [`EventDispatcher`].

mod capture;
mod dashboard;
mod events;
mod logger;

pub use capture::{capture, classify_referrer, subject_id_from_marker, PageSnapshot, ORDER_PATH};
pub use dashboard::{DashboardError, DashboardEvent, DashboardEventKind, SalaryView, ShiftDashboard};
pub use events::{EventDispatcher, EventKind};
pub use logger::{LoggerEvent, LoggerEventKind, VisitLogger, VisitOutcome};
