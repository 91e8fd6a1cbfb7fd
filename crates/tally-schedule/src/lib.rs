//! Shift schedule cache and calendar (ICS) export.

mod cache;
mod ics;

pub use cache::{cache_window, decode_payload, ScheduleCache, ScheduleError};
pub use ics::{export_ics, IcsExport, IcsMode};
