//! Pure aggregations over the visit log and the shift schedule.
//!
//! Nothing here touches storage; callers pass snapshots in and get plain values back.

mod calendar;
mod salary;
mod status;
mod summary;
mod visits;

pub use calendar::{
    cem_today, month_calendar, navigable_months, shift_kind, CalendarDay, MonthCalendar,
    ShiftKind, SlotGroup, SlotPerson,
};
pub use salary::{role_multiplier, salary_for, split_hours, HourSplit, SalaryReport};
pub use status::{format_duration, shift_status, ShiftStatus};
pub use summary::{summarize, summary_to_csv, DailyStats, LogSummary};
pub use visits::{
    diff_details, format_time_since, group_visits, DayGroup, DetailChange, SubjectGroup,
    VisitView,
};
