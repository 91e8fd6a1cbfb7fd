use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tally_types::{ScheduleRecord, ScheduleSnapshot};

const CEM_TAG: &str = "(CEM";
const UNASSIGNED: &str = "Unassigned";

/// Shift type by start hour in the display timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShiftKind {
    Day,
    Evening,
    Night,
}

impl fmt::Display for ShiftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShiftKind::Day => "Day",
            ShiftKind::Evening => "Evening",
            ShiftKind::Night => "Night",
        })
    }
}

/// Day `[07, 15)`, Evening `[15, 19)`, Night otherwise.
pub fn shift_kind(start: DateTime<Utc>, display_offset: FixedOffset) -> ShiftKind {
    match start.with_timezone(&display_offset).hour() {
        7..=14 => ShiftKind::Day,
        15..=18 => ShiftKind::Evening,
        _ => ShiftKind::Night,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotPerson {
    pub name: String,
    pub role: Option<String>,
    /// How many records this person has in the slot.
    pub count: usize,
    pub highlighted: bool,
}

/// Shifts sharing the same start and end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotGroup {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub kind: ShiftKind,
    pub people: Vec<SlotPerson>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub cem: Vec<String>,
    pub slots: Vec<SlotGroup>,
}

/// A month laid out Monday-first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthCalendar {
    pub year: i32,
    pub month: u32,
    /// Empty cells before day 1 in a Monday-first week.
    pub leading_blanks: u32,
    pub days: Vec<CalendarDay>,
}

fn display_name(record: &ScheduleRecord) -> String {
    if let Some(name) = record.person_name() {
        return name.to_string();
    }
    let title = record.title.trim();
    if title.is_empty() {
        UNASSIGNED.to_string()
    } else {
        title.to_string()
    }
}

fn cem_names<'a>(records: impl Iterator<Item = &'a ScheduleRecord>) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut names: Vec<String> = Vec::new();
    for record in records.filter(|r| r.title.contains(CEM_TAG)) {
        if let Some(name) = record.person_name() {
            if seen.insert(name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

fn slot_groups(
    records: &[&ScheduleRecord],
    highlight: Option<&str>,
    display_offset: FixedOffset,
) -> Vec<SlotGroup> {
    let mut slot_index: HashMap<String, usize> = HashMap::new();
    let mut by_slot: Vec<Vec<&ScheduleRecord>> = Vec::new();
    for &record in records {
        let key = record.slot_key();
        match slot_index.get(&key) {
            Some(&i) => by_slot[i].push(record),
            None => {
                slot_index.insert(key, by_slot.len());
                by_slot.push(vec![record]);
            }
        }
    }

    let mut groups: Vec<SlotGroup> = by_slot
        .into_iter()
        .filter_map(|group| {
            let first = group.first()?;
            let start = first.start()?;
            let mut person_index: HashMap<String, usize> = HashMap::new();
            let mut people: Vec<SlotPerson> = Vec::new();
            for record in &group {
                let name = display_name(record);
                match person_index.get(&name) {
                    Some(&i) => people[i].count += 1,
                    None => {
                        person_index.insert(name.clone(), people.len());
                        people.push(SlotPerson {
                            highlighted: highlight == Some(name.as_str()),
                            role: record.role_tag().map(str::to_string),
                            name,
                            count: 1,
                        });
                    }
                }
            }
            Some(SlotGroup {
                start,
                end: first.end(),
                kind: shift_kind(start, display_offset),
                people,
            })
        })
        .collect();
    groups.sort_by_key(|g| g.start);
    groups
}

/// Lay out `year-month` from `snapshot`. Days are keyed by the UTC date of each
/// shift's start. `None` for an invalid month.
pub fn month_calendar(
    snapshot: &ScheduleSnapshot,
    year: i32,
    month: u32,
    highlight: Option<&str>,
    display_offset: FixedOffset,
) -> Option<MonthCalendar> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(chrono::Months::new(1))?;
    let days_in_month = next.signed_duration_since(first).num_days() as u32;

    let days = (1..=days_in_month)
        .filter_map(|d| NaiveDate::from_ymd_opt(year, month, d))
        .map(|date| {
            let on_day: Vec<&ScheduleRecord> = snapshot
                .shifts
                .iter()
                .filter(|s| s.start().is_some_and(|st| st.date_naive() == date))
                .collect();
            CalendarDay {
                date,
                cem: cem_names(on_day.iter().copied()),
                slots: slot_groups(&on_day, highlight, display_offset),
            }
        })
        .collect();

    Some(MonthCalendar {
        year,
        month,
        leading_blanks: first.weekday().num_days_from_monday(),
        days,
    })
}

/// The months the calendar may show: the current UTC month and the next.
pub fn navigable_months(now: DateTime<Utc>) -> [(i32, u32); 2] {
    let (year, month) = (now.year(), now.month());
    let next = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    [(year, month), next]
}

/// CEM names on shifts starting on `now`'s UTC date.
pub fn cem_today(snapshot: &ScheduleSnapshot, now: DateTime<Utc>) -> Vec<String> {
    let today = now.format("%Y-%m-%d").to_string();
    cem_names(
        snapshot
            .shifts
            .iter()
            .filter(|s| s.starts_at.starts_with(&today)),
    )
}
