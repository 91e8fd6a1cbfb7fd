use crate::ScheduleError;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use tally_stats::shift_kind;
use tally_types::ScheduleRecord;

const PRODID: &str = "-//Tally//Shift Dashboard//EN";
const UID_DOMAIN: &str = "tally";

/// Which shifts go into an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IcsMode {
    /// The person's own shifts.
    Mine,
    /// Every shift sharing a time slot with one of the person's.
    Contextual,
    /// Everything, grouped by slot.
    All,
}

impl FromStr for IcsMode {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mine" => Ok(IcsMode::Mine),
            "contextual" => Ok(IcsMode::Contextual),
            "all" => Ok(IcsMode::All),
            other => Err(ScheduleError::Format(format!("unknown export mode {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcsExport {
    pub filename: String,
    pub content: String,
    pub events: usize,
}

fn ics_instant(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

fn slug(person: &str) -> String {
    person.to_lowercase().replace(' ', "_")
}

/// Group shifts by slot, preserving first-seen slot order.
fn by_slot<'a>(shifts: impl Iterator<Item = &'a ScheduleRecord>) -> Vec<(String, Vec<&'a ScheduleRecord>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<&ScheduleRecord>)> = Vec::new();
    for shift in shifts {
        let key = shift.slot_key();
        match index.get(&key) {
            Some(&i) => groups[i].1.push(shift),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![shift]));
            }
        }
    }
    groups
}

fn select<'a>(
    shifts: &'a [ScheduleRecord],
    mode: IcsMode,
    person: Option<&str>,
) -> Result<(Vec<&'a ScheduleRecord>, String), ScheduleError> {
    match (mode, person) {
        (IcsMode::All, _) => {
            let selected = by_slot(shifts.iter())
                .into_iter()
                .flat_map(|(_, group)| group)
                .collect();
            Ok((selected, "all_shifts.ics".to_string()))
        }
        (IcsMode::Mine, Some(person)) => {
            let selected = shifts.iter().filter(|s| s.belongs_to(person)).collect();
            Ok((selected, format!("{}_shifts.ics", slug(person))))
        }
        (IcsMode::Contextual, Some(person)) => {
            let mine: Vec<String> = by_slot(shifts.iter().filter(|s| s.belongs_to(person)))
                .into_iter()
                .map(|(key, _)| key)
                .collect();
            let slots: HashMap<String, Vec<&ScheduleRecord>> = by_slot(shifts.iter()).into_iter().collect();
            let selected = mine
                .iter()
                .filter_map(|key| slots.get(key))
                .flat_map(|group| group.iter().copied())
                .collect();
            Ok((selected, format!("{}_team_shifts.ics", slug(person))))
        }
        (_, None) => Err(ScheduleError::Empty),
    }
}

/// Render the selected shifts as an iCalendar document.
///
/// `stamp` becomes every event's `DTSTAMP`. Shifts whose times do not parse are
/// left out; an empty selection is an error.
pub fn export_ics(
    shifts: &[ScheduleRecord],
    mode: IcsMode,
    person: Option<&str>,
    stamp: DateTime<Utc>,
    display_offset: FixedOffset,
) -> Result<IcsExport, ScheduleError> {
    let (selected, filename) = select(shifts, mode, person)?;
    let description = match mode {
        IcsMode::Mine => "Your work shift",
        IcsMode::Contextual | IcsMode::All => "Work Shift",
    };

    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{PRODID}"),
    ];
    let mut events = 0;
    for shift in selected {
        let (Some(start), Some(end)) = (shift.start(), shift.end()) else {
            continue;
        };
        let kind = shift_kind(start, display_offset);
        lines.extend([
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}@{UID_DOMAIN}", shift.id),
            format!("DTSTAMP:{}", ics_instant(stamp)),
            format!("DTSTART:{}", ics_instant(start)),
            format!("DTEND:{}", ics_instant(end)),
            format!("SUMMARY:{}", escape_text(&shift.title)),
            "LOCATION:Remote".to_string(),
            format!("DESCRIPTION:{}", escape_text(&format!("{description}. Type: {kind}"))),
            "END:VEVENT".to_string(),
        ]);
        events += 1;
    }
    if events == 0 {
        return Err(ScheduleError::Empty);
    }
    lines.push("END:VCALENDAR".to_string());

    Ok(IcsExport {
        filename,
        content: lines.join("\r\n"),
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn shift(id: &str, title: &str, starts_at: &str, ends_at: &str) -> ScheduleRecord {
        ScheduleRecord {
            id: id.to_string(),
            starts_at: starts_at.to_string(),
            ends_at: ends_at.to_string(),
            title: title.to_string(),
            color: None,
        }
    }

    fn shifts() -> Vec<ScheduleRecord> {
        vec![
            shift("1", "Jane Doe (OC)", "2024-03-05T06:00:00", "2024-03-05T14:00:00"),
            shift("2", "Bob Ray (AS)", "2024-03-06T06:00:00", "2024-03-06T14:00:00"),
            shift("3", "Ann Lee (CEM)", "2024-03-05T06:00:00", "2024-03-05T14:00:00"),
            shift("4", "Ray, Jr (AS)", "2024-03-07T20:00:00", "2024-03-08T04:00:00"),
        ]
    }

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    fn kyiv() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn uids(export: &IcsExport) -> Vec<&str> {
        export
            .content
            .split("\r\n")
            .filter_map(|l| l.strip_prefix("UID:"))
            .collect()
    }

    #[test]
    fn mine_exports_only_the_person() {
        let export =
            export_ics(&shifts(), IcsMode::Mine, Some("Jane Doe"), stamp(), kyiv()).unwrap();
        assert_eq!(export.filename, "jane_doe_shifts.ics");
        assert_eq!(uids(&export), vec!["1@tally"]);
        assert!(export.content.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(export.content.ends_with("END:VCALENDAR"));
        assert!(export.content.contains("DTSTAMP:20240301T093000Z"));
        assert!(export.content.contains("DTSTART:20240305T060000Z"));
        assert!(export.content.contains("DTEND:20240305T140000Z"));
        assert!(export.content.contains("DESCRIPTION:Your work shift. Type: Day"));
    }

    #[test]
    fn contextual_includes_slot_mates() {
        let export = export_ics(
            &shifts(),
            IcsMode::Contextual,
            Some("Jane Doe"),
            stamp(),
            kyiv(),
        )
        .unwrap();
        assert_eq!(export.filename, "jane_doe_team_shifts.ics");
        assert_eq!(uids(&export), vec!["1@tally", "3@tally"]);
    }

    #[test]
    fn all_groups_by_slot() {
        let export = export_ics(&shifts(), IcsMode::All, None, stamp(), kyiv()).unwrap();
        assert_eq!(export.filename, "all_shifts.ics");
        assert_eq!(export.events, 4);
        assert_eq!(uids(&export), vec!["1@tally", "3@tally", "2@tally", "4@tally"]);
        assert!(export.content.contains("SUMMARY:Ray\\, Jr (AS)"));
        assert!(export.content.contains("Type: Night"));
    }

    #[test]
    fn empty_selection_is_an_error() {
        let err = export_ics(&shifts(), IcsMode::Mine, Some("Nobody"), stamp(), kyiv()).unwrap_err();
        assert!(matches!(err, ScheduleError::Empty));
        let err = export_ics(&shifts(), IcsMode::Contextual, None, stamp(), kyiv()).unwrap_err();
        assert!(matches!(err, ScheduleError::Empty));
    }

    #[test]
    fn modes_parse() {
        assert_eq!("contextual".parse::<IcsMode>().unwrap(), IcsMode::Contextual);
        assert!("team".parse::<IcsMode>().is_err());
    }
}
