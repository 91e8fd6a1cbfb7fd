use chrono::{DateTime, Duration, Utc};
use tally_types::{ScheduleRecord, ScheduleSnapshot};

/// Where a person stands relative to their shifts at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub enum ShiftStatus {
    /// No schedule cached, or no shifts for the person.
    NoData,
    OnShift {
        shift: ScheduleRecord,
        ends_in: Duration,
    },
    Upcoming {
        shift: ScheduleRecord,
        starts_in: Duration,
    },
    NoUpcoming,
}

/// Evaluate `person`'s status at `now`.
///
/// Shifts are ordered by start. A shift is current when `start <= now <= end`; if
/// several are, the latest-starting one is reported.
pub fn shift_status(
    snapshot: Option<&ScheduleSnapshot>,
    person: &str,
    now: DateTime<Utc>,
) -> ShiftStatus {
    let Some(snapshot) = snapshot else {
        return ShiftStatus::NoData;
    };
    let mut mine: Vec<(DateTime<Utc>, DateTime<Utc>, &ScheduleRecord)> = snapshot
        .shifts
        .iter()
        .filter(|s| s.belongs_to(person))
        .filter_map(|s| Some((s.start()?, s.end()?, s)))
        .collect();
    if mine.is_empty() {
        return ShiftStatus::NoData;
    }
    mine.sort_by_key(|(start, _, _)| *start);

    let current = mine
        .iter()
        .filter(|(start, end, _)| *start <= now && now <= *end)
        .last();
    if let Some((_, end, shift)) = current {
        return ShiftStatus::OnShift {
            shift: (*shift).clone(),
            ends_in: *end - now,
        };
    }
    match mine.iter().find(|(start, _, _)| *start > now) {
        Some((start, _, shift)) => ShiftStatus::Upcoming {
            shift: (*shift).clone(),
            starts_in: *start - now,
        },
        None => ShiftStatus::NoUpcoming,
    }
}

/// `Nd Nh Nm` from one day up, `HH:MM:SS` below. Negative durations show as zero.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
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

    fn snapshot(shifts: Vec<ScheduleRecord>) -> ScheduleSnapshot {
        ScheduleSnapshot {
            fetched_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            shifts,
        }
    }

    #[test]
    fn no_snapshot_or_no_shifts_is_no_data() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(shift_status(None, "Jane", now), ShiftStatus::NoData);
        let snap = snapshot(vec![shift("1", "John (OC)", "2024-03-01T08:00:00", "2024-03-01T16:00:00")]);
        assert_eq!(shift_status(Some(&snap), "Jane", now), ShiftStatus::NoData);
    }

    #[test]
    fn on_shift_then_upcoming_then_none() {
        let snap = snapshot(vec![
            shift("2", "Jane (OC)", "2024-03-02T08:00:00", "2024-03-02T16:00:00"),
            shift("1", "Jane (OC)", "2024-03-01T08:00:00", "2024-03-01T16:00:00"),
        ]);

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        match shift_status(Some(&snap), "Jane", now) {
            ShiftStatus::OnShift { shift, ends_in } => {
                assert_eq!(shift.id, "1");
                assert_eq!(ends_in, Duration::hours(7));
            }
            other => panic!("unexpected {other:?}"),
        }

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 17, 0, 0).unwrap();
        match shift_status(Some(&snap), "Jane", now) {
            ShiftStatus::Upcoming { shift, starts_in } => {
                assert_eq!(shift.id, "2");
                assert_eq!(starts_in, Duration::hours(15));
            }
            other => panic!("unexpected {other:?}"),
        }

        let now = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
        assert_eq!(shift_status(Some(&snap), "Jane", now), ShiftStatus::NoUpcoming);
    }

    #[test]
    fn overlapping_shifts_report_the_later_one() {
        let snap = snapshot(vec![
            shift("a", "Jane (OC)", "2024-03-01T08:00:00", "2024-03-01T16:00:00"),
            shift("b", "Jane (AS)", "2024-03-01T12:00:00", "2024-03-01T20:00:00"),
        ]);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap();
        match shift_status(Some(&snap), "Jane", now) {
            ShiftStatus::OnShift { shift, .. } => assert_eq!(shift.id, "b"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duration_formats() {
        assert_eq!(format_duration(Duration::seconds(3_725)), "01:02:05");
        assert_eq!(
            format_duration(Duration::days(2) + Duration::hours(3) + Duration::minutes(4)),
            "2d 3h 4m"
        );
        assert_eq!(format_duration(Duration::seconds(-5)), "00:00:00");
    }
}
