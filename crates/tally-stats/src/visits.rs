use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tally_types::{Details, LogEntry, NOT_AVAILABLE};

/// One detail field that differs between two visits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailChange {
    pub key: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitView {
    pub entry: LogEntry,
    /// Changes against the chronologically previous visit of the same subject that day.
    pub changes: Vec<DetailChange>,
    /// Time since that previous visit, e.g. `1d 2h`; `None` for the first visit.
    pub since_previous: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectGroup {
    pub subject_id: String,
    /// Newest first.
    pub visits: Vec<VisitView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub subjects: Vec<SubjectGroup>,
}

/// Fields whose values differ; absent values show as `N/A`.
///
/// Keys are ordered by first appearance, current keys first.
pub fn diff_details(current: &Details, previous: &Details) -> Vec<DetailChange> {
    let mut keys: Vec<&str> = current.keys().collect();
    let mut seen: HashSet<&str> = keys.iter().copied().collect();
    for key in previous.keys() {
        if seen.insert(key) {
            keys.push(key);
        }
    }
    keys.into_iter()
        .filter_map(|key| {
            let now = current.get(key);
            let before = previous.get(key);
            (now != before).then(|| DetailChange {
                key: key.to_string(),
                from: before.unwrap_or(NOT_AVAILABLE).to_string(),
                to: now.unwrap_or(NOT_AVAILABLE).to_string(),
            })
        })
        .collect()
}

/// Largest two of days/hours/minutes between `a` and `b`, or whole seconds when
/// under a minute.
pub fn format_time_since(a: DateTime<Utc>, b: DateTime<Utc>) -> String {
    let millis = (a - b).num_milliseconds().abs();
    let mut secs = millis / 1000;
    let mut parts = Vec::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60)] {
        if secs >= size {
            parts.push(format!("{}{unit}", secs / size));
            secs %= size;
        }
    }
    if parts.is_empty() {
        return format!("{}s", (millis as f64 / 1000.0).round() as i64);
    }
    parts.truncate(2);
    parts.join(" ")
}

/// Group entries by local date, then by subject.
///
/// Dates are newest first, subjects ordered by their most recent visit, visits
/// newest first.
pub fn group_visits(entries: &[LogEntry], offset: FixedOffset) -> Vec<DayGroup> {
    let mut sorted: Vec<&LogEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    // Each day keeps its subjects in first-seen order plus an index into them.
    let mut day_index: HashMap<NaiveDate, usize> = HashMap::new();
    let mut days: Vec<(NaiveDate, Vec<(String, Vec<&LogEntry>)>, HashMap<&str, usize>)> = Vec::new();
    for entry in sorted {
        let date = entry.timestamp.with_timezone(&offset).date_naive();
        let idx = *day_index.entry(date).or_insert_with(|| {
            days.push((date, Vec::new(), HashMap::new()));
            days.len() - 1
        });
        let (_, subjects, subject_index) = &mut days[idx];
        match subject_index.get(entry.subject_id.as_str()) {
            Some(&i) => subjects[i].1.push(entry),
            None => {
                subject_index.insert(entry.subject_id.as_str(), subjects.len());
                subjects.push((entry.subject_id.clone(), vec![entry]));
            }
        }
    }

    days.into_iter()
        .map(|(date, subjects, _)| DayGroup {
            date,
            subjects: subjects
                .into_iter()
                .map(|(subject_id, visits)| SubjectGroup {
                    subject_id,
                    visits: visit_views(&visits),
                })
                .collect(),
        })
        .collect()
}

fn visit_views(visits: &[&LogEntry]) -> Vec<VisitView> {
    visits
        .iter()
        .enumerate()
        .map(|(i, visit)| {
            let previous = visits.get(i + 1);
            VisitView {
                entry: (*visit).clone(),
                changes: previous
                    .map(|p| diff_details(&visit.details, &p.details))
                    .unwrap_or_default(),
                since_previous: previous.map(|p| format_time_since(visit.timestamp, p.timestamp)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn details(pairs: &[(&str, &str)]) -> Details {
        pairs.iter().copied().collect()
    }

    fn visit(id: &str, ts: DateTime<Utc>, pairs: &[(&str, &str)]) -> LogEntry {
        LogEntry {
            timestamp: ts,
            subject_id: id.to_string(),
            link: String::new(),
            referrer: "Direct Visit".to_string(),
            details: details(pairs),
        }
    }

    #[test]
    fn diff_reports_changed_added_and_removed_keys() {
        let previous = details(&[("Status", "New"), ("Pages", "2"), ("Writer", "Sam")]);
        let current = details(&[("Status", "Done"), ("Pages", "2"), ("Price", "$10")]);
        let changes = diff_details(&current, &previous);
        let keys: Vec<&str> = changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["Status", "Price", "Writer"]);
        assert_eq!(changes[1].from, "N/A");
        assert_eq!(changes[2].to, "N/A");
    }

    #[test]
    fn diff_of_identical_details_is_empty() {
        let d = details(&[("Status", "New"), ("Pages", "2")]);
        assert!(diff_details(&d, &d).is_empty());
        assert!(diff_details(&Details::new(), &Details::new()).is_empty());
    }

    #[test]
    fn time_since_uses_two_largest_units() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let later = t + Duration::days(1) + Duration::hours(2) + Duration::minutes(3);
        assert_eq!(format_time_since(later, t), "1d 2h");
        assert_eq!(format_time_since(t, later), "1d 2h");
        assert_eq!(format_time_since(t + Duration::minutes(5), t), "5m");
        assert_eq!(format_time_since(t + Duration::seconds(42), t), "42s");
        assert_eq!(
            format_time_since(t + Duration::hours(3) + Duration::seconds(10), t),
            "3h"
        );
    }

    #[test]
    fn groups_by_day_then_subject() {
        let day1 = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        let entries = vec![
            visit("7", day2 + Duration::hours(2), &[("Status", "Done")]),
            visit("8", day2 + Duration::hours(1), &[]),
            visit("7", day2, &[("Status", "New")]),
            visit("7", day1, &[("Status", "New")]),
        ];

        let groups = group_visits(&entries, FixedOffset::east_opt(0).unwrap());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].date, day2.date_naive());
        let ids: Vec<&str> = groups[0]
            .subjects
            .iter()
            .map(|s| s.subject_id.as_str())
            .collect();
        assert_eq!(ids, vec!["7", "8"]);

        let seven = &groups[0].subjects[0];
        assert_eq!(seven.visits.len(), 2);
        assert_eq!(seven.visits[0].since_previous.as_deref(), Some("2h"));
        assert_eq!(seven.visits[0].changes[0].from, "New");
        assert_eq!(seven.visits[0].changes[0].to, "Done");
        assert!(seven.visits[1].changes.is_empty());
        assert_eq!(seven.visits[1].since_previous, None);
    }

    #[test]
    fn many_subjects_ordered_by_latest_visit() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut entries = Vec::new();
        for i in 0..500i64 {
            entries.push(visit(&i.to_string(), t + Duration::minutes(i), &[]));
            entries.push(visit(&i.to_string(), t + Duration::minutes(600 + i), &[]));
        }

        let groups = group_visits(&entries, FixedOffset::east_opt(0).unwrap());
        assert_eq!(groups.len(), 1);
        let subjects = &groups[0].subjects;
        assert_eq!(subjects.len(), 500);
        assert_eq!(subjects[0].subject_id, "499");
        assert_eq!(subjects[499].subject_id, "0");
        assert!(subjects.iter().all(|s| s.visits.len() == 2));
        assert_eq!(subjects[0].visits[0].since_previous.as_deref(), Some("10h"));
    }

    #[test]
    fn local_offset_moves_the_day_boundary() {
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap();
        let groups = group_visits(&[visit("1", late, &[])], FixedOffset::east_opt(3_600).unwrap());
        assert_eq!(groups[0].date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }
}
