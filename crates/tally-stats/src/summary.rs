use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tally_types::LogEntry;

const TOP_SUBJECTS: usize = 10;
const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub visits: usize,
    pub unique_subjects: usize,
}

/// Aggregate view of the whole visit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSummary {
    pub total_visits: usize,
    pub unique_subjects: usize,
    pub first_visit: DateTime<Utc>,
    pub last_visit: DateTime<Utc>,
    /// Keyed by UTC date, ascending.
    pub daily: Vec<DailyStats>,
    /// Visits per local hour of day.
    pub hourly: [usize; 24],
    /// Up to ten subjects, most visited first.
    pub top_subjects: Vec<(String, usize)>,
    pub statuses: Vec<(String, usize)>,
    pub referrers: Vec<(String, usize)>,
    pub avg_visits_per_day: f64,
}

/// Count occurrences preserving first-seen order, then sort by count descending.
/// The sort is stable, so ties keep first-seen order.
fn histogram<'a>(values: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in values {
        match index.get(value) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(value, counts.len());
                counts.push((value.to_string(), 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Summarize `entries` (newest first). `None` for an empty log.
pub fn summarize(entries: &[LogEntry], offset: FixedOffset) -> Option<LogSummary> {
    let first_visit = entries.iter().map(|e| e.timestamp).min()?;
    let last_visit = entries.iter().map(|e| e.timestamp).max()?;

    let unique_subjects = entries
        .iter()
        .map(|e| e.subject_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let mut days: HashMap<NaiveDate, (usize, HashSet<&str>)> = HashMap::new();
    let mut hourly = [0usize; 24];
    for entry in entries {
        let (visits, subjects) = days.entry(entry.timestamp.date_naive()).or_default();
        *visits += 1;
        subjects.insert(entry.subject_id.as_str());
        hourly[entry.timestamp.with_timezone(&offset).hour() as usize] += 1;
    }
    let mut days: Vec<_> = days.into_iter().collect();
    days.sort_by_key(|(d, _)| *d);
    let daily = days
        .into_iter()
        .map(|(date, (visits, subjects))| DailyStats {
            date,
            visits,
            unique_subjects: subjects.len(),
        })
        .collect();

    let mut top_subjects = histogram(entries.iter().map(|e| e.subject_id.as_str()));
    top_subjects.truncate(TOP_SUBJECTS);

    let span_ms = (last_visit - first_visit).num_milliseconds();
    let span_days = ((span_ms + DAY_MS - 1) / DAY_MS).max(1);

    Some(LogSummary {
        total_visits: entries.len(),
        unique_subjects,
        first_visit,
        last_visit,
        daily,
        hourly,
        top_subjects,
        statuses: histogram(entries.iter().map(|e| e.status())),
        referrers: histogram(entries.iter().map(|e| e.referrer.as_str())),
        avg_visits_per_day: entries.len() as f64 / span_days as f64,
    })
}

/// Sectioned CSV export of a summary, CRLF separated.
pub fn summary_to_csv(summary: &LogSummary) -> String {
    let mut lines = vec![
        "=== OVERALL STATISTICS ===".to_string(),
        "Metric,Value".to_string(),
        format!("Total Visits,{}", summary.total_visits),
        format!("Unique Orders,{}", summary.unique_subjects),
        format!(
            "Date Range,\"{} - {}\"",
            summary.first_visit.format("%Y-%m-%d"),
            summary.last_visit.format("%Y-%m-%d")
        ),
        format!("Average Visits Per Day,{:.1}", summary.avg_visits_per_day),
        String::new(),
        "=== DAILY VISIT STATISTICS ===".to_string(),
        "Date,Total Visits,Unique Orders".to_string(),
    ];
    lines.extend(
        summary
            .daily
            .iter()
            .map(|d| format!("{},{},{}", d.date, d.visits, d.unique_subjects)),
    );
    lines.push(String::new());
    lines.push("=== MOST VISITED ORDERS ===".to_string());
    lines.push("Order ID,Visit Count".to_string());
    lines.extend(
        summary
            .top_subjects
            .iter()
            .map(|(id, n)| format!("{id},{n}")),
    );
    lines.push(String::new());
    lines.push("=== STATUS DISTRIBUTION ===".to_string());
    lines.push("Status,Count".to_string());
    lines.extend(
        summary
            .statuses
            .iter()
            .map(|(s, n)| format!("\"{}\",{n}", s.replace('"', "\"\""))),
    );
    lines.join("\r\n")
}
