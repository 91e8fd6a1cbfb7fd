//! CSV encoding of log entries (archive and export format).
//!
//! Columns: the fixed `timestamp, subjectId, link, referrer`, then the union of all
//! detail keys in first-seen order. Rows are CRLF-separated. A value containing a
//! comma, a quote or a line break is quoted with inner quotes doubled.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use tally_types::{Details, LogEntry};

pub const FIXED_COLUMNS: [&str; 4] = ["timestamp", "subjectId", "link", "referrer"];

#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    #[error("missing or unexpected header row")]
    Header,
    #[error("row {row}: invalid timestamp {value:?}")]
    Timestamp { row: usize, value: String },
    #[error("row {row}: expected {expected} fields, found {found}")]
    Width {
        row: usize,
        expected: usize,
        found: usize,
    },
}

pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn detail_columns(entries: &[LogEntry]) -> Vec<&str> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut keys: Vec<&str> = Vec::new();
    for entry in entries {
        for key in entry.details.keys() {
            if seen.insert(key) {
                keys.push(key);
            }
        }
    }
    keys
}

/// Encode entries; empty input yields an empty string.
pub fn entries_to_csv(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let details = detail_columns(entries);
    let header: Vec<String> = FIXED_COLUMNS
        .iter()
        .copied()
        .chain(details.iter().copied())
        .map(escape_field)
        .collect();

    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push(header.join(","));
    for entry in entries {
        let timestamp = entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut fields = vec![
            escape_field(&timestamp),
            escape_field(&entry.subject_id),
            escape_field(&entry.link),
            escape_field(&entry.referrer),
        ];
        fields.extend(
            details
                .iter()
                .map(|k| escape_field(entry.details.get(k).unwrap_or(""))),
        );
        lines.push(fields.join(","));
    }
    lines.join("\r\n")
}

/// Split CSV text into records of fields. Accepts CRLF or LF row separators and
/// quoted fields with doubled inner quotes.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if !field_started => {
                in_quotes = true;
                field_started = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                field_started = false;
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }
    if field_started || !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

/// Decode entries written by [`entries_to_csv`]. Empty detail cells are treated
/// as absent keys.
pub fn entries_from_csv(text: &str) -> Result<Vec<LogEntry>, CsvError> {
    let mut records = parse_csv(text).into_iter();
    let Some(header) = records.next() else {
        return Ok(Vec::new());
    };
    if header.len() < FIXED_COLUMNS.len()
        || header.iter().zip(FIXED_COLUMNS).any(|(h, f)| h != f)
    {
        return Err(CsvError::Header);
    }
    let detail_keys = &header[FIXED_COLUMNS.len()..];

    let mut entries = Vec::new();
    for (i, fields) in records.enumerate() {
        let row = i + 1;
        if fields.len() != header.len() {
            return Err(CsvError::Width {
                row,
                expected: header.len(),
                found: fields.len(),
            });
        }
        let timestamp = DateTime::parse_from_rfc3339(&fields[0])
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| CsvError::Timestamp {
                row,
                value: fields[0].clone(),
            })?;
        let details: Details = detail_keys
            .iter()
            .zip(&fields[FIXED_COLUMNS.len()..])
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.push(LogEntry {
            timestamp,
            subject_id: fields[1].clone(),
            link: fields[2].clone(),
            referrer: fields[3].clone(),
            details,
        });
    }
    Ok(entries)
}
