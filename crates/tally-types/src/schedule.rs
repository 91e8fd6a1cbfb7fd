//! Shift records as received from the schedule feed, and the cached snapshot.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parse a feed timestamp. Naive values are taken as UTC; explicit offsets are honored.
pub fn parse_feed_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// One scheduled shift, kept verbatim from the feed.
///
/// `title` encodes `"<PersonName> (<RoleTag>)"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub starts_at: String,
    pub ends_at: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ScheduleRecord {
    pub fn start(&self) -> Option<DateTime<Utc>> {
        parse_feed_instant(&self.starts_at)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        parse_feed_instant(&self.ends_at)
    }

    /// Person name: the title text before the role tag, trimmed.
    pub fn person_name(&self) -> Option<&str> {
        let idx = self.title.find(" (")?;
        let name = self.title[..idx].trim();
        (!name.is_empty()).then_some(name)
    }

    /// Text inside the first pair of parentheses, if any.
    pub fn role_tag(&self) -> Option<&str> {
        let open = self.title.find('(')?;
        let rest = &self.title[open + 1..];
        let close = rest.find(')')?;
        let tag = rest[..close].trim();
        (!tag.is_empty()).then_some(tag)
    }

    /// True when the title starts with `"<name> ("`.
    pub fn belongs_to(&self, person: &str) -> bool {
        self.title.starts_with(&format!("{person} ("))
    }

    /// Key grouping shifts that cover the same time slot.
    pub fn slot_key(&self) -> String {
        format!("{}|{}", self.starts_at, self.ends_at)
    }
}

/// Cached result of the last successful schedule refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    #[serde(alias = "timestamp")]
    pub fetched_at: DateTime<Utc>,
    pub shifts: Vec<ScheduleRecord>,
}
