//! Turning an observed page into a log entry.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tally_types::{Details, LogEntry, NOT_AVAILABLE};

/// Path fragment that marks an order page.
pub const ORDER_PATH: &str = "/orders/";

const SOURCE_PARAMS: [&str; 3] = ["source", "from", "ref"];

/// What the caller saw on a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    #[serde(default)]
    pub referrer: Option<String>,
    /// Text of the element carrying the order number.
    #[serde(default)]
    pub subject_marker: Option<String>,
    #[serde(default)]
    pub details: Details,
}

/// First run of ASCII digits in `marker`, or `N/A`.
pub fn subject_id_from_marker(marker: &str) -> String {
    let digits: String = marker
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        digits
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Describe how the visitor reached `page`.
///
/// A `source`, `from` or `ref` query parameter on the page wins; otherwise the
/// referrer is classified as direct, internal (path and query) or external (host).
pub fn classify_referrer(page: &Url, referrer: Option<&str>) -> String {
    for name in SOURCE_PARAMS {
        let value = page
            .query_pairs()
            .find(|(k, v)| **k == *name && !v.is_empty())
            .map(|(_, v)| v.into_owned());
        if let Some(value) = value {
            return format!("Opened via: {}", capitalize(&value));
        }
    }

    let Some(referrer) = referrer.filter(|r| !r.trim().is_empty()) else {
        return "Direct Visit".to_string();
    };
    match Url::parse(referrer) {
        Ok(url) if url.host_str() == page.host_str() => match url.query() {
            Some(q) => format!("{}?{q}", url.path()),
            None => url.path().to_string(),
        },
        Ok(url) => format!("External: {}", url.host_str().unwrap_or_default()),
        Err(_) => "Invalid Referrer".to_string(),
    }
}

fn clean_details(details: &Details) -> Details {
    details
        .iter()
        .map(|(k, v)| {
            let value = v.split_whitespace().collect::<Vec<_>>().join(" ");
            if value.is_empty() {
                (k, NOT_AVAILABLE.to_string())
            } else {
                (k, value)
            }
        })
        .collect()
}

/// Build a log entry for an order page, or `None` when the page is not one or the
/// order marker is missing.
pub fn capture(snapshot: &PageSnapshot, now: DateTime<Utc>) -> Option<LogEntry> {
    let page = match Url::parse(&snapshot.url) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(url = %snapshot.url, error = %e, "not a page url");
            return None;
        }
    };
    if !page.path().contains(ORDER_PATH) {
        return None;
    }
    let marker = snapshot.subject_marker.as_deref()?;

    Some(LogEntry {
        timestamp: now,
        subject_id: subject_id_from_marker(marker),
        link: snapshot.url.clone(),
        referrer: classify_referrer(&page, snapshot.referrer.as_deref()),
        details: clean_details(&snapshot.details),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAGE: &str = "https://desk.example.com/support/dashboard/orders/123456";

    fn page(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn query_source_wins() {
        let p = page(&format!("{PAGE}?from=telegram"));
        assert_eq!(
            classify_referrer(&p, Some("https://desk.example.com/x")),
            "Opened via: Telegram"
        );
        let p = page(&format!("{PAGE}?ref=slack&source=mail"));
        assert_eq!(classify_referrer(&p, None), "Opened via: Mail");
    }

    #[test]
    fn referrer_kinds() {
        let p = page(PAGE);
        assert_eq!(classify_referrer(&p, None), "Direct Visit");
        assert_eq!(classify_referrer(&p, Some("")), "Direct Visit");
        assert_eq!(
            classify_referrer(&p, Some("https://desk.example.com/support/dashboard?tab=new")),
            "/support/dashboard?tab=new"
        );
        assert_eq!(
            classify_referrer(&p, Some("https://mail.google.com/mail/u/0")),
            "External: mail.google.com"
        );
        assert_eq!(classify_referrer(&p, Some("not a url")), "Invalid Referrer");
    }

    #[test]
    fn marker_digits() {
        assert_eq!(subject_id_from_marker("Order #123456 (urgent)"), "123456");
        assert_eq!(subject_id_from_marker("Order 12-34"), "12");
        assert_eq!(subject_id_from_marker("no number"), "N/A");
    }

    #[test]
    fn capture_builds_entry_for_order_pages_only() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut snapshot = PageSnapshot {
            url: PAGE.to_string(),
            referrer: None,
            subject_marker: Some("#123456".to_string()),
            details: [("Status", "  In   progress "), ("Writer", "")]
                .into_iter()
                .collect(),
        };

        let entry = capture(&snapshot, now).unwrap();
        assert_eq!(entry.subject_id, "123456");
        assert_eq!(entry.link, PAGE);
        assert_eq!(entry.referrer, "Direct Visit");
        assert_eq!(entry.details.get("Status"), Some("In progress"));
        assert_eq!(entry.details.get("Writer"), Some("N/A"));

        snapshot.subject_marker = None;
        assert!(capture(&snapshot, now).is_none());

        snapshot.subject_marker = Some("#1".to_string());
        snapshot.url = "https://desk.example.com/support/dashboard".to_string();
        assert!(capture(&snapshot, now).is_none());
    }
}
