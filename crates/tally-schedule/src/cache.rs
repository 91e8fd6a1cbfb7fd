use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;
use tally_types::{
    load, save, KvStore, ScheduleRecord, ScheduleSnapshot, StoreError, SCHEDULE_CACHE_KEY,
};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("unrecognized schedule payload: {0}")]
    Format(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no shifts match the selection")]
    Empty,
}

/// Inclusive cache window for `now`: the first instant of its UTC month through
/// 23:59:59 on the last day of the following month.
pub fn cache_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let month_start = |year: i32, month: u32| {
        let (year, month) = if month > 12 {
            (year + 1, month - 12)
        } else {
            (year, month)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(now)
    };
    let start = month_start(now.year(), now.month());
    let end = month_start(now.year(), now.month() + 2) - Duration::seconds(1);
    (start, end)
}

/// Pull the shift list out of a `{ data: { shifts: [...] } }` payload.
///
/// Fails only when the list itself is missing. Individual records that do not
/// decode are dropped.
pub fn decode_payload(payload: &Value) -> Result<Vec<ScheduleRecord>, ScheduleError> {
    let shifts = payload
        .get("data")
        .and_then(|d| d.get("shifts"))
        .and_then(Value::as_array)
        .ok_or_else(|| ScheduleError::Format("expected data.shifts array".to_string()))?;

    let mut records = Vec::with_capacity(shifts.len());
    for raw in shifts {
        match serde_json::from_value::<ScheduleRecord>(raw.clone()) {
            Ok(record) => records.push(record),
            Err(e) => tracing::debug!(error = %e, "skipping malformed shift"),
        }
    }
    Ok(records)
}

/// Cached schedule snapshot, replaced wholesale on every refresh.
pub struct ScheduleCache {
    store: Arc<dyn KvStore>,
    key: String,
}

impl ScheduleCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            key: SCHEDULE_CACHE_KEY.to_string(),
        }
    }

    /// Replace the snapshot with the shifts of `payload` that start inside the
    /// window around `now`. Returns how many were kept.
    ///
    /// A payload without a shift list leaves the cache untouched.
    pub async fn refresh(&self, payload: &Value, now: DateTime<Utc>) -> Result<usize, ScheduleError> {
        let records = decode_payload(payload)?;
        let received = records.len();
        let (from, to) = cache_window(now);
        let shifts: Vec<ScheduleRecord> = records
            .into_iter()
            .filter(|r| r.start().is_some_and(|s| from <= s && s <= to))
            .collect();

        let kept = shifts.len();
        let snapshot = ScheduleSnapshot {
            fetched_at: now,
            shifts,
        };
        save(self.store.as_ref(), &self.key, &snapshot).await?;
        tracing::info!(received, kept, "schedule cache refreshed");
        Ok(kept)
    }

    /// Current snapshot. An unreadable cache reads as absent.
    pub async fn get(&self) -> Option<ScheduleSnapshot> {
        match load::<ScheduleSnapshot>(self.store.as_ref(), &self.key).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "could not read schedule cache");
                None
            }
        }
    }

    pub async fn clear(&self) -> Result<(), ScheduleError> {
        self.store.remove(&self.key).await?;
        tracing::info!(key = %self.key, "schedule cache cleared");
        Ok(())
    }

    /// Sorted, de-duplicated person names across the cached shifts.
    pub async fn people(&self) -> Vec<String> {
        let Some(snapshot) = self.get().await else {
            return Vec::new();
        };
        let mut names: Vec<String> = snapshot
            .shifts
            .iter()
            .filter_map(|s| s.person_name())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tally_store::InMemoryKvStore;

    fn raw(id: u32, title: &str, starts_at: &str) -> Value {
        json!({"id": id, "title": title, "starts_at": starts_at, "ends_at": starts_at})
    }

    #[test]
    fn window_spans_current_and_next_month() {
        let now = Utc.with_ymd_and_hms(2024, 12, 15, 8, 0, 0).unwrap();
        let (from, to) = cache_window(now);
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap());
    }

    #[tokio::test]
    async fn refresh_keeps_only_the_rolling_window() {
        let cache = ScheduleCache::new(Arc::new(InMemoryKvStore::new()));
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let payload = json!({"data": {"shifts": [
            raw(1, "Jane Doe (OC)", "2024-03-01T00:00:00"),
            raw(2, "Jane Doe (OC)", "2024-04-30T23:59:59"),
            raw(3, "Jane Doe (OC)", "2024-02-29T23:59:59"),
            raw(4, "Jane Doe (OC)", "2024-05-01T00:00:00"),
            {"id": 5, "title": "No Start (AS)", "ends_at": "2024-03-02T08:00:00"},
            {"id": 6, "title": "Bad Start (AS)", "starts_at": "soon", "ends_at": "later"},
            "not a record",
        ]}});

        assert_eq!(cache.refresh(&payload, now).await.unwrap(), 2);
        let snapshot = cache.get().await.unwrap();
        let ids: Vec<&str> = snapshot.shifts.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(snapshot.fetched_at, now);
    }

    #[tokio::test]
    async fn bad_payload_leaves_cache_untouched() {
        let cache = ScheduleCache::new(Arc::new(InMemoryKvStore::new()));
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let good = json!({"data": {"shifts": [raw(1, "Jane Doe (OC)", "2024-03-10T08:00:00")]}});
        cache.refresh(&good, now).await.unwrap();

        let err = cache
            .refresh(&json!({"data": {"items": []}}), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Format(_)));
        assert_eq!(cache.get().await.unwrap().shifts.len(), 1);
    }

    #[tokio::test]
    async fn refresh_replaces_and_clear_removes() {
        let cache = ScheduleCache::new(Arc::new(InMemoryKvStore::new()));
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        cache
            .refresh(
                &json!({"data": {"shifts": [
                    raw(1, "Jane Doe (OC)", "2024-03-10T08:00:00"),
                    raw(2, "Ann Lee (CEM)", "2024-03-10T08:00:00"),
                    raw(3, "Jane Doe (AS)", "2024-03-11T08:00:00"),
                ]}}),
                now,
            )
            .await
            .unwrap();
        assert_eq!(cache.people().await, vec!["Ann Lee", "Jane Doe"]);

        cache
            .refresh(&json!({"data": {"shifts": []}}), now)
            .await
            .unwrap();
        assert!(cache.get().await.unwrap().shifts.is_empty());

        cache.clear().await.unwrap();
        assert!(cache.get().await.is_none());
        assert!(cache.people().await.is_empty());
    }
}
