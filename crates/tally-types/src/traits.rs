//! Traits for persistence, archival, external sources, and time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Mutex;

/// Key-value storage abstraction (browser-style `getValue`/`setValue`).
///
/// Values are structured JSON. Backends decide how they persist; one instance is
/// shared by every context that should see the same data.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key was never written or was removed.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;

    /// Remove a key. Idempotent.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Read and decode a typed value.
///
/// A stored value that does not decode as `T` yields [`StoreError::Parse`].
pub async fn load<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        None => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| StoreError::Parse {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}

/// Read a typed value, falling back to `T::default()` when absent, unreadable, or corrupt.
///
/// The corrupt value is left as is.
pub async fn load_or_default<T: DeserializeOwned + Default>(store: &dyn KvStore, key: &str) -> T {
    match load(store, key).await {
        Ok(Some(v)) => v,
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(key, error = %e, "falling back to defaults");
            T::default()
        }
    }
}

/// Encode and write a typed value.
pub async fn save<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let v = serde_json::to_value(value).map_err(|e| StoreError::Parse {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set(key, v).await
}

/// Destination for archived log blobs.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    async fn export(&self, bytes: Vec<u8>, suggested_filename: &str) -> Result<(), ArchiveError>;
}

/// Source of the raw schedule payload (`{ data: { shifts: [...] } }`).
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn fetch(&self) -> Result<serde_json::Value, SourceError>;
}

/// Source of the currency conversion rate.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rate(&self) -> Result<f64, SourceError>;
}

/// Wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock reading the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("malformed value under {key}: {message}")]
    Parse { key: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive export failed: {0}")]
    Export(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("unrecognized response: {0}")]
    Format(String),
}
