//! Durable, newest-first visit log with a soft capacity.
//!
//! Every mutation runs under the shared [`StorageLock`] so independent contexts
//! writing the same key never lose each other's entries.

use crate::csv::entries_to_csv;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tally_lock::{LockError, StorageLock};
use tally_types::{
    load, save, ArchiveError, ArchiveSink, Clock, KvStore, LogEntry, LoggerSettings, StoreError,
    SystemClock, LOGS_KEY,
};

/// Fraction of capacity at which the next append archives the older half.
pub const ARCHIVE_THRESHOLD: f64 = 0.95;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error(transparent)]
    LockTimeout(#[from] LockError),
    #[error("persisted log is unreadable: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Result of a successful append.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AppendOutcome {
    pub live_len: usize,
    pub archived: Option<ArchiveReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArchiveReport {
    pub archived: usize,
    pub retained: usize,
    pub filename: String,
}

/// Whether a log holding `len` entries (before the pending append) must archive.
pub fn should_archive(len: usize, capacity: usize) -> bool {
    len / 2 > 0 && len as f64 >= capacity as f64 * ARCHIVE_THRESHOLD
}

fn archive_filename(now: DateTime<Utc>) -> String {
    format!("log_archive_{}.csv", now.format("%Y-%m-%d"))
}

pub struct EventLogStore {
    store: Arc<dyn KvStore>,
    lock: StorageLock,
    sink: Arc<dyn ArchiveSink>,
    clock: Arc<dyn Clock>,
    key: String,
    capacity: AtomicUsize,
}

impl EventLogStore {
    pub fn new(store: Arc<dyn KvStore>, lock: StorageLock, sink: Arc<dyn ArchiveSink>) -> Self {
        Self {
            store,
            lock,
            sink,
            clock: Arc::new(SystemClock),
            key: LOGS_KEY.to_string(),
            capacity: AtomicUsize::new(LoggerSettings::default().log_limit),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_capacity(self, capacity: usize) -> Self {
        self.set_capacity(capacity);
        self
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Relaxed);
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Prepend `entry`, archiving the older half first when the log is near capacity.
    ///
    /// Nothing is written when the lock cannot be taken, the stored log does not
    /// decode, or the archive export fails.
    pub async fn append(&self, entry: LogEntry) -> Result<AppendOutcome, LogError> {
        self.lock.with_lock(|| self.append_locked(entry)).await?
    }

    async fn append_locked(&self, entry: LogEntry) -> Result<AppendOutcome, LogError> {
        let mut entries = self.load_strict().await?;
        let len = entries.len();
        let capacity = self.capacity();

        let mut archived = None;
        if should_archive(len, capacity) {
            let count = len / 2;
            let oldest = entries.split_off(len - count);
            let filename = archive_filename(self.clock.now());
            self.sink
                .export(entries_to_csv(&oldest).into_bytes(), &filename)
                .await?;
            tracing::info!(
                archived = count,
                retained = entries.len(),
                filename = %filename,
                "archived older log entries"
            );
            archived = Some(ArchiveReport {
                archived: count,
                retained: entries.len(),
                filename,
            });
        }

        entries.insert(0, entry);
        save(self.store.as_ref(), &self.key, &entries).await?;
        Ok(AppendOutcome {
            live_len: entries.len(),
            archived,
        })
    }

    async fn load_strict(&self) -> Result<Vec<LogEntry>, LogError> {
        match load::<Vec<LogEntry>>(self.store.as_ref(), &self.key).await {
            Ok(entries) => Ok(entries.unwrap_or_default()),
            Err(StoreError::Parse { message, .. }) => Err(LogError::Corrupt(message)),
            Err(e) => Err(e.into()),
        }
    }

    /// Live entries, newest first. An unreadable log reads as empty.
    pub async fn read_all(&self) -> Vec<LogEntry> {
        match load::<Vec<LogEntry>>(self.store.as_ref(), &self.key).await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "could not read log");
                Vec::new()
            }
        }
    }

    pub async fn clear(&self) -> Result<(), LogError> {
        self.lock
            .with_lock(|| async {
                save(self.store.as_ref(), &self.key, &Vec::<LogEntry>::new()).await
            })
            .await??;
        tracing::info!(key = %self.key, "log cleared");
        Ok(())
    }
}
