//! The visit logger root.

use crate::capture::{capture, PageSnapshot};
use crate::events::{EventDispatcher, EventKind};
use chrono::{FixedOffset, Offset, Utc};
use reqwest::Url;
use std::sync::Arc;
use tally_lock::StorageLock;
use tally_log::{entries_to_csv, AppendOutcome, ArchiveReport, EventLogStore, LogError, RevisitGuard};
use tally_stats::{group_visits, summarize, summary_to_csv, DayGroup, LogSummary};
use tally_types::{
    load_or_default, save, ArchiveSink, Clock, KvStore, LogEntry, LoggerSettings, SystemClock,
    LOGGER_SETTINGS_KEY, LOG_LOCK_KEY,
};

#[derive(Debug, Clone, PartialEq)]
pub enum LoggerEvent {
    Logged { subject_id: String, live_len: usize },
    Skipped { path: String },
    Archived(ArchiveReport),
    LockTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerEventKind {
    Logged,
    Skipped,
    Archived,
    LockTimeout,
}

impl EventKind for LoggerEvent {
    type Kind = LoggerEventKind;

    fn kind(&self) -> LoggerEventKind {
        match self {
            LoggerEvent::Logged { .. } => LoggerEventKind::Logged,
            LoggerEvent::Skipped { .. } => LoggerEventKind::Skipped,
            LoggerEvent::Archived(_) => LoggerEventKind::Archived,
            LoggerEvent::LockTimeout => LoggerEventKind::LockTimeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisitOutcome {
    Logged(AppendOutcome),
    /// Same page reloaded within the revisit window.
    Skipped,
    /// Not an order page, or the order marker is missing.
    NotFound,
}

/// Visit logger state: durable log and settings, per-session revisit times and lock.
pub struct VisitLogger {
    durable: Arc<dyn KvStore>,
    session: Arc<dyn KvStore>,
    log: EventLogStore,
    events: EventDispatcher<LoggerEvent>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl VisitLogger {
    /// `durable` holds the log and settings; `session` holds the lock slot and
    /// revisit times and is shared by every context of one session.
    pub fn new(
        durable: Arc<dyn KvStore>,
        session: Arc<dyn KvStore>,
        sink: Arc<dyn ArchiveSink>,
    ) -> Self {
        let lock = StorageLock::new(Arc::clone(&session), LOG_LOCK_KEY);
        Self {
            log: EventLogStore::new(Arc::clone(&durable), lock, sink),
            durable,
            session,
            events: EventDispatcher::new(),
            clock: Arc::new(SystemClock),
            offset: Utc.fix(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.log = self.log.with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Offset used for local dates and hours in grouped views and summaries.
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn events(&self) -> &EventDispatcher<LoggerEvent> {
        &self.events
    }

    pub async fn settings(&self) -> LoggerSettings {
        load_or_default(self.durable.as_ref(), LOGGER_SETTINGS_KEY).await
    }

    pub async fn update_settings(&self, settings: LoggerSettings) -> Result<LoggerSettings, LogError> {
        save(self.durable.as_ref(), LOGGER_SETTINGS_KEY, &settings).await?;
        self.log.set_capacity(settings.log_limit);
        tracing::info!(log_limit = settings.log_limit, "logger settings updated");
        Ok(settings)
    }

    fn notify(&self, settings: &LoggerSettings, event: LoggerEvent) {
        if settings.notify {
            self.events.emit(&event);
        }
    }

    /// Log a page visit.
    pub async fn record_visit(&self, snapshot: &PageSnapshot) -> Result<VisitOutcome, LogError> {
        let now = self.clock.now();
        let Some(entry) = capture(snapshot, now) else {
            return Ok(VisitOutcome::NotFound);
        };
        let settings = self.settings().await;

        if settings.no_log_on_refresh {
            let path = Url::parse(&snapshot.url)
                .map(|u| u.path().to_string())
                .unwrap_or_else(|_| snapshot.url.clone());
            let guard = RevisitGuard::new(Arc::clone(&self.session), settings.revisit_window_ms);
            if !guard.should_log(&path, now).await {
                tracing::debug!(path = %path, "visit skipped (reload)");
                self.notify(&settings, LoggerEvent::Skipped { path });
                return Ok(VisitOutcome::Skipped);
            }
        }

        self.log.set_capacity(settings.log_limit);
        let subject_id = entry.subject_id.clone();
        match self.log.append(entry).await {
            Ok(outcome) => {
                if let Some(report) = &outcome.archived {
                    self.notify(&settings, LoggerEvent::Archived(report.clone()));
                }
                tracing::info!(subject_id = %subject_id, live_len = outcome.live_len, "visit logged");
                self.notify(
                    &settings,
                    LoggerEvent::Logged {
                        subject_id,
                        live_len: outcome.live_len,
                    },
                );
                Ok(VisitOutcome::Logged(outcome))
            }
            Err(e) => {
                if matches!(e, LogError::LockTimeout(_)) {
                    tracing::error!(error = %e, "could not acquire lock to save log");
                    self.notify(&settings, LoggerEvent::LockTimeout);
                }
                Err(e)
            }
        }
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.log.read_all().await
    }

    pub async fn grouped(&self) -> Vec<DayGroup> {
        group_visits(&self.entries().await, self.offset)
    }

    pub async fn summary(&self) -> Option<LogSummary> {
        summarize(&self.entries().await, self.offset)
    }

    pub async fn summary_csv(&self) -> Option<String> {
        self.summary().await.map(|s| summary_to_csv(&s))
    }

    /// Full log as CSV with its suggested filename.
    pub async fn export_csv(&self) -> (String, String) {
        let filename = format!("logs_export_{}.csv", self.clock.now().format("%Y-%m-%d"));
        (filename, entries_to_csv(&self.entries().await))
    }

    pub async fn clear(&self) -> Result<(), LogError> {
        self.log.clear().await
    }
}
