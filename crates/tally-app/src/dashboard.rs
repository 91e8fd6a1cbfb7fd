//! The shift dashboard root.

use crate::events::{EventDispatcher, EventKind};
use chrono::{FixedOffset, Offset, Utc};
use serde::Serialize;
use std::sync::Arc;
use tally_fetch::ExchangeRateCache;
use tally_schedule::{export_ics, IcsExport, IcsMode, ScheduleCache, ScheduleError};
use tally_stats::{
    cem_today, month_calendar, navigable_months, salary_for, shift_status, MonthCalendar,
    SalaryReport, ShiftStatus,
};
use tally_types::{
    load_or_default, save, Clock, KvStore, RateSettings, RateSource, ScheduleSnapshot,
    ScheduleSource, SourceError, StoreError, SystemClock, RATE_SETTINGS_KEY,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    ScheduleUpdated { kept: usize },
    FormatError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardEventKind {
    ScheduleUpdated,
    FormatError,
}

impl EventKind for DashboardEvent {
    type Kind = DashboardEventKind;

    fn kind(&self) -> DashboardEventKind {
        match self {
            DashboardEvent::ScheduleUpdated { .. } => DashboardEventKind::ScheduleUpdated,
            DashboardEvent::FormatError { .. } => DashboardEventKind::FormatError,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("no schedule source configured")]
    NoSource,
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Salary report plus the conversion applied to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalaryView {
    #[serde(flatten)]
    pub report: SalaryReport,
    pub exchange_rate: f64,
    pub converted_pay: f64,
}

/// Shift dashboard state: cached schedule, pay rates and exchange rate.
pub struct ShiftDashboard {
    store: Arc<dyn KvStore>,
    cache: ScheduleCache,
    rates: ExchangeRateCache,
    source: Option<Arc<dyn ScheduleSource>>,
    events: EventDispatcher<DashboardEvent>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    display_offset: FixedOffset,
}

impl ShiftDashboard {
    pub fn new(store: Arc<dyn KvStore>, rate_source: Arc<dyn RateSource>) -> Self {
        Self {
            cache: ScheduleCache::new(Arc::clone(&store)),
            rates: ExchangeRateCache::new(Arc::clone(&store), rate_source),
            store,
            source: None,
            events: EventDispatcher::new(),
            clock: Arc::new(SystemClock),
            offset: Utc.fix(),
            display_offset: Utc.fix(),
        }
    }

    pub fn with_schedule_source(mut self, source: Arc<dyn ScheduleSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// `offset` drives the night-hour window; `display_offset` classifies shift types.
    pub fn with_offsets(mut self, offset: FixedOffset, display_offset: FixedOffset) -> Self {
        self.offset = offset;
        self.display_offset = display_offset;
        self
    }

    pub fn events(&self) -> &EventDispatcher<DashboardEvent> {
        &self.events
    }

    /// Replace the cached schedule from a raw payload.
    pub async fn ingest(&self, payload: &serde_json::Value) -> Result<usize, ScheduleError> {
        match self.cache.refresh(payload, self.clock.now()).await {
            Ok(kept) => {
                self.events.emit(&DashboardEvent::ScheduleUpdated { kept });
                Ok(kept)
            }
            Err(e) => {
                if let ScheduleError::Format(message) = &e {
                    tracing::warn!(error = %message, "schedule payload rejected");
                    self.events.emit(&DashboardEvent::FormatError {
                        message: message.clone(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Pull the schedule from the configured source and ingest it.
    pub async fn fetch_schedule(&self) -> Result<usize, DashboardError> {
        let source = self.source.as_ref().ok_or(DashboardError::NoSource)?;
        let payload = source.fetch().await?;
        Ok(self.ingest(&payload).await?)
    }

    pub async fn clear_schedule(&self) -> Result<(), ScheduleError> {
        self.cache.clear().await
    }

    pub async fn snapshot(&self) -> Option<ScheduleSnapshot> {
        self.cache.get().await
    }

    pub async fn people(&self) -> Vec<String> {
        self.cache.people().await
    }

    pub async fn rate_settings(&self) -> RateSettings {
        load_or_default(self.store.as_ref(), RATE_SETTINGS_KEY).await
    }

    pub async fn update_rate_settings(&self, settings: RateSettings) -> Result<RateSettings, DashboardError> {
        save(self.store.as_ref(), RATE_SETTINGS_KEY, &settings).await?;
        Ok(settings)
    }

    pub async fn status(&self, person: &str) -> ShiftStatus {
        shift_status(self.snapshot().await.as_ref(), person, self.clock.now())
    }

    /// Hours and pay for `person` over the cached window. The exchange rate is only
    /// looked up when an hourly rate is set.
    pub async fn salary(&self, person: &str) -> SalaryView {
        let shifts = self.snapshot().await.map(|s| s.shifts).unwrap_or_default();
        let rates = self.rate_settings().await;
        let report = salary_for(&shifts, person, &rates, self.offset);
        let exchange_rate = if rates.hourly_rate > 0.0 {
            self.rates.current(self.clock.now()).await
        } else {
            0.0
        };
        SalaryView {
            converted_pay: report.converted(exchange_rate),
            report,
            exchange_rate,
        }
    }

    /// Calendar for `year-month`, defaulting to the current month.
    pub async fn calendar(
        &self,
        year_month: Option<(i32, u32)>,
        highlight: Option<&str>,
    ) -> Option<MonthCalendar> {
        let snapshot = self.snapshot().await?;
        let (year, month) = year_month.unwrap_or(navigable_months(self.clock.now())[0]);
        month_calendar(&snapshot, year, month, highlight, self.display_offset)
    }

    pub fn navigable_months(&self) -> [(i32, u32); 2] {
        navigable_months(self.clock.now())
    }

    pub async fn cem_today(&self) -> Vec<String> {
        match self.snapshot().await {
            Some(snapshot) => cem_today(&snapshot, self.clock.now()),
            None => Vec::new(),
        }
    }

    pub async fn export_ics(&self, mode: IcsMode, person: Option<&str>) -> Result<IcsExport, ScheduleError> {
        let snapshot = self.snapshot().await.ok_or(ScheduleError::Empty)?;
        export_ics(
            &snapshot.shifts,
            mode,
            person,
            self.clock.now(),
            self.display_offset,
        )
    }
}
