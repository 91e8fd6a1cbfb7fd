//! Axum server and routes.

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tally_app::{DashboardError, PageSnapshot, SalaryView, ShiftDashboard, VisitLogger, VisitOutcome};
use tally_log::{ArchiveReport, LogError};
use tally_schedule::{IcsMode, ScheduleError};
use tally_stats::{format_duration, DayGroup, LogSummary, MonthCalendar, ShiftStatus};
use tally_types::{LogEntry, LoggerSettings, RateSettings, ScheduleRecord, ScheduleSnapshot};
use tower_http::cors::CorsLayer;

pub struct AppState {
    pub logger: Arc<VisitLogger>,
    pub dashboard: Arc<ShiftDashboard>,
}

/// Response envelope shared by every JSON route.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

type ApiJson<T> = Json<ApiResponse<T>>;

fn success<T>(data: T) -> ApiJson<T> {
    Json(ApiResponse {
        code: 200,
        message: "Success".to_string(),
        data: Some(data),
    })
}

fn failure<T>(code: i32, message: impl Into<String>) -> ApiJson<T> {
    Json(ApiResponse {
        code,
        message: message.into(),
        data: None,
    })
}

fn attachment(content_type: &'static str, filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/visits",
            post(handle_record_visit)
                .get(handle_list_visits)
                .delete(handle_clear_visits),
        )
        .route("/visits/grouped", get(handle_grouped_visits))
        .route("/visits/stats", get(handle_visit_stats))
        .route("/visits/stats.csv", get(handle_visit_stats_csv))
        .route("/visits.csv", get(handle_export_visits))
        .route(
            "/settings/logger",
            get(handle_get_logger_settings).put(handle_put_logger_settings),
        )
        .route(
            "/settings/rates",
            get(handle_get_rate_settings).put(handle_put_rate_settings),
        )
        .route(
            "/shifts",
            post(handle_ingest_shifts)
                .get(handle_get_shifts)
                .delete(handle_clear_shifts),
        )
        .route("/shifts/fetch", post(handle_fetch_shifts))
        .route("/shifts/people", get(handle_people))
        .route("/shifts/cem", get(handle_cem_today))
        .route("/shifts/status", get(handle_status))
        .route("/shifts/salary", get(handle_salary))
        .route("/shifts/calendar", get(handle_calendar))
        .route("/shifts/export.ics", get(handle_export_ics))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct VisitResult {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<ArchiveReport>,
}

async fn handle_record_visit(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<PageSnapshot>,
) -> ApiJson<VisitResult> {
    match state.logger.record_visit(&snapshot).await {
        Ok(VisitOutcome::Logged(outcome)) => success(VisitResult {
            outcome: "logged",
            live_len: Some(outcome.live_len),
            archived: outcome.archived,
        }),
        Ok(VisitOutcome::Skipped) => Json(ApiResponse {
            code: 200,
            message: "Reload within revisit window, not logged".to_string(),
            data: Some(VisitResult {
                outcome: "skipped",
                live_len: None,
                archived: None,
            }),
        }),
        Ok(VisitOutcome::NotFound) => failure(404, "Not an order page"),
        Err(e @ LogError::LockTimeout(_)) => failure(503, e.to_string()),
        Err(e) => failure(500, e.to_string()),
    }
}

async fn handle_list_visits(State(state): State<Arc<AppState>>) -> ApiJson<Vec<LogEntry>> {
    success(state.logger.entries().await)
}

async fn handle_grouped_visits(State(state): State<Arc<AppState>>) -> ApiJson<Vec<DayGroup>> {
    success(state.logger.grouped().await)
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub confirm: bool,
}

async fn handle_clear_visits(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ConfirmQuery>,
) -> ApiJson<()> {
    if !q.confirm {
        return failure(400, "confirm=true is required to clear the log");
    }
    match state.logger.clear().await {
        Ok(()) => {
            tracing::info!("visit log cleared");
            Json(ApiResponse {
                code: 200,
                message: "Log cleared".to_string(),
                data: None,
            })
        }
        Err(e @ LogError::LockTimeout(_)) => failure(503, e.to_string()),
        Err(e) => failure(500, e.to_string()),
    }
}

async fn handle_visit_stats(State(state): State<Arc<AppState>>) -> ApiJson<LogSummary> {
    match state.logger.summary().await {
        Some(summary) => success(summary),
        None => failure(404, "No visits logged"),
    }
}

async fn handle_visit_stats_csv(State(state): State<Arc<AppState>>) -> Response {
    match state.logger.summary_csv().await {
        Some(csv) => attachment("text/csv; charset=utf-8", "order_statistics.csv", csv),
        None => failure::<()>(404, "No visits logged").into_response(),
    }
}

async fn handle_export_visits(State(state): State<Arc<AppState>>) -> Response {
    let (filename, csv) = state.logger.export_csv().await;
    attachment("text/csv; charset=utf-8", &filename, csv)
}

async fn handle_get_logger_settings(State(state): State<Arc<AppState>>) -> ApiJson<LoggerSettings> {
    success(state.logger.settings().await)
}

async fn handle_put_logger_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<LoggerSettings>,
) -> ApiJson<LoggerSettings> {
    if settings.log_limit == 0 {
        return failure(400, "logLimit must be at least 1");
    }
    match state.logger.update_settings(settings).await {
        Ok(saved) => success(saved),
        Err(e) => failure(500, e.to_string()),
    }
}

async fn handle_get_rate_settings(State(state): State<Arc<AppState>>) -> ApiJson<RateSettings> {
    success(state.dashboard.rate_settings().await)
}

async fn handle_put_rate_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<RateSettings>,
) -> ApiJson<RateSettings> {
    let values = [
        settings.hourly_rate,
        settings.night_multiplier,
        settings.oc_multiplier,
        settings.as_multiplier,
        settings.sup_multiplier,
    ];
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return failure(400, "rates must be non-negative numbers");
    }
    match state.dashboard.update_rate_settings(settings).await {
        Ok(saved) => success(saved),
        Err(e) => failure(500, e.to_string()),
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshResult {
    pub kept: usize,
}

fn schedule_failure<T>(e: ScheduleError) -> ApiJson<T> {
    match e {
        ScheduleError::Format(_) => failure(400, e.to_string()),
        ScheduleError::Empty => failure(404, e.to_string()),
        ScheduleError::Store(_) => failure(500, e.to_string()),
    }
}

async fn handle_ingest_shifts(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> ApiJson<RefreshResult> {
    match state.dashboard.ingest(&payload).await {
        Ok(kept) => {
            tracing::info!(kept, "schedule refreshed");
            success(RefreshResult { kept })
        }
        Err(e) => schedule_failure(e),
    }
}

async fn handle_fetch_shifts(State(state): State<Arc<AppState>>) -> ApiJson<RefreshResult> {
    match state.dashboard.fetch_schedule().await {
        Ok(kept) => {
            tracing::info!(kept, "schedule fetched");
            success(RefreshResult { kept })
        }
        Err(DashboardError::NoSource) => failure(503, DashboardError::NoSource.to_string()),
        Err(DashboardError::Source(e)) => failure(502, e.to_string()),
        Err(DashboardError::Schedule(e)) => schedule_failure(e),
        Err(e) => failure(500, e.to_string()),
    }
}

async fn handle_get_shifts(State(state): State<Arc<AppState>>) -> ApiJson<ScheduleSnapshot> {
    match state.dashboard.snapshot().await {
        Some(snapshot) => success(snapshot),
        None => failure(404, "No schedule data"),
    }
}

async fn handle_clear_shifts(State(state): State<Arc<AppState>>) -> ApiJson<()> {
    match state.dashboard.clear_schedule().await {
        Ok(()) => Json(ApiResponse {
            code: 200,
            message: "Schedule cleared".to_string(),
            data: None,
        }),
        Err(e) => schedule_failure(e),
    }
}

async fn handle_people(State(state): State<Arc<AppState>>) -> ApiJson<Vec<String>> {
    success(state.dashboard.people().await)
}

async fn handle_cem_today(State(state): State<Arc<AppState>>) -> ApiJson<Vec<String>> {
    success(state.dashboard.cem_today().await)
}

#[derive(Debug, Deserialize)]
pub struct PersonQuery {
    #[serde(default)]
    pub person: Option<String>,
}

impl PersonQuery {
    fn person(&self) -> Option<&str> {
        self.person.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

/// JSON form of [`ShiftStatus`] with a display countdown.
#[derive(Debug, Serialize)]
pub struct StatusView {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<ScheduleRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<i64>,
}

impl From<ShiftStatus> for StatusView {
    fn from(status: ShiftStatus) -> Self {
        let (state, shift, remaining) = match status {
            ShiftStatus::NoData => ("no_data", None, None),
            ShiftStatus::NoUpcoming => ("no_upcoming", None, None),
            ShiftStatus::OnShift { shift, ends_in } => ("on_shift", Some(shift), Some(ends_in)),
            ShiftStatus::Upcoming { shift, starts_in } => ("upcoming", Some(shift), Some(starts_in)),
        };
        Self {
            state,
            shift,
            remaining: remaining.map(format_duration),
            remaining_ms: remaining.map(|d| d.num_milliseconds()),
        }
    }
}

async fn handle_status(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PersonQuery>,
) -> ApiJson<StatusView> {
    let Some(person) = q.person() else {
        return failure(400, "person is required");
    };
    success(state.dashboard.status(person).await.into())
}

async fn handle_salary(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PersonQuery>,
) -> ApiJson<SalaryView> {
    let Some(person) = q.person() else {
        return failure(400, "person is required");
    };
    success(state.dashboard.salary(person).await)
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub person: Option<String>,
}

async fn handle_calendar(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CalendarQuery>,
) -> ApiJson<MonthCalendar> {
    let year_month = match (q.year, q.month) {
        (Some(year), Some(month)) => {
            if !state.dashboard.navigable_months().contains(&(year, month)) {
                return failure(400, "only the current and next month can be shown");
            }
            Some((year, month))
        }
        (None, None) => None,
        _ => return failure(400, "year and month must be given together"),
    };
    let highlight = q.person.as_deref().filter(|p| !p.is_empty());
    match state.dashboard.calendar(year_month, highlight).await {
        Some(calendar) => success(calendar),
        None => failure(404, "No schedule data"),
    }
}

#[derive(Debug, Deserialize)]
pub struct IcsQuery {
    #[serde(default)]
    pub mode: Option<IcsMode>,
    #[serde(default)]
    pub person: Option<String>,
}

async fn handle_export_ics(
    State(state): State<Arc<AppState>>,
    Query(q): Query<IcsQuery>,
) -> Response {
    let mode = q.mode.unwrap_or(IcsMode::All);
    let person = q.person.as_deref().filter(|p| !p.is_empty());
    match state.dashboard.export_ics(mode, person).await {
        Ok(export) => {
            tracing::info!(events = export.events, filename = %export.filename, "calendar exported");
            attachment("text/calendar; charset=utf-8", &export.filename, export.content)
        }
        Err(e) => schedule_failure::<()>(e).into_response(),
    }
}

async fn handle_health() -> &'static str {
    "ok"
}
