//! Tally REST API server: visit log and shift dashboard.

use std::sync::Arc;
use tally_api::config::Config;
use tally_api::server::{self, AppState};
use tally_app::{ShiftDashboard, VisitLogger};
use tally_fetch::{HttpScheduleSource, NbuRateSource};
use tally_log::DirectoryArchiveSink;
use tally_store::{InMemoryKvStore, SqliteKvStore};
use tally_types::KvStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let durable: Arc<dyn KvStore> = match &config.db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "using SQLite store");
            Arc::new(SqliteKvStore::new(path)?)
        }
        None => {
            tracing::warn!("TALLY_DB_PATH not set; visit log is kept in memory only");
            Arc::new(InMemoryKvStore::new())
        }
    };
    // Lock slot and revisit times live for the process only.
    let session: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let sink = Arc::new(DirectoryArchiveSink::new(&config.archive_dir));

    let logger = VisitLogger::new(Arc::clone(&durable), session, sink).with_offset(config.utc_offset);
    let mut dashboard = ShiftDashboard::new(Arc::clone(&durable), Arc::new(NbuRateSource::from_env()))
        .with_offsets(config.utc_offset, config.display_offset);
    match HttpScheduleSource::from_env() {
        Some(source) => dashboard = dashboard.with_schedule_source(Arc::new(source)),
        None => tracing::info!("TALLY_SCHEDULE_URL not set; schedule only accepted via POST /shifts"),
    }

    let state = Arc::new(AppState {
        logger: Arc::new(logger),
        dashboard: Arc::new(dashboard),
    });
    let app = server::router(state);
    tracing::info!("Tally API listening on {}", config.listen);
    axum::serve(
        tokio::net::TcpListener::bind(config.listen).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}
