use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tally_types::{load, save, KvStore};

/// Suppresses logging of a page reloaded shortly after its previous visit.
///
/// Visit times live in a per-session store under `lastVisit_<path>`. The time is
/// refreshed on every call, so a burst of reloads stays suppressed.
pub struct RevisitGuard {
    session: Arc<dyn KvStore>,
    window: Duration,
}

impl RevisitGuard {
    pub fn new(session: Arc<dyn KvStore>, window_ms: u64) -> Self {
        Self {
            session,
            window: Duration::milliseconds(window_ms as i64),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn should_log(&self, path: &str, now: DateTime<Utc>) -> bool {
        let key = format!("lastVisit_{path}");
        let previous = match load::<i64>(self.session.as_ref(), &key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "ignoring unreadable visit time");
                None
            }
        };
        let now_ms = now.timestamp_millis();
        if let Err(e) = save(self.session.as_ref(), &key, &now_ms).await {
            tracing::warn!(key = %key, error = %e, "could not record visit time");
        }
        match previous {
            Some(prev) => now_ms - prev >= self.window.num_milliseconds(),
            None => true,
        }
    }
}
