use chrono::{DateTime, Utc};
use std::sync::Arc;
use tally_types::{load_or_default, save, CachedRate, KvStore, RateSource, EXCHANGE_RATE_KEY};

/// A cached rate younger than this (milliseconds) is used without fetching.
pub const RATE_MAX_AGE_MS: i64 = 6 * 60 * 60 * 1000;

/// Exchange rate with a persisted six-hour cache.
pub struct ExchangeRateCache {
    store: Arc<dyn KvStore>,
    source: Arc<dyn RateSource>,
    key: String,
}

impl ExchangeRateCache {
    pub fn new(store: Arc<dyn KvStore>, source: Arc<dyn RateSource>) -> Self {
        Self {
            store,
            source,
            key: EXCHANGE_RATE_KEY.to_string(),
        }
    }

    pub async fn cached(&self) -> CachedRate {
        load_or_default(self.store.as_ref(), &self.key).await
    }

    /// Fresh cached rate if there is one, else a fetched rate. A failed fetch falls
    /// back to the stale cached rate (0 if none was ever fetched).
    pub async fn current(&self, now: DateTime<Utc>) -> f64 {
        let cached = self.cached().await;
        let age_ms = now.timestamp_millis() - cached.fetched_at_ms;
        if cached.rate > 0.0 && age_ms < RATE_MAX_AGE_MS {
            return cached.rate;
        }
        match self.source.fetch_rate().await {
            Ok(rate) => {
                let fresh = CachedRate {
                    rate,
                    fetched_at_ms: now.timestamp_millis(),
                };
                if let Err(e) = save(self.store.as_ref(), &self.key, &fresh).await {
                    tracing::warn!(error = %e, "could not persist exchange rate");
                }
                tracing::debug!(rate, "exchange rate refreshed");
                rate
            }
            Err(e) => {
                tracing::warn!(error = %e, stale = cached.rate, "exchange rate fetch failed");
                cached.rate
            }
        }
    }
}
