//! Storage-backed advisory lock with stale-holder reclaim.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tally_types::{load, save, Clock, KvStore, StoreError, SystemClock};
use tokio::time::{sleep, Instant};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not acquire lock {key} within {waited_ms}ms")]
    Timeout { key: String, waited_ms: u64 },
}

/// Timing knobs for [`StorageLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// How long `with_lock` waits before giving up.
    pub timeout: Duration,
    /// Pause between claiming the slot and re-reading it to confirm ownership.
    pub confirm_delay: Duration,
    /// Pause between attempts.
    pub poll_interval: Duration,
    /// A slot older than this is considered abandoned and may be reclaimed.
    pub stale_after: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2_000),
            confirm_delay: Duration::from_millis(50),
            poll_interval: Duration::from_millis(100),
            stale_after: Duration::from_millis(5_000),
        }
    }
}

/// Contents of a held lock slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockSlot {
    token: String,
    acquired_at_ms: i64,
}

/// Advisory lock over `key` in a shared (usually ephemeral) store.
///
/// Ownership is claimed by writing a unique token and confirmed by reading it back
/// after a short delay. Correctness relies on every participant using the same key
/// and honoring the protocol.
pub struct StorageLock {
    store: Arc<dyn KvStore>,
    key: String,
    clock: Arc<dyn Clock>,
    options: LockOptions,
}

impl StorageLock {
    pub fn new(store: Arc<dyn KvStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            clock: Arc::new(SystemClock),
            options: LockOptions::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, options: LockOptions) -> Self {
        self.options = options;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> LockOptions {
        self.options
    }

    /// Try to claim the slot until `timeout` elapses. Never errors; storage failures
    /// count as a failed attempt.
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();
        while started.elapsed() < timeout {
            match self.try_claim(&token).await {
                Ok(true) => {
                    tracing::debug!(key = %self.key, "lock acquired");
                    return true;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(key = %self.key, error = %e, "lock attempt failed"),
            }
            sleep(self.options.poll_interval).await;
        }
        false
    }

    /// Clear the slot unconditionally.
    pub async fn release(&self) {
        if let Err(e) = self.store.remove(&self.key).await {
            tracing::warn!(key = %self.key, error = %e, "failed to release lock");
        }
    }

    /// Run `f` while holding the lock, releasing it afterwards whatever `f` returns.
    pub async fn with_lock<F, Fut, T>(&self, f: F) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let timeout = self.options.timeout;
        if !self.acquire(timeout).await {
            return Err(LockError::Timeout {
                key: self.key.clone(),
                waited_ms: timeout.as_millis() as u64,
            });
        }
        let out = f().await;
        self.release().await;
        Ok(out)
    }

    async fn try_claim(&self, token: &str) -> Result<bool, StoreError> {
        if !self.slot_is_free().await? {
            return Ok(false);
        }
        let slot = LockSlot {
            token: token.to_string(),
            acquired_at_ms: self.clock.now().timestamp_millis(),
        };
        save(self.store.as_ref(), &self.key, &slot).await?;
        sleep(self.options.confirm_delay).await;
        let current = load::<LockSlot>(self.store.as_ref(), &self.key).await?;
        Ok(current.is_some_and(|s| s.token == token))
    }

    async fn slot_is_free(&self) -> Result<bool, StoreError> {
        match load::<LockSlot>(self.store.as_ref(), &self.key).await {
            Ok(None) => Ok(true),
            Ok(Some(slot)) => {
                let age_ms = self.clock.now().timestamp_millis() - slot.acquired_at_ms;
                Ok(age_ms > self.options.stale_after.as_millis() as i64)
            }
            // An unreadable slot cannot be honored by anyone; treat it as free.
            Err(StoreError::Parse { .. }) => Ok(true),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tally_store::InMemoryKvStore;

    fn lock_on(store: &InMemoryKvStore) -> StorageLock {
        StorageLock::new(Arc::new(store.clone()), "logger_lock")
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_and_release_free_slot() {
        let store = InMemoryKvStore::new();
        let lock = lock_on(&store);

        assert!(lock.acquire(Duration::from_millis(2_000)).await);
        let slot = store.get("logger_lock").await.unwrap().unwrap();
        assert!(slot.get("token").is_some());

        lock.release().await;
        assert_eq!(store.get("logger_lock").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn held_slot_times_out() {
        let store = InMemoryKvStore::new();
        let holder = lock_on(&store);
        let contender = lock_on(&store);

        assert!(holder.acquire(Duration::from_millis(2_000)).await);
        let started = Instant::now();
        assert!(!contender.acquire(Duration::from_millis(300)).await);
        assert!(started.elapsed() >= Duration::from_millis(300));

        let err = contender.with_lock(|| async { 1 }).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_slot_is_reclaimed() {
        let store = InMemoryKvStore::new();
        let old = chrono::Utc::now().timestamp_millis() - 6_000;
        store
            .set(
                "logger_lock",
                json!({"token": "crashed-holder", "acquiredAtMs": old}),
            )
            .await
            .unwrap();

        let lock = lock_on(&store);
        assert!(lock.acquire(Duration::from_millis(500)).await);
        let slot = store.get("logger_lock").await.unwrap().unwrap();
        assert_ne!(slot["token"], "crashed-holder");
    }

    #[tokio::test(start_paused = true)]
    async fn recent_slot_is_not_reclaimed() {
        let store = InMemoryKvStore::new();
        let recent = chrono::Utc::now().timestamp_millis() - 4_000;
        store
            .set(
                "logger_lock",
                json!({"token": "live-holder", "acquiredAtMs": recent}),
            )
            .await
            .unwrap();

        let lock = lock_on(&store);
        assert!(!lock.acquire(Duration::from_millis(500)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_slot_is_claimable() {
        let store = InMemoryKvStore::new();
        store.set("logger_lock", json!("1712345678.42")).await.unwrap();
        let lock = lock_on(&store);
        assert!(lock.acquire(Duration::from_millis(500)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn with_lock_releases_on_error_path() {
        let store = InMemoryKvStore::new();
        let lock = lock_on(&store);

        let out: Result<Result<(), &str>, LockError> =
            lock.with_lock(|| async { Err("write failed") }).await;
        assert_eq!(out.unwrap(), Err("write failed"));
        assert_eq!(store.get("logger_lock").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn contenders_are_serialized() {
        let store = InMemoryKvStore::new();
        let counter_store = InMemoryKvStore::new();
        let entered = Arc::new(AtomicUsize::new(0));

        let run = |store: InMemoryKvStore, counters: InMemoryKvStore, entered: Arc<AtomicUsize>| async move {
            let lock = lock_on(&store);
            lock.with_lock(|| async {
                assert_eq!(entered.fetch_add(1, Ordering::SeqCst), 0, "two holders at once");
                let n = counters
                    .get("n")
                    .await
                    .unwrap()
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                sleep(Duration::from_millis(30)).await;
                counters.set("n", json!(n + 1)).await.unwrap();
                entered.fetch_sub(1, Ordering::SeqCst);
            })
            .await
        };

        let a = tokio::spawn(run(store.clone(), counter_store.clone(), Arc::clone(&entered)));
        let b = tokio::spawn(run(store.clone(), counter_store.clone(), Arc::clone(&entered)));
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(counter_store.get("n").await.unwrap(), Some(json!(2)));
        assert_eq!(store.get("logger_lock").await.unwrap(), None);
    }
}
