//! Scripted sources for tests: no network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tally_types::{RateSource, ScheduleSource, SourceError};
use tokio::sync::Mutex;

/// Returns a fixed payload, or a fixed error.
pub struct MockScheduleSource {
    payload: Result<serde_json::Value, String>,
}

impl MockScheduleSource {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload: Ok(payload),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            payload: Err(message.into()),
        }
    }
}

#[async_trait::async_trait]
impl ScheduleSource for MockScheduleSource {
    async fn fetch(&self) -> Result<serde_json::Value, SourceError> {
        self.payload.clone().map_err(SourceError::Http)
    }
}

/// Replays queued responses in order; fails once the queue is empty.
#[derive(Default)]
pub struct MockRateSource {
    responses: Mutex<VecDeque<Result<f64, String>>>,
    calls: AtomicUsize,
}

impl MockRateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_rate(&self, rate: f64) {
        self.responses.lock().await.push_back(Ok(rate));
    }

    pub async fn push_error(&self, message: impl Into<String>) {
        self.responses.lock().await.push_back(Err(message.into()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RateSource for MockRateSource {
    async fn fetch_rate(&self) -> Result<f64, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().await.pop_front() {
            Some(Ok(rate)) => Ok(rate),
            Some(Err(message)) => Err(SourceError::Http(message)),
            None => Err(SourceError::Http("no scripted response".to_string())),
        }
    }
}
