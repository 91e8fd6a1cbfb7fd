//! HTTP clients for the schedule feed and the NBU exchange-rate endpoint.

use serde::Deserialize;
use tally_types::{RateSource, ScheduleSource, SourceError};

/// National Bank of Ukraine USD rate, JSON form.
pub const DEFAULT_RATE_URL: &str =
    "https://bank.gov.ua/NBUStatService/v1/statdirectory/exchange?valcode=USD&json";

async fn get_text(
    client: &reqwest::Client,
    url: &str,
    token: Option<&str>,
) -> Result<String, SourceError> {
    let mut req = client.get(url);
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    let res = req
        .send()
        .await
        .map_err(|e| SourceError::Http(e.to_string()))?;
    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| SourceError::Http(e.to_string()))?;
    if !status.is_success() {
        return Err(SourceError::Http(format!("{url} returned {status}: {body}")));
    }
    Ok(body)
}

/// Fetches the raw schedule payload (`{ data: { shifts: [...] } }`) from a URL.
pub struct HttpScheduleSource {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpScheduleSource {
    pub fn new(url: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            token,
        }
    }

    /// `TALLY_SCHEDULE_URL` and optional `TALLY_SCHEDULE_TOKEN`; `None` without a URL.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("TALLY_SCHEDULE_URL").ok()?;
        let token = std::env::var("TALLY_SCHEDULE_TOKEN").ok();
        Some(Self::new(url, token))
    }
}

#[async_trait::async_trait]
impl ScheduleSource for HttpScheduleSource {
    async fn fetch(&self) -> Result<serde_json::Value, SourceError> {
        let body = get_text(&self.client, &self.url, self.token.as_deref()).await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Format(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct RateItem {
    rate: Option<f64>,
}

/// Pull the rate out of an NBU response body (`[{"rate": 41.2, ...}]`).
pub(crate) fn parse_nbu_rate(body: &str) -> Result<f64, SourceError> {
    let items: Vec<RateItem> =
        serde_json::from_str(body).map_err(|e| SourceError::Format(e.to_string()))?;
    items
        .into_iter()
        .next()
        .and_then(|i| i.rate)
        .filter(|r| *r > 0.0)
        .ok_or_else(|| SourceError::Format("response carries no positive rate".to_string()))
}

pub struct NbuRateSource {
    client: reqwest::Client,
    url: String,
}

impl NbuRateSource {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub fn from_env() -> Self {
        let url = std::env::var("TALLY_RATE_URL").unwrap_or_else(|_| DEFAULT_RATE_URL.to_string());
        Self::new(url)
    }
}

#[async_trait::async_trait]
impl RateSource for NbuRateSource {
    async fn fetch_rate(&self) -> Result<f64, SourceError> {
        let body = get_text(&self.client, &self.url, None).await?;
        parse_nbu_rate(&body)
    }
}
