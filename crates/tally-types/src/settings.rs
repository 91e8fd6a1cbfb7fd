//! Persisted user settings and store keys.

use serde::{Deserialize, Serialize};

/// Store key of the live visit log collection.
pub const LOGS_KEY: &str = "GLOBAL_ORDER_LOGGER_LOGS_V1";
/// Store key of [`LoggerSettings`].
pub const LOGGER_SETTINGS_KEY: &str = "GLOBAL_ORDER_LOGGER_SETTINGS_V1";
/// Store key of the cached [`crate::ScheduleSnapshot`].
pub const SCHEDULE_CACHE_KEY: &str = "filteredShiftsData_v3";
/// Store key of [`RateSettings`].
pub const RATE_SETTINGS_KEY: &str = "scsd_settings_v6";
/// Store key of the cached exchange rate.
pub const EXCHANGE_RATE_KEY: &str = "usdToUahRate";
/// Ephemeral-store key of the log lock slot.
pub const LOG_LOCK_KEY: &str = "logger_lock";

/// Visit logger settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggerSettings {
    /// Soft capacity of the live log.
    pub log_limit: usize,
    /// Suppress repeat visits of the same path within `revisit_window_ms`.
    pub no_log_on_refresh: bool,
    pub revisit_window_ms: u64,
    /// Emit notifications for saves, archives and lock timeouts.
    pub notify: bool,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            log_limit: 10_000,
            no_log_on_refresh: true,
            revisit_window_ms: 5_000,
            notify: true,
        }
    }
}

/// Pay rates consumed read-only by the salary calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateSettings {
    /// Base hourly rate; pay is only computed when positive.
    #[serde(alias = "hourlyRateUSD")]
    pub hourly_rate: f64,
    #[serde(alias = "nightRateMultiplier")]
    pub night_multiplier: f64,
    #[serde(alias = "ocRateMultiplier")]
    pub oc_multiplier: f64,
    #[serde(alias = "asRateMultiplier")]
    pub as_multiplier: f64,
    #[serde(alias = "supRateMultiplier")]
    pub sup_multiplier: f64,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            hourly_rate: 0.0,
            night_multiplier: 1.0,
            oc_multiplier: 1.0,
            as_multiplier: 1.0,
            sup_multiplier: 1.0,
        }
    }
}

/// Last fetched currency conversion rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CachedRate {
    pub rate: f64,
    /// Unix milliseconds of the successful fetch; 0 when never fetched.
    #[serde(alias = "timestamp")]
    pub fetched_at_ms: i64,
}
