//! External data sources (schedule feed, exchange rate) and the cached rate.

mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod rate;

pub use http::{HttpScheduleSource, NbuRateSource, DEFAULT_RATE_URL};
pub use rate::{ExchangeRateCache, RATE_MAX_AGE_MS};
pub use tally_types::{RateSource, ScheduleSource, SourceError};

#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockRateSource, MockScheduleSource};
