//! Service configuration from environment variables.

use chrono::FixedOffset;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}={value}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    /// SQLite file for the durable store; in-memory when unset.
    pub db_path: Option<PathBuf>,
    pub archive_dir: PathBuf,
    /// Local offset for visit dates and the night-hour window.
    pub utc_offset: FixedOffset,
    /// Offset used to classify shift types and format calendar times.
    pub display_offset: FixedOffset,
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn offset_minutes(var: &'static str, raw: Option<String>, default: i32) -> Result<FixedOffset, ConfigError> {
    let minutes = match raw {
        Some(raw) => raw.trim().parse::<i32>().map_err(|e| invalid(var, &raw, e))?,
        None => default,
    };
    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| invalid(var, &minutes.to_string(), "offset out of range"))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_raw = lookup("TALLY_LISTEN").unwrap_or_else(|| "0.0.0.0:8002".to_string());
        let listen = listen_raw
            .parse()
            .map_err(|e| invalid("TALLY_LISTEN", &listen_raw, e))?;
        Ok(Self {
            listen,
            db_path: lookup("TALLY_DB_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            archive_dir: lookup("TALLY_ARCHIVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./archives")),
            utc_offset: offset_minutes("TALLY_UTC_OFFSET_MINUTES", lookup("TALLY_UTC_OFFSET_MINUTES"), 0)?,
            display_offset: offset_minutes(
                "TALLY_DISPLAY_OFFSET_MINUTES",
                lookup("TALLY_DISPLAY_OFFSET_MINUTES"),
                120,
            )?,
        })
    }
}
