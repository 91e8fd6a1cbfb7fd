//! HTTP service over the visit logger and shift dashboard.

pub mod config;
pub mod server;
