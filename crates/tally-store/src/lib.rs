//! Key-value store backends: in-memory and SQLite.

mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::InMemoryKvStore;
pub use tally_types::{KvStore, StoreError};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteKvStore;
