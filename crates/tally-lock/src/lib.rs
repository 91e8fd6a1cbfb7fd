//! Advisory lock over a named slot in a shared key-value store.
//!
//! Used to serialize read-modify-write cycles on shared persisted data when several
//! independent contexts (tabs, processes) share one storage origin. Best effort: it
//! narrows the race window, it does not close it.

mod lock;

pub use lock::{LockError, LockOptions, StorageLock};
