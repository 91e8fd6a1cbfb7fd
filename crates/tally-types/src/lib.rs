//! Core types and traits for the tally visit log and shift dashboard.
//!
//! Everything that crosses a crate boundary lives here: the persisted data model,
//! the storage/sink/source abstractions, and the error enums they return.

mod entry;
mod schedule;
mod settings;
mod traits;

pub use entry::*;
pub use schedule::*;
pub use settings::*;
pub use traits::*;
