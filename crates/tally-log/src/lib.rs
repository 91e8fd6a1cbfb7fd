//! Visit log: append under an advisory lock, archive the oldest half when the
//! live collection nears capacity, and encode entries as CSV.

mod csv;
mod revisit;
mod sink;
mod store;

pub use csv::{entries_from_csv, entries_to_csv, escape_field, parse_csv, CsvError, FIXED_COLUMNS};
pub use revisit::RevisitGuard;
pub use sink::{ArchiveBlob, DirectoryArchiveSink, MemoryArchiveSink};
pub use store::{should_archive, AppendOutcome, ArchiveReport, EventLogStore, LogError, ARCHIVE_THRESHOLD};
