//! Tape repository: typed reads and writes of tapes, their stations and their
//! resolved sources, built on [`Database::run_query`](crate::database::Database::run_query).

mod models;
mod store;

pub use models::{NewTape, NewTapeSource, SourceKind, Station, Tape, TapeSource, TapeStatus};
pub use store::TapeStore;
