//! Tapedeck: records radio shows as tapes.
//!
//! This library exposes the internal modules for the management binary and
//! for testing.

pub mod capture;
pub mod config;
pub mod database;
pub mod lazy_writer;
pub mod resolver;
pub mod sqlite_persistence;
pub mod tape;
pub mod user;

pub use capture::{CaptureRequest, Recorder};
pub use database::{Database, DatabaseError, DatabaseState, Query};
pub use resolver::{ContentResolver, HttpTransport, ReqwestTransport, ResolveError, Resolved};
pub use tape::TapeStore;
pub use user::UserStore;
