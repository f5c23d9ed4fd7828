use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Recoverable storage failures. Lifecycle misuse is not represented here,
/// it panics.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to open connection to {path:?}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Query {name} failed: {source}")]
    Query {
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Row callback of query {name} failed: {source}")]
    Row {
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to close connection: {0}")]
    Close(#[source] rusqlite::Error),

    #[error("Migration to schema version {version} failed: {source:#}")]
    Migration {
        version: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Database {path:?} has unknown schema version {found}")]
    UnknownVersion { path: PathBuf, found: i64 },

    #[error("Schema validation failed: {0:#}")]
    SchemaValidation(#[source] anyhow::Error),
}

/// Merges the outcome of an operation with the outcome of releasing the
/// connection it used.
///
/// The operation's own error always wins. A close failure is only surfaced
/// when the operation itself succeeded.
pub(crate) fn compose_close<T>(
    outcome: Result<T, DatabaseError>,
    closed: Result<(), DatabaseError>,
) -> Result<T, DatabaseError> {
    match (outcome, closed) {
        (Err(primary), Err(close_err)) => {
            warn!("Connection close failed after an earlier error: {}", close_err);
            Err(primary)
        }
        (Ok(_), Err(close_err)) => Err(close_err),
        (outcome, Ok(())) => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_error() -> DatabaseError {
        DatabaseError::Query {
            name: "SelectThings",
            source: rusqlite::Error::InvalidQuery,
        }
    }

    fn close_error() -> DatabaseError {
        DatabaseError::Close(rusqlite::Error::ExecuteReturnedResults)
    }

    #[test]
    fn test_query_failure_is_not_masked_by_close_failure() {
        let result: Result<(), _> = compose_close(Err(query_error()), Err(close_error()));
        match result {
            Err(DatabaseError::Query { name, .. }) => assert_eq!(name, "SelectThings"),
            other => panic!("expected query error, got {:?}", other),
        }
    }

    #[test]
    fn test_close_failure_surfaces_when_query_succeeds() {
        let result = compose_close(Ok(42), Err(close_error()));
        assert!(matches!(result, Err(DatabaseError::Close(_))));
    }

    #[test]
    fn test_query_failure_surfaces_when_close_succeeds() {
        let result: Result<(), _> = compose_close(Err(query_error()), Ok(()));
        assert!(matches!(result, Err(DatabaseError::Query { .. })));
    }

    #[test]
    fn test_success_passes_value_through() {
        assert_eq!(compose_close(Ok("rows"), Ok(())).unwrap(), "rows");
    }
}
