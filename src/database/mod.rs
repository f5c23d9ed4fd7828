//! Storage engine: owns the lifecycle of one SQLite file, runs named queries
//! on a fresh connection per call and applies schema migrations.

mod error;
mod query;
mod schema;

pub use error::DatabaseError;
pub use query::{Query, RowCallback};
pub use schema::TAPEDECK_VERSIONED_SCHEMAS;

use crate::sqlite_persistence::{VersionedSchema, BASE_DB_VERSION};
use error::compose_close;
use rusqlite::{
    types::{ToSql, Type},
    Connection, OpenFlags, Row,
};
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DATABASE_FILE_NAME: &str = "tapedeck.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    Uninitialized,
    Open,
    Closed,
}

impl fmt::Display for DatabaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseState::Uninitialized => "uninitialized",
            DatabaseState::Open => "open",
            DatabaseState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Exclusive owner of one backing database file.
///
/// Lifecycle is `uninitialized -> open -> closed`. Calling an operation from
/// the wrong state is a programming error and panics. No connection outlives
/// the call that acquired it.
pub struct Database {
    path: PathBuf,
    state: DatabaseState,
    schemas: &'static [VersionedSchema],
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "database {:?} {}", self.path, self.state)
    }
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_schemas(path, TAPEDECK_VERSIONED_SCHEMAS)
    }

    pub fn with_schemas<P: AsRef<Path>>(path: P, schemas: &'static [VersionedSchema]) -> Self {
        Database {
            path: path.as_ref().to_path_buf(),
            state: DatabaseState::Uninitialized,
            schemas,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> DatabaseState {
        self.state
    }

    fn expect_state(&self, expected: DatabaseState, operation: &str) {
        if self.state != expected {
            panic!("cannot {} {}: expected state {}", operation, self, expected);
        }
    }

    /// Moves the handle to `open`. A missing file is created when
    /// `create_if_missing` is set, otherwise it is a fatal fault.
    pub fn open(&mut self, create_if_missing: bool) {
        debug!("enter open {} create={}", self, create_if_missing);
        self.expect_state(DatabaseState::Uninitialized, "open");

        if !self.path.exists() {
            if !create_if_missing {
                panic!("database file not found: {:?}", self.path);
            }
            info!("Creating database file at {:?}", self.path);
            if let Err(err) = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                panic!("could not create database file at {:?}: {}", self.path, err);
            }
        }

        self.state = DatabaseState::Open;
        debug!("exit open {}", self);
    }

    /// Moves the handle to `closed`, optionally removing the backing file.
    /// A failed delete is a fatal fault.
    pub fn close(&mut self, delete_file: bool) {
        debug!("enter close {} delete={}", self, delete_file);
        self.expect_state(DatabaseState::Open, "close");

        if delete_file {
            if let Err(err) = std::fs::remove_file(&self.path) {
                panic!("could not delete database file {:?}: {}", self.path, err);
            }
            info!("Deleted database file {:?}", self.path);
        }

        self.state = DatabaseState::Closed;
        debug!("exit close {}", self);
    }

    /// Applies every schema version not yet recorded in the file, each in its
    /// own transaction, then validates the result against the latest version.
    /// Already applied versions are skipped, so repeated calls are no-ops.
    pub fn migrate(&self) -> Result<(), DatabaseError> {
        debug!("enter migrate {}", self);
        self.expect_state(DatabaseState::Open, "migrate");

        if self.schemas.iter().all(|schema| schema.migration.is_empty()) {
            panic!("missing schema data for {}", self);
        }

        let mut conn = self.connect(true)?;
        let outcome = self.migrate_with(&mut conn);
        let result = compose_close(outcome, release(conn));
        debug!("exit migrate {}", self);
        result
    }

    fn migrate_with(&self, conn: &mut Connection) -> Result<(), DatabaseError> {
        info!("Schema before migration:");
        schema_report(conn);

        let raw_version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|source| DatabaseError::Query {
                name: "ReadUserVersion",
                source,
            })?;

        let applied = match raw_version {
            0 => None,
            v if v >= BASE_DB_VERSION as i64 => Some((v as usize) - BASE_DB_VERSION),
            v => {
                return Err(DatabaseError::UnknownVersion {
                    path: self.path.clone(),
                    found: v,
                })
            }
        };

        // Non-empty, checked by the caller.
        let latest = &self.schemas[self.schemas.len() - 1];
        if let Some(version) = applied {
            if version > latest.version {
                return Err(DatabaseError::UnknownVersion {
                    path: self.path.clone(),
                    found: raw_version,
                });
            }
        }

        for schema in self
            .schemas
            .iter()
            .filter(|schema| applied.map_or(true, |version| schema.version > version))
        {
            info!("Applying schema version {}", schema.version);
            apply_version(conn, schema).map_err(|source| DatabaseError::Migration {
                version: schema.version,
                source,
            })?;
        }

        latest
            .validate(conn)
            .map_err(DatabaseError::SchemaValidation)?;

        info!("Schema after migration:");
        schema_report(conn);
        Ok(())
    }

    /// Runs one query on a connection acquired for this call only.
    ///
    /// If the statement or a row callback fails, that error is returned even
    /// when releasing the connection fails as well.
    pub fn run_query(&self, mut query: Query<'_>) -> Result<(), DatabaseError> {
        debug!("enter run_query {}", query.name);
        self.expect_state(DatabaseState::Open, "run query on");

        let conn = self.connect(query.performs_update)?;
        debug!("execute {} {:?}", query, query.named);
        let outcome = execute(&conn, &mut query);
        if let Err(err) = &outcome {
            warn!("Query {} failed: {}", query.name, err);
        }

        let result = compose_close(outcome, release(conn));
        debug!("exit run_query {}", query.name);
        result
    }

    fn connect(&self, performs_update: bool) -> Result<Connection, DatabaseError> {
        let mode = if performs_update {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        } else {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        };
        let conn = Connection::open_with_flags(
            &self.path,
            mode | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| DatabaseError::Connect {
            path: self.path.clone(),
            source,
        })?;

        if performs_update {
            conn.execute_batch("PRAGMA foreign_keys = ON;")
                .map_err(|source| DatabaseError::Connect {
                    path: self.path.clone(),
                    source,
                })?;
        }
        Ok(conn)
    }
}

/// Reads a text column holding one of a closed set of values.
pub fn text_enum_column<T>(
    row: &Row<'_>,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let value: String = row.get(column)?;
    parse(&value).ok_or_else(|| {
        let index = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Text,
            format!("unexpected {} value {:?}", column, value).into(),
        )
    })
}

fn release(conn: Connection) -> Result<(), DatabaseError> {
    conn.close()
        .map_err(|(_conn, source)| DatabaseError::Close(source))
}

fn execute(conn: &Connection, query: &mut Query<'_>) -> Result<(), DatabaseError> {
    let name = query.name;
    let query_err = |source| DatabaseError::Query { name, source };

    let mut stmt = conn.prepare(&query.sql).map_err(query_err)?;
    let params: Vec<(&str, &dyn ToSql)> = query
        .named
        .iter()
        .map(|(key, value)| (*key, value as &dyn ToSql))
        .collect();

    let mut rows = stmt.query(params.as_slice()).map_err(query_err)?;
    while let Some(row) = rows.next().map_err(query_err)? {
        if let Some(on_row) = query.on_row.as_mut() {
            on_row(row).map_err(|source| DatabaseError::Row { name, source })?;
        }
    }
    Ok(())
}

fn apply_version(conn: &mut Connection, schema: &VersionedSchema) -> anyhow::Result<()> {
    let tx = conn.transaction()?;
    schema.apply(&tx)?;
    tx.pragma_update(None, "user_version", schema.user_version() as i64)?;
    tx.commit()?;
    Ok(())
}

/// Logs every table and index in the file. Failures are logged, not returned.
fn schema_report(conn: &Connection) {
    let result = conn
        .prepare("SELECT type, name FROM sqlite_schema ORDER BY 1, 2;")
        .and_then(|mut stmt| {
            let objects = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>();
            objects
        });

    match result {
        Ok(objects) => {
            for (kind, name) in objects {
                info!("  {:<5} {}", kind, name);
            }
        }
        Err(err) => warn!("sqlite_schema query failed: {}", err),
    }
}
