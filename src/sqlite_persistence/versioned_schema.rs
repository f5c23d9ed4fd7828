use anyhow::{bail, Context, Result};
use rusqlite::{params, types::Type, Connection};

/// Offset added to a schema version before it is stored in `PRAGMA user_version`,
/// so that a file created by some other tool (user_version 0) is never mistaken
/// for one of ours.
pub const BASE_DB_VERSION: usize = 99999;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Only mutated when optional field assignments are passed.
            #[allow(unused_mut)]
            let mut column = $crate::sqlite_persistence::Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn parse(s: &str) -> Option<&'static SqlType> {
        match s {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            "REAL" => Some(&SqlType::Real),
            "BLOB" => Some(&SqlType::Blob),
            _ => None,
        }
    }
}

#[allow(unused)]
pub enum ForeignKeyOnChange {
    NoAction,
    Restrict,
    SetNull,
    SetDefault,
    Cascade,
}

impl ForeignKeyOnChange {
    fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyOnChange::NoAction => "NO ACTION",
            ForeignKeyOnChange::Restrict => "RESTRICT",
            ForeignKeyOnChange::SetNull => "SET NULL",
            ForeignKeyOnChange::SetDefault => "SET DEFAULT",
            ForeignKeyOnChange::Cascade => "CASCADE",
        }
    }
}

pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: ForeignKeyOnChange,
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<S>,
    pub foreign_key: Option<&'a ForeignKey>,
}

/// Declared shape of a table at a given schema version. Used to check that the
/// migration statements really produced what the code expects to read.
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [&'static str],
    pub unique_constraints: &'static [&'static [&'static str]],
}

/// One step of schema evolution.
///
/// `migration` holds the discrete statements that bring a store from the
/// previous version to this one, in order. `tables` describes every table as it
/// looks once this version is applied.
pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: &'static [&'static str],
}

fn strip_leading_and_trailing_parentheses<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();
    if s.starts_with('(') && s.ends_with(')') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

impl VersionedSchema {
    /// Value stored in `PRAGMA user_version` once this version is applied.
    pub fn user_version(&self) -> usize {
        BASE_DB_VERSION + self.version
    }

    /// Runs this version's statements in order. Does not touch `user_version`,
    /// the caller decides how the step is committed.
    pub fn apply(&self, conn: &Connection) -> Result<()> {
        for (index, statement) in self.migration.iter().enumerate() {
            conn.execute(statement, params![]).with_context(|| {
                format!(
                    "Migration statement {} of version {} failed: {}",
                    index, self.version, statement
                )
            })?;
        }
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            validate_columns(conn, table)?;
            validate_indices(conn, table)?;
            validate_unique_constraints(conn, table)?;
            validate_foreign_keys(conn, table)?;
        }
        Ok(())
    }
}

fn validate_columns(conn: &Connection, table: &Table) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table.name))?;
    let actual_columns: Vec<Column<'_, String>> = stmt
        .query_map(params![], |row| {
            let sql_type = SqlType::parse(row.get::<_, String>(2)?.as_str()).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(2, "type".to_string(), Type::Text)
            })?;
            Ok(Column {
                name: row.get::<_, String>(1)?,
                sql_type,
                non_null: row.get::<_, i32>(3)? == 1,
                default_value: row.get::<_, Option<String>>(4)?,
                is_primary_key: row.get::<_, i32>(5)? > 0,
                foreign_key: None,
            })
        })?
        .collect::<rusqlite::Result<_>>()
        .with_context(|| format!("Failed to read columns of table {}", table.name))?;

    if actual_columns.is_empty() {
        bail!("Table {} does not exist", table.name);
    }

    if actual_columns.len() != table.columns.len() {
        bail!(
            "Table {} has {} columns, expected {}. Found column names: {}, expected: {}",
            table.name,
            actual_columns.len(),
            table.columns.len(),
            actual_columns
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            table
                .columns
                .iter()
                .map(|c| c.name)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    for (actual, expected) in actual_columns.iter().zip(table.columns.iter()) {
        if actual.name != expected.name {
            bail!(
                "Table {} Column name mismatch: expected {}, got {}",
                table.name,
                expected.name,
                actual.name
            );
        }
        if actual.sql_type != expected.sql_type {
            bail!(
                "Table {} Column {} type mismatch: expected {:?}, got {:?}",
                table.name,
                expected.name,
                expected.sql_type,
                actual.sql_type
            );
        }
        if actual.non_null != expected.non_null {
            bail!(
                "Table {} Column {} non-null mismatch: expected {}, got {}",
                table.name,
                expected.name,
                expected.non_null,
                actual.non_null
            );
        }
        // Default values might be wrapped in parentheses.
        if actual
            .default_value
            .as_ref()
            .map(strip_leading_and_trailing_parentheses)
            != expected
                .default_value
                .map(strip_leading_and_trailing_parentheses)
        {
            bail!(
                "Table {} Column {} default value mismatch: expected {:?}, got {:?}",
                table.name,
                expected.name,
                expected.default_value,
                actual.default_value
            );
        }
        if actual.is_primary_key != expected.is_primary_key {
            bail!(
                "Table {} Column {} primary key mismatch: expected {}, got {}",
                table.name,
                expected.name,
                expected.is_primary_key,
                actual.is_primary_key
            );
        }
    }
    Ok(())
}

fn validate_indices(conn: &Connection, table: &Table) -> Result<()> {
    for index_name in table.indices {
        let index_exists: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                params![index_name, table.name],
                |_| Ok(true),
            )
            .unwrap_or(false);

        if !index_exists {
            bail!("Table {} is missing index '{}'", table.name, index_name);
        }
    }
    Ok(())
}

fn validate_unique_constraints(conn: &Connection, table: &Table) -> Result<()> {
    if table.unique_constraints.is_empty() {
        return Ok(());
    }

    // SQLite keeps unique constraints as indices flagged unique in PRAGMA index_list.
    let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", table.name))?;
    let unique_indices: Vec<String> = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i32>(2)?)))?
        .filter_map(|r| r.ok())
        .filter(|(_, is_unique)| *is_unique == 1)
        .map(|(name, _)| name)
        .collect();

    let mut unique_index_columns: Vec<Vec<String>> = Vec::new();
    for index_name in &unique_indices {
        let mut idx_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
        let mut cols: Vec<String> = idx_stmt
            .query_map([], |row| row.get::<_, String>(2))?
            .filter_map(|r| r.ok())
            .collect();
        cols.sort();
        unique_index_columns.push(cols);
    }

    for expected_columns in table.unique_constraints {
        let mut expected_sorted: Vec<&str> = expected_columns.to_vec();
        expected_sorted.sort();

        let found = unique_index_columns.iter().any(|actual| {
            actual.iter().map(String::as_str).collect::<Vec<_>>() == expected_sorted
        });
        if !found {
            bail!(
                "Table {} is missing unique constraint on columns ({})",
                table.name,
                expected_columns.join(", ")
            );
        }
    }
    Ok(())
}

fn validate_foreign_keys(conn: &Connection, table: &Table) -> Result<()> {
    // PRAGMA foreign_key_list returns: id, seq, table, from, to, on_update, on_delete, match
    let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", table.name))?;
    let actual_fks: Vec<(String, String, String, String)> = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(3)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .filter_map(|r| r.ok())
        .collect();

    for column in table.columns {
        let Some(expected_fk) = column.foreign_key else {
            continue;
        };
        let expected_on_delete = expected_fk.on_delete.as_sql();
        let found = actual_fks.iter().any(|(from, to_table, to_column, on_delete)| {
            from == column.name
                && to_table == expected_fk.foreign_table
                && to_column == expected_fk.foreign_column
                && on_delete == expected_on_delete
        });
        if !found {
            bail!(
                "Table {} column {} is missing foreign key: expected REFERENCES {}({}) ON DELETE {}",
                table.name,
                column.name,
                expected_fk.foreign_table,
                expected_fk.foreign_column,
                expected_on_delete
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENT_FK: ForeignKey = ForeignKey {
        foreign_table: "parent",
        foreign_column: "id",
        on_delete: ForeignKeyOnChange::Cascade,
    };

    const PARENT_TABLE: Table = Table {
        name: "parent",
        columns: &[
            sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("name", &SqlType::Text, non_null = true),
        ],
        indices: &["idx_parent_name"],
        unique_constraints: &[],
    };

    const CHILD_TABLE: Table = Table {
        name: "child",
        columns: &[
            sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
            sqlite_column!(
                "parent_id",
                &SqlType::Integer,
                non_null = true,
                foreign_key = Some(&PARENT_FK)
            ),
            sqlite_column!("seq", &SqlType::Integer, non_null = true),
        ],
        indices: &[],
        unique_constraints: &[&["parent_id", "seq"]],
    };

    const SCHEMA: VersionedSchema = VersionedSchema {
        version: 1,
        tables: &[PARENT_TABLE, CHILD_TABLE],
        migration: &[
            "CREATE TABLE parent (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            "CREATE INDEX idx_parent_name ON parent(name)",
            "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL REFERENCES parent(id) ON DELETE CASCADE, seq INTEGER NOT NULL, UNIQUE (seq, parent_id))",
        ],
    };

    #[test]
    fn test_apply_then_validate() {
        let conn = Connection::open_in_memory().unwrap();
        SCHEMA.apply(&conn).unwrap();
        SCHEMA.validate(&conn).unwrap();
    }

    #[test]
    fn test_user_version_is_offset() {
        assert_eq!(SCHEMA.user_version(), BASE_DB_VERSION + 1);
    }

    #[test]
    fn test_apply_reports_failing_statement() {
        let conn = Connection::open_in_memory().unwrap();
        SCHEMA.apply(&conn).unwrap();

        // Tables exist already, the first CREATE fails.
        let err_msg = SCHEMA.apply(&conn).unwrap_err().to_string();
        assert!(err_msg.contains("statement 0 of version 1"));
    }

    #[test]
    fn test_validate_detects_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        let err_msg = SCHEMA.validate(&conn).unwrap_err().to_string();
        assert!(err_msg.contains("parent does not exist"));
    }

    #[test]
    fn test_validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            [],
        )
        .unwrap();

        let schema = VersionedSchema {
            version: 1,
            tables: &[PARENT_TABLE],
            migration: &[],
        };
        let err_msg = schema.validate(&conn).unwrap_err().to_string();
        assert!(err_msg.contains("missing index"));
        assert!(err_msg.contains("idx_parent_name"));
    }

    #[test]
    fn test_validate_detects_column_drift() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE parent (id INTEGER PRIMARY KEY, name TEXT)", [])
            .unwrap();
        conn.execute("CREATE INDEX idx_parent_name ON parent(name)", [])
            .unwrap();

        let schema = VersionedSchema {
            version: 1,
            tables: &[PARENT_TABLE],
            migration: &[],
        };
        let err_msg = schema.validate(&conn).unwrap_err().to_string();
        assert!(err_msg.contains("non-null mismatch"));
    }

    #[test]
    fn test_validate_detects_missing_unique_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            [],
        )
        .unwrap();
        conn.execute(
            "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL REFERENCES parent(id) ON DELETE CASCADE, seq INTEGER NOT NULL)",
            [],
        )
        .unwrap();

        let schema = VersionedSchema {
            version: 1,
            tables: &[CHILD_TABLE],
            migration: &[],
        };
        let err_msg = schema.validate(&conn).unwrap_err().to_string();
        assert!(err_msg.contains("missing unique constraint"));
    }

    #[test]
    fn test_validate_detects_wrong_foreign_key_action() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            [],
        )
        .unwrap();
        conn.execute(
            "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL REFERENCES parent(id) ON DELETE SET NULL, seq INTEGER NOT NULL, UNIQUE (parent_id, seq))",
            [],
        )
        .unwrap();

        let schema = VersionedSchema {
            version: 1,
            tables: &[CHILD_TABLE],
            migration: &[],
        };
        let err_msg = schema.validate(&conn).unwrap_err().to_string();
        assert!(err_msg.contains("missing foreign key"));
    }
}
