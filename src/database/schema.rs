//! SQLite schema of the tapedeck database.
//!
//! Each version lists the statements that migrate the previous version to it,
//! plus the declared shape of every table afterwards.

use crate::sqlite_column;
use crate::sqlite_persistence::{ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema};

const USER_FK: ForeignKey = ForeignKey {
    foreign_table: "user",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const STATION_FK: ForeignKey = ForeignKey {
    foreign_table: "station",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const TAPE_FK: ForeignKey = ForeignKey {
    foreign_table: "tape",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

// =============================================================================
// Version 1 - Users, stations and tapes
// =============================================================================

const USER_TABLE_V1: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("uuid", &SqlType::Text, non_null = true),
        sqlite_column!("email", &SqlType::Text, non_null = true),
        sqlite_column!("external_id", &SqlType::Text),
        sqlite_column!("provider", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["uuid"], &["email"]],
};

const STATION_TABLE_V1: Table = Table {
    name: "station",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("call_letters", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["call_letters"]],
};

const TAPE_TABLE_V1: Table = Table {
    name: "tape",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!(
            "station_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&STATION_FK)
        ),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text, non_null = true),
        sqlite_column!("air_date", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("status_msg", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &["idx_tape_user_id"],
    unique_constraints: &[],
};

// =============================================================================
// Version 2 - Tape sources
// =============================================================================

const TAPE_SOURCE_TABLE_V2: Table = Table {
    name: "tape_source",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "tape_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TAPE_FK)
        ),
        sqlite_column!("seq", &SqlType::Integer, non_null = true),
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("file_extension", &SqlType::Text),
        sqlite_column!("content_type", &SqlType::Text),
        sqlite_column!("content", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &["idx_tape_source_tape_id"],
    unique_constraints: &[&["tape_id", "seq"]],
};

pub const TAPEDECK_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[USER_TABLE_V1, STATION_TABLE_V1, TAPE_TABLE_V1],
        migration: &[
            "CREATE TABLE user (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                external_id TEXT,
                provider TEXT NOT NULL,
                status TEXT NOT NULL CHECK (status IN ('enabled', 'disabled')),
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE station (
                id INTEGER PRIMARY KEY,
                call_letters TEXT NOT NULL UNIQUE,
                name TEXT,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE tape (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE,
                station_id INTEGER NOT NULL REFERENCES station(id) ON DELETE RESTRICT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                air_date TEXT,
                status TEXT NOT NULL CHECK (status IN ('todo', 'inprogress', 'done', 'error')),
                status_msg TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK (status = 'error' OR status_msg IS NULL)
            )",
            "CREATE INDEX idx_tape_user_id ON tape(user_id)",
        ],
    },
    VersionedSchema {
        version: 2,
        tables: &[
            USER_TABLE_V1,
            STATION_TABLE_V1,
            TAPE_TABLE_V1,
            TAPE_SOURCE_TABLE_V2,
        ],
        migration: &[
            "CREATE TABLE tape_source (
                id INTEGER PRIMARY KEY,
                tape_id INTEGER NOT NULL REFERENCES tape(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('file', 'stream')),
                url TEXT NOT NULL,
                file_extension TEXT,
                content_type TEXT,
                content TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (tape_id, seq),
                CHECK (kind = 'file' OR file_extension IS NULL)
            )",
            "CREATE INDEX idx_tape_source_tape_id ON tape_source(tape_id)",
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_versions_are_strictly_increasing_from_one() {
        for (index, schema) in TAPEDECK_VERSIONED_SCHEMAS.iter().enumerate() {
            assert_eq!(schema.version, index + 1);
            assert!(!schema.migration.is_empty());
        }
    }

    #[test]
    fn test_each_version_matches_its_declared_tables() {
        let conn = Connection::open_in_memory().unwrap();
        for schema in TAPEDECK_VERSIONED_SCHEMAS {
            schema.apply(&conn).unwrap();
            schema.validate(&conn).unwrap();
        }
    }
}
