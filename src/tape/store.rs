use super::{NewTape, NewTapeSource, SourceKind, Station, Tape, TapeSource, TapeStatus};
use crate::database::{text_enum_column, Database, Query};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::Row;
use tracing::{debug, info};

/// Typed access to tapes and their sources.
///
/// Single-row reads return `Ok(None)` when nothing matches, multi-row reads
/// return an empty vector. A row that fails to map aborts the read.
pub trait TapeStore {
    fn insert_station(&self, call_letters: &str, name: Option<&str>) -> Result<i64>;

    fn get_station_by_call_letters(&self, call_letters: &str) -> Result<Option<Station>>;

    /// Registers a new tape in status `todo` and returns its id.
    fn insert_tape(&self, tape: &NewTape) -> Result<i64>;

    fn get_tape(&self, id: i64) -> Result<Option<Tape>>;

    fn get_tapes_for_user(&self, user_id: i64) -> Result<Vec<Tape>>;

    /// Moves a tape along its lifecycle. Only `todo -> inprogress` and
    /// `inprogress -> done | error` are accepted, and `detail` only with `error`.
    fn update_status(
        &self,
        tape_id: i64,
        status: TapeStatus,
        detail: Option<&str>,
    ) -> Result<()>;

    fn insert_source(&self, source: &NewTapeSource) -> Result<i64>;

    /// Sources of a tape ordered by sequence number.
    fn get_sources_for_tape(&self, tape_id: i64) -> Result<Vec<TapeSource>>;

    /// The sequence number to use for the next source appended to a tape.
    fn next_source_seq(&self, tape_id: i64) -> Result<i64>;

    fn update_source_content(
        &self,
        source_id: i64,
        content_type: &str,
        content: Option<&str>,
    ) -> Result<()>;
}

const TAPE_SELECT_SQL: &str = "SELECT T.id AS id, T.user_id AS user_id, S.call_letters AS station, \
     T.title AS title, T.description AS description, T.air_date AS air_date, \
     T.status AS status, T.status_msg AS status_msg, T.created_at AS created_at, \
     T.updated_at AS updated_at \
     FROM tape T INNER JOIN station S ON T.station_id = S.id";

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn row_to_tape(row: &Row<'_>) -> rusqlite::Result<Tape> {
    Ok(Tape {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        station: row.get("station")?,
        title: row.get("title")?,
        description: row.get("description")?,
        air_date: row.get("air_date")?,
        status: text_enum_column(row, "status", TapeStatus::from_str)?,
        status_msg: row.get("status_msg")?,
        created: row.get("created_at")?,
        updated: row.get("updated_at")?,
    })
}

fn row_to_station(row: &Row<'_>) -> rusqlite::Result<Station> {
    Ok(Station {
        id: row.get("id")?,
        call_letters: row.get("call_letters")?,
        name: row.get("name")?,
        created: row.get("created_at")?,
    })
}

fn row_to_source(row: &Row<'_>) -> rusqlite::Result<TapeSource> {
    Ok(TapeSource {
        id: row.get("id")?,
        tape_id: row.get("tape_id")?,
        seq: row.get("seq")?,
        kind: text_enum_column(row, "kind", SourceKind::from_str)?,
        url: row.get("url")?,
        file_extension: row.get("file_extension")?,
        content_type: row.get("content_type")?,
        content: row.get("content")?,
        created: row.get("created_at")?,
        updated: row.get("updated_at")?,
    })
}

impl Database {
    /// Runs an `INSERT ... RETURNING id` and hands back the id.
    fn insert_returning_id(&self, query: Query<'_>) -> Result<i64> {
        let name = query.name;
        let mut id = None;
        self.run_query(query.on_row(|row| {
            id = Some(row.get(0)?);
            Ok(())
        }))?;
        id.with_context(|| format!("{} returned no id", name))
    }

    /// Runs an `UPDATE ... RETURNING id` and reports how many rows it touched.
    fn update_counting_rows(&self, query: Query<'_>) -> Result<usize> {
        let mut count = 0;
        self.run_query(query.on_row(|_| {
            count += 1;
            Ok(())
        }))?;
        Ok(count)
    }
}

impl TapeStore for Database {
    fn insert_station(&self, call_letters: &str, name: Option<&str>) -> Result<i64> {
        self.insert_returning_id(
            Query::new(
                "InsertStation",
                "INSERT INTO station (call_letters, name, created_at) \
                 VALUES (:call_letters, :name, :created) RETURNING id;",
            )
            .performs_update()
            .bind(":call_letters", call_letters.to_string())
            .bind(":name", name.map(str::to_string))
            .bind(":created", now()),
        )
        .with_context(|| format!("Failed to insert station {}", call_letters))
    }

    fn get_station_by_call_letters(&self, call_letters: &str) -> Result<Option<Station>> {
        let mut station = None;
        self.run_query(
            Query::new(
                "GetStationByCallLetters",
                "SELECT * FROM station WHERE call_letters = :call_letters;",
            )
            .bind(":call_letters", call_letters.to_string())
            .on_row(|row| {
                station = Some(row_to_station(row)?);
                Ok(())
            }),
        )
        .with_context(|| format!("Failed to read station {}", call_letters))?;
        Ok(station)
    }

    fn insert_tape(&self, tape: &NewTape) -> Result<i64> {
        let created = now();
        let id = self
            .insert_returning_id(
                Query::new(
                    "InsertTape",
                    "INSERT INTO tape (user_id, station_id, title, description, air_date, status, \
                     created_at, updated_at) \
                     VALUES (:user_id, :station_id, :title, :description, :air_date, :status, \
                     :created, :created) RETURNING id;",
                )
                .performs_update()
                .bind(":user_id", tape.user_id)
                .bind(":station_id", tape.station_id)
                .bind(":title", tape.title.clone())
                .bind(":description", tape.description.clone())
                .bind(":air_date", tape.air_date.clone())
                .bind(":status", TapeStatus::Todo.as_str().to_string())
                .bind(":created", created),
            )
            .with_context(|| format!("Failed to insert tape {:?}", tape.title))?;
        info!("Registered tape {} {:?}", id, tape.title);
        Ok(id)
    }

    fn get_tape(&self, id: i64) -> Result<Option<Tape>> {
        debug!("enter get_tape {}", id);
        let mut tape = None;
        self.run_query(
            Query::new("GetTape", format!("{} WHERE T.id = :id;", TAPE_SELECT_SQL))
                .bind(":id", id)
                .on_row(|row| {
                    let found = row_to_tape(row)?;
                    debug!("tape returned {}", found);
                    tape = Some(found);
                    Ok(())
                }),
        )
        .with_context(|| format!("Failed to read tape {}", id))?;
        Ok(tape)
    }

    fn get_tapes_for_user(&self, user_id: i64) -> Result<Vec<Tape>> {
        debug!("enter get_tapes_for_user {}", user_id);
        let mut tapes = Vec::new();
        self.run_query(
            Query::new(
                "GetTapesForUser",
                format!("{} WHERE T.user_id = :id ORDER BY T.id;", TAPE_SELECT_SQL),
            )
            .bind(":id", user_id)
            .on_row(|row| {
                let tape = row_to_tape(row)?;
                debug!("tape added {}", tape);
                tapes.push(tape);
                Ok(())
            }),
        )
        .with_context(|| format!("Failed to read tapes of user {}", user_id))?;
        Ok(tapes)
    }

    fn update_status(
        &self,
        tape_id: i64,
        status: TapeStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        if detail.is_some() && status != TapeStatus::Error {
            bail!(
                "Tape {} status {} cannot carry a detail message",
                tape_id,
                status
            );
        }
        let Some(from) = status.predecessor() else {
            bail!("Tape {} cannot be moved back to {}", tape_id, status);
        };

        let updated = self
            .update_counting_rows(
                Query::new(
                    "UpdateTapeStatus",
                    "UPDATE tape SET status = :status, status_msg = :status_msg, updated_at = :now \
                     WHERE id = :id AND status = :from RETURNING id;",
                )
                .performs_update()
                .bind(":id", tape_id)
                .bind(":status", status.as_str().to_string())
                .bind(":status_msg", detail.map(str::to_string))
                .bind(":from", from.as_str().to_string())
                .bind(":now", now()),
            )
            .with_context(|| format!("Failed to update status of tape {}", tape_id))?;

        if updated == 0 {
            match self.get_tape(tape_id)? {
                None => bail!("Tape {} not found", tape_id),
                Some(tape) => bail!(
                    "Tape {} cannot move from {} to {}",
                    tape_id,
                    tape.status,
                    status
                ),
            }
        }

        info!("Tape {} is now {}", tape_id, status);
        Ok(())
    }

    fn insert_source(&self, source: &NewTapeSource) -> Result<i64> {
        if source.kind == SourceKind::Stream && source.file_extension.is_some() {
            bail!(
                "Stream source {} of tape {} cannot have a file extension",
                source.url,
                source.tape_id
            );
        }

        let created = now();
        self.insert_returning_id(
            Query::new(
                "InsertTapeSource",
                "INSERT INTO tape_source (tape_id, seq, kind, url, file_extension, content_type, \
                 content, created_at, updated_at) \
                 VALUES (:tape_id, :seq, :kind, :url, :file_extension, :content_type, :content, \
                 :created, :created) RETURNING id;",
            )
            .performs_update()
            .bind(":tape_id", source.tape_id)
            .bind(":seq", source.seq)
            .bind(":kind", source.kind.as_str().to_string())
            .bind(":url", source.url.clone())
            .bind(":file_extension", source.file_extension.clone())
            .bind(":content_type", source.content_type.clone())
            .bind(":content", source.content.clone())
            .bind(":created", created),
        )
        .with_context(|| {
            format!(
                "Failed to insert source {} of tape {}",
                source.seq, source.tape_id
            )
        })
    }

    fn get_sources_for_tape(&self, tape_id: i64) -> Result<Vec<TapeSource>> {
        let mut sources = Vec::new();
        self.run_query(
            Query::new(
                "GetSourcesForTape",
                "SELECT * FROM tape_source WHERE tape_id = :tape_id ORDER BY seq;",
            )
            .bind(":tape_id", tape_id)
            .on_row(|row| {
                sources.push(row_to_source(row)?);
                Ok(())
            }),
        )
        .with_context(|| format!("Failed to read sources of tape {}", tape_id))?;
        Ok(sources)
    }

    fn next_source_seq(&self, tape_id: i64) -> Result<i64> {
        let mut next = 1;
        self.run_query(
            Query::new(
                "NextSourceSeq",
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM tape_source WHERE tape_id = :tape_id;",
            )
            .bind(":tape_id", tape_id)
            .on_row(|row| {
                next = row.get(0)?;
                Ok(())
            }),
        )
        .with_context(|| format!("Failed to compute next source of tape {}", tape_id))?;
        Ok(next)
    }

    fn update_source_content(
        &self,
        source_id: i64,
        content_type: &str,
        content: Option<&str>,
    ) -> Result<()> {
        let updated = self
            .update_counting_rows(
                Query::new(
                    "UpdateSourceContent",
                    "UPDATE tape_source SET content_type = :content_type, content = :content, \
                     updated_at = :now WHERE id = :id RETURNING id;",
                )
                .performs_update()
                .bind(":id", source_id)
                .bind(":content_type", content_type.to_string())
                .bind(":content", content.map(str::to_string))
                .bind(":now", now()),
            )
            .with_context(|| format!("Failed to update content of source {}", source_id))?;

        if updated == 0 {
            bail!("Tape source {} not found", source_id);
        }
        Ok(())
    }
}
