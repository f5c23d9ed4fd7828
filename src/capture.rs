//! Records a show: registers a tape, resolves its URL and stores one source
//! per downloaded file.

use crate::database::Database;
use crate::resolver::{ContentResolver, HttpTransport};
use crate::tape::{NewTape, NewTapeSource, Tape, TapeStatus, TapeStore};
use anyhow::{Context, Result};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub user_id: i64,
    /// Created on first use.
    pub station: String,
    pub title: String,
    pub description: String,
    pub air_date: Option<String>,
    pub url: String,
}

pub struct Recorder<'a, T> {
    db: &'a Database,
    resolver: &'a ContentResolver<T>,
}

impl<'a, T: HttpTransport> Recorder<'a, T> {
    pub fn new(db: &'a Database, resolver: &'a ContentResolver<T>) -> Self {
        Recorder { db, resolver }
    }

    /// Runs one capture to completion and returns the tape in its terminal
    /// status. Resolution failures end up in the tape, not in the returned
    /// error; only storage failures are returned.
    pub fn record(&self, request: &CaptureRequest) -> Result<Tape> {
        let station_id = self.station_id(&request.station)?;
        let tape_id = self.db.insert_tape(&NewTape {
            user_id: request.user_id,
            station_id,
            title: request.title.clone(),
            description: request.description.clone(),
            air_date: request.air_date.clone(),
        })?;
        self.db.update_status(tape_id, TapeStatus::InProgress, None)?;

        let failure = match self.resolve_sources(tape_id, &request.url) {
            Ok(failure) => failure,
            Err(err) => Some(format!("{:#}", err)),
        };

        match failure {
            None => self.db.update_status(tape_id, TapeStatus::Done, None)?,
            Some(detail) => {
                error!("Capture of tape {} failed: {}", tape_id, detail);
                self.db
                    .update_status(tape_id, TapeStatus::Error, Some(&detail))?
            }
        }

        self.db
            .get_tape(tape_id)?
            .with_context(|| format!("Tape {} vanished during capture", tape_id))
    }

    fn station_id(&self, call_letters: &str) -> Result<i64> {
        match self.db.get_station_by_call_letters(call_letters)? {
            Some(station) => Ok(station.id),
            None => {
                info!("Registering station {}", call_letters);
                self.db.insert_station(call_letters, None)
            }
        }
    }

    /// Resolves `url` and stores every artifact as a source of the tape.
    /// Returns the reason the capture is incomplete, if it is.
    fn resolve_sources(&self, tape_id: i64, url: &str) -> Result<Option<String>> {
        let resolved = match self.resolver.resolve(url) {
            Ok(resolved) => resolved,
            Err(err) => return Ok(Some(err.to_string())),
        };

        let artifacts = resolved.artifacts();
        for artifact in &artifacts {
            let seq = self.db.next_source_seq(tape_id)?;
            let source = NewTapeSource::file(
                tape_id,
                seq,
                artifact.url.as_str(),
                artifact.file_extension(),
            )
            .with_content_type(&artifact.content_type);
            self.db.insert_source(&source)?;
            info!(
                "Tape {} source {} from {} ({} bytes)",
                tape_id, seq, artifact.url, artifact.bytes_written
            );
        }

        if let Some(first) = resolved.failures().first() {
            return Ok(Some(first.to_string()));
        }
        if artifacts.is_empty() {
            return Ok(Some(format!("no audio found at {}", url)));
        }
        Ok(None)
    }
}
