//! Common test infrastructure
//!
//! Every test gets a fresh, migrated database with one user in a throwaway
//! directory, plus a real HTTP transport to point at an `httpmock` server.

use std::path::PathBuf;
use tapedeck::user::NewUser;
use tapedeck::{ContentResolver, Database, ReqwestTransport, UserStore};
use tempfile::TempDir;

pub const TEST_EMAIL: &str = "listener@example.com";

/// Bytes served as mp3 content.
pub const TEST_AUDIO_BYTES: &[u8] = b"ID3\x03\x00\x00\x00\x00\x00\x00fake mpeg frames";

pub struct TestDeck {
    pub db: Database,
    pub user_id: i64,
    pub output_dir: PathBuf,
    _dir: TempDir,
}

impl TestDeck {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let output_dir = dir.path().join("audio");
        std::fs::create_dir(&output_dir).unwrap();

        let mut db = Database::new(dir.path().join("tapedeck.db"));
        db.open(true);
        db.migrate().unwrap();
        let user_id = db.insert_user(&NewUser::new(TEST_EMAIL)).unwrap();

        TestDeck {
            db,
            user_id,
            output_dir,
            _dir: dir,
        }
    }

    pub fn resolver(&self) -> ContentResolver<ReqwestTransport> {
        let transport = ReqwestTransport::new(5, "tapedeck-tests").unwrap();
        ContentResolver::new(transport, &self.output_dir)
    }

    pub fn output_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.output_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
