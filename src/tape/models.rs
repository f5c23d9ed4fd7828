use std::fmt;

/// Processing status of a tape.
///
/// `todo -> inprogress -> done | error`. Terminal statuses never change again,
/// capturing the same show a second time creates a new tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeStatus {
    Todo,
    InProgress,
    Done,  // terminal
    Error, // terminal
}

impl TapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TapeStatus::Todo => "todo",
            TapeStatus::InProgress => "inprogress",
            TapeStatus::Done => "done",
            TapeStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(TapeStatus::Todo),
            "inprogress" => Some(TapeStatus::InProgress),
            "done" => Some(TapeStatus::Done),
            "error" => Some(TapeStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TapeStatus::Done | TapeStatus::Error)
    }

    /// The only status a tape may hold right before entering this one.
    /// None for `todo`, which is only ever assigned at creation.
    pub fn predecessor(&self) -> Option<TapeStatus> {
        match self {
            TapeStatus::Todo => None,
            TapeStatus::InProgress => Some(TapeStatus::Todo),
            TapeStatus::Done | TapeStatus::Error => Some(TapeStatus::InProgress),
        }
    }

    pub fn can_transition_to(&self, next: TapeStatus) -> bool {
        next.predecessor() == Some(*self)
    }
}

impl fmt::Display for TapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The digital equivalent of a cassette: something recorded off the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tape {
    pub id: i64,
    pub user_id: i64,
    /// Station call letters.
    pub station: String,
    pub title: String,
    pub description: String,
    pub air_date: Option<String>,
    pub status: TapeStatus,
    /// Only ever set when `status` is [`TapeStatus::Error`].
    pub status_msg: Option<String>,
    pub created: String,
    pub updated: String,
}

impl fmt::Display for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title: String = self.title.chars().take(20).collect();
        write!(f, "tape {} {:?}", self.id, title)
    }
}

/// A tape about to be registered. New tapes always start as `todo`.
#[derive(Debug, Clone)]
pub struct NewTape {
    pub user_id: i64,
    pub station_id: i64,
    pub title: String,
    pub description: String,
    pub air_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub id: i64,
    pub call_letters: String,
    pub name: Option<String>,
    pub created: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A physical file, such as an mp3 download.
    File,
    /// A streaming resource. Never carries a file extension, even when the
    /// stream itself is mp3 data.
    Stream,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Stream => "stream",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "file" => Some(SourceKind::File),
            "stream" => Some(SourceKind::Stream),
            _ => None,
        }
    }
}

/// One resolved, ordered piece of content belonging to a tape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeSource {
    pub id: i64,
    pub tape_id: i64,
    /// Playback order among the sources of the same tape.
    pub seq: i64,
    pub kind: SourceKind,
    pub url: String,
    pub file_extension: Option<String>,
    /// As reported by the origin's `Content-Type` header.
    pub content_type: Option<String>,
    pub content: Option<String>,
    pub created: String,
    pub updated: String,
}

#[derive(Debug, Clone)]
pub struct NewTapeSource {
    pub tape_id: i64,
    pub seq: i64,
    pub kind: SourceKind,
    pub url: String,
    pub file_extension: Option<String>,
    pub content_type: Option<String>,
    pub content: Option<String>,
}

impl NewTapeSource {
    pub fn file(tape_id: i64, seq: i64, url: &str, file_extension: Option<&str>) -> Self {
        NewTapeSource {
            tape_id,
            seq,
            kind: SourceKind::File,
            url: url.to_string(),
            file_extension: file_extension.map(str::to_string),
            content_type: None,
            content: None,
        }
    }

    pub fn stream(tape_id: i64, seq: i64, url: &str) -> Self {
        NewTapeSource {
            tape_id,
            seq,
            kind: SourceKind::Stream,
            url: url.to_string(),
            file_extension: None,
            content_type: None,
            content: None,
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }
}
