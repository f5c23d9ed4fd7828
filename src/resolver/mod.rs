//! Content resolver: turns a URL into audio files on disk.
//!
//! A GET is issued and its `Content-Type` decides what happens next. An mp3
//! stream is written to the output directory, an M3U playlist is read and
//! each of its mp3 entries is resolved in turn. Anything else is rejected.

mod error;
mod playlist;
mod transport;

pub use error::ResolveError;
pub use playlist::mp3_entries;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, DEFAULT_USER_AGENT};

use crate::lazy_writer::{LazyWriter, LazyWriterError};
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const AUDIO_MPEG: &str = "audio/mpeg";
pub const AUDIO_MPEGURL: &str = "audio/x-mpegurl";

pub const DEFAULT_MAX_DEPTH: usize = 8;

/// An mp3 written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    /// Final URL the audio was served from.
    pub url: Url,
    pub path: PathBuf,
    /// `Content-Type` exactly as the origin sent it.
    pub content_type: String,
    pub bytes_written: u64,
}

impl AudioArtifact {
    pub fn file_extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }
}

#[derive(Debug)]
pub struct PlaylistEntry {
    /// The entry joined against the playlist URL, or the raw line if that failed.
    pub url: String,
    pub result: Result<Resolved, ResolveError>,
}

/// Outcome of a successful resolution. Playlists keep the outcome of every
/// entry, failed ones included.
#[derive(Debug)]
pub enum Resolved {
    Audio(AudioArtifact),
    Playlist {
        url: Url,
        entries: Vec<PlaylistEntry>,
    },
}

impl Resolved {
    /// Every artifact in the tree, in resolution order.
    pub fn artifacts(&self) -> Vec<&AudioArtifact> {
        let mut out = Vec::new();
        self.collect(&mut out, &mut Vec::new());
        out
    }

    /// Every failed branch in the tree, in resolution order.
    pub fn failures(&self) -> Vec<&ResolveError> {
        let mut out = Vec::new();
        self.collect(&mut Vec::new(), &mut out);
        out
    }

    fn collect<'a>(
        &'a self,
        artifacts: &mut Vec<&'a AudioArtifact>,
        failures: &mut Vec<&'a ResolveError>,
    ) {
        match self {
            Resolved::Audio(artifact) => artifacts.push(artifact),
            Resolved::Playlist { entries, .. } => {
                for entry in entries {
                    match &entry.result {
                        Ok(resolved) => resolved.collect(artifacts, failures),
                        Err(err) => failures.push(err),
                    }
                }
            }
        }
    }
}

/// The media type of a `Content-Type` value, lowercased, without parameters.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// The last segment of the decoded URL path. A decoded `/` starts a new
/// segment, so the name never leaves the output directory.
fn file_name(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let decoded = urlencoding::decode_binary(segment.as_bytes());
    let decoded = String::from_utf8_lossy(&decoded);
    match decoded.rsplit('/').next()? {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

pub struct ContentResolver<T> {
    transport: T,
    output_dir: PathBuf,
    max_depth: usize,
}

impl<T: HttpTransport> ContentResolver<T> {
    pub fn new<P: Into<PathBuf>>(transport: T, output_dir: P) -> Self {
        ContentResolver {
            transport,
            output_dir: output_dir.into(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// How many playlists deep entries may be nested below the root URL.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn resolve(&self, url: &str) -> Result<Resolved, ResolveError> {
        let url = Url::parse(url).map_err(|err| ResolveError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        let mut ancestors = HashSet::new();
        self.resolve_url(url, 0, &mut ancestors)
    }

    fn resolve_url(
        &self,
        url: Url,
        depth: usize,
        ancestors: &mut HashSet<Url>,
    ) -> Result<Resolved, ResolveError> {
        if depth > self.max_depth {
            return Err(ResolveError::DepthExceeded {
                url: url.to_string(),
                max_depth: self.max_depth,
            });
        }
        if ancestors.contains(&url) {
            return Err(ResolveError::Cycle {
                url: url.to_string(),
            });
        }

        info!("GET {}", url);
        let response = self
            .transport
            .get(&url)
            .map_err(|source| ResolveError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !response.status.is_success() {
            return Err(ResolveError::HttpStatus {
                url: response.url.to_string(),
                status: response.status.as_u16(),
            });
        }

        // Only the first value counts when the header is repeated.
        let content_type = response
            .headers
            .get(CONTENT_TYPE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default();
        debug!("content-type: {:?}", content_type);

        match media_type(&content_type).as_str() {
            AUDIO_MPEGURL => {
                if ancestors.contains(&response.url) {
                    return Err(ResolveError::Cycle {
                        url: response.url.to_string(),
                    });
                }
                // Only the playlists on the path from the root count, so a
                // playlist listed twice is resolved twice.
                let chain: Vec<Url> = [url, response.url.clone()]
                    .into_iter()
                    .filter(|link| ancestors.insert(link.clone()))
                    .collect();
                let result = self.process_playlist(response, depth, ancestors);
                for link in &chain {
                    ancestors.remove(link);
                }
                result
            }
            AUDIO_MPEG => self.process_mp3(response, content_type).map(Resolved::Audio),
            _ => Err(ResolveError::UnsupportedContentType {
                url: response.url.to_string(),
                content_type,
            }),
        }
    }

    fn process_playlist(
        &self,
        response: HttpResponse,
        depth: usize,
        ancestors: &mut HashSet<Url>,
    ) -> Result<Resolved, ResolveError> {
        let base = response.url;

        let mut buffer = LazyWriter::new();
        let mut body = response.body;
        io::copy(&mut body, &mut buffer).map_err(|source| ResolveError::Body {
            url: base.to_string(),
            source,
        })?;

        let text = match buffer.bytes() {
            Ok(bytes) => std::str::from_utf8(bytes)
                .map_err(|source| ResolveError::PlaylistEncoding {
                    url: base.to_string(),
                    source,
                })?
                .to_string(),
            Err(LazyWriterError::NotInitialized) => {
                warn!("Playlist {} is empty", base);
                String::new()
            }
            Err(source) => {
                return Err(ResolveError::PlaylistBody {
                    url: base.to_string(),
                    source,
                })
            }
        };
        debug!("playlist {} contents: {:?}", base, text);

        let mut entries = Vec::new();
        for line in mp3_entries(&text) {
            info!("found mp3 {}", line);
            let entry = match base.join(line) {
                Ok(url) => PlaylistEntry {
                    url: url.to_string(),
                    result: self.resolve_url(url, depth + 1, ancestors),
                },
                Err(err) => PlaylistEntry {
                    url: line.to_string(),
                    result: Err(ResolveError::InvalidUrl {
                        url: line.to_string(),
                        reason: err.to_string(),
                    }),
                },
            };
            if let Err(err) = &entry.result {
                warn!("Playlist {} entry {} failed: {}", base, entry.url, err);
            }
            entries.push(entry);
        }

        Ok(Resolved::Playlist { url: base, entries })
    }

    fn process_mp3(
        &self,
        response: HttpResponse,
        content_type: String,
    ) -> Result<AudioArtifact, ResolveError> {
        let name = file_name(&response.url).ok_or_else(|| ResolveError::MissingFileName {
            url: response.url.to_string(),
        })?;

        let path = self.output_dir.join(name);
        info!("opening file {:?}", path);
        let file = File::create(&path).map_err(|source| ResolveError::Output {
            path: path.clone(),
            source,
        })?;

        let mut writer = BufWriter::new(file);
        let mut body = response.body;
        let copied = io::copy(&mut body, &mut writer).and_then(|n| writer.flush().map(|_| n));

        match copied {
            Ok(bytes_written) => {
                info!("bytes written to {:?}: {}", path, bytes_written);
                Ok(AudioArtifact {
                    url: response.url,
                    path,
                    content_type,
                    bytes_written,
                })
            }
            Err(source) => {
                drop(writer);
                if let Err(err) = std::fs::remove_file(&path) {
                    warn!("Could not remove partial file {:?}: {}", path, err);
                }
                Err(ResolveError::Output { path, source })
            }
        }
    }
}
