use crate::lazy_writer::LazyWriterError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("error during GET {url}: {source:#}")]
    Transport {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("GET {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("unsupported content type: {content_type:?}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("failed to read response body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read playlist {url}: {source}")]
    PlaylistBody {
        url: String,
        #[source]
        source: LazyWriterError,
    },

    #[error("playlist {url} is not valid UTF-8")]
    PlaylistEncoding {
        url: String,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("cannot derive a file name from {url}")]
    MissingFileName { url: String },

    #[error("failed to write {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("playlist nesting deeper than {max_depth} at {url}")]
    DepthExceeded { url: String, max_depth: usize },

    #[error("playlist {url} is already being resolved")]
    Cycle { url: String },
}

impl ResolveError {
    /// The URL of the branch that failed.
    pub fn url(&self) -> Option<&str> {
        match self {
            ResolveError::InvalidUrl { url, .. }
            | ResolveError::Transport { url, .. }
            | ResolveError::HttpStatus { url, .. }
            | ResolveError::UnsupportedContentType { url, .. }
            | ResolveError::Body { url, .. }
            | ResolveError::PlaylistBody { url, .. }
            | ResolveError::PlaylistEncoding { url, .. }
            | ResolveError::MissingFileName { url }
            | ResolveError::DepthExceeded { url, .. }
            | ResolveError::Cycle { url } => Some(url),
            ResolveError::Output { .. } => None,
        }
    }
}
