use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the analysis engine's public API.
///
/// Every per-file variant carries the path of the file that produced it so
/// failures collected during a crawl or a full index run stay attributable.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    /// Only used internally; unresolved specifiers reach callers as
    /// `resolved = false` / `None`.
    #[error("could not resolve '{specifier}' from {path}")]
    Resolution { path: PathBuf, specifier: String },

    #[error("parser host unavailable: {0}")]
    HostUnavailable(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("no analyzer registered for {path}")]
    UnsupportedFileType { path: PathBuf },
}

impl AnalysisError {
    /// Short machine-readable kind name, stable across versions.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::FileRead { .. } => "FileReadError",
            AnalysisError::Parse { .. } => "ParseError",
            AnalysisError::Resolution { .. } => "ResolutionError",
            AnalysisError::HostUnavailable(_) => "HostUnavailableError",
            AnalysisError::Timeout(_) => "TimeoutError",
            AnalysisError::UnsupportedFileType { .. } => "UnsupportedFileTypeError",
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        AnalysisError::Parse {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Map a host failure for `path` onto the public error kinds. Remote failures are
    /// per-file analysis errors; transport failures mean the host is unavailable.
    pub fn from_host(path: impl Into<PathBuf>, err: HostError) -> Self {
        match err {
            HostError::Remote { message, detail } => {
                let unsupported = message == "unsupported file type"
                    || detail.as_deref() == Some("UnsupportedFileTypeError");
                if unsupported {
                    AnalysisError::UnsupportedFileType { path: path.into() }
                } else {
                    AnalysisError::parse(path, message)
                }
            }
            other => other.into(),
        }
    }
}

/// Errors produced by the isolated parser host transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The worker died while the request was pending.
    #[error("parser host crashed")]
    Crashed,

    /// The worker could not be started or refused the request.
    #[error("parser host unavailable: {0}")]
    Unavailable(String),

    /// The worker handled the request and reported a failure.
    #[error("{message}")]
    Remote {
        message: String,
        detail: Option<String>,
    },

    #[error("parser host timed out after {0:?}")]
    Timeout(Duration),
}

impl From<HostError> for AnalysisError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Timeout(d) => AnalysisError::Timeout(d),
            other => AnalysisError::HostUnavailable(other.to_string()),
        }
    }
}

/// Errors from saving or loading the persisted reverse index.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("unsupported index version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("failed to persist index file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
