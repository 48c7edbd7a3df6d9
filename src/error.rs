//! Error types for playlist-dl
//!
//! The library distinguishes two failure planes:
//! - [`Error`]: failures of an operation as a whole (bad arguments, I/O while
//!   writing the archive or manifest, store failures). These surface to the
//!   caller via the [`Result`] alias.
//! - [`ResolveError`]: per-track resolution failures. These never fail a batch
//!   or a job; workers skip the track and record it as unavailable.

use thiserror::Error;

/// Result type alias for playlist-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for playlist-dl
///
/// Each variant carries enough context to diagnose the failing call without
/// re-running it.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument violated a contract (e.g., batch size of zero, empty track
    /// list). Raised synchronously, before any work is dispatched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch_size")
        key: Option<String>,
    },

    /// I/O error while creating the job directory, writing track files, or
    /// writing the manifest
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive assembly failed (zip-level failure, as opposed to plain I/O)
    #[error("archive error: {0}")]
    Archive(String),

    /// The job store capability reported a failure
    #[error("job store error: {0}")]
    Store(String),

    /// A job directory the store claims to know about could not be found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Serialization error (config parsing, job metadata)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-track resolution failure, returned by [`TrackResolver`](crate::resolver::TrackResolver).
///
/// Both variants are handled identically by workers: skip the track, record it
/// as unavailable, move on. No retry is performed at this layer; if a resolver
/// wants retries, it implements them internally.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// No playable audio source exists for the given display name
    #[error("no audio source found for {0:?}")]
    NotFound(String),

    /// A transient failure (network hiccup, rate limit) prevented resolution
    #[error("transient failure resolving {name:?}: {reason}")]
    Transient {
        /// The display name that failed to resolve
        name: String,
        /// What went wrong, for logs and diagnostics
        reason: String,
    },
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => Error::Io(io),
            other => Error::Archive(other.to_string()),
        }
    }
}
