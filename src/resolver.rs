//! Track resolution capability
//!
//! The engine never talks to a media API itself. Callers inject a
//! [`TrackResolver`] that turns a display name into playable audio bytes;
//! the same capability serves both the direct in-memory path and the batch
//! fan-out path.

use crate::error::ResolveError;

/// A resolved, playable audio source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    /// The audio payload, ready to write to disk or into an archive entry
    pub data: Vec<u8>,
    /// Track length in seconds, when the backing service reports one
    pub duration_secs: Option<u64>,
}

impl AudioSource {
    /// Wrap raw audio bytes with no known duration.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            duration_secs: None,
        }
    }
}

/// Abstraction over resolving a track name to downloadable audio, enabling
/// testability and keeping the concrete media API out of the core.
///
/// Retry policy, if any, belongs inside implementations: the engine treats
/// [`ResolveError::Transient`] exactly like [`ResolveError::NotFound`]
/// (skip and record, no retry).
#[async_trait::async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve a display name to an audio source, or fail for this one track.
    async fn resolve(&self, display_name: &str) -> Result<AudioSource, ResolveError>;
}
