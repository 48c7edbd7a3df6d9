//! Core types and events

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Number of hex characters in a [`BatchId`] token
const BATCH_ID_LEN: usize = 15;

/// One requested track, with its stable position in the original list.
///
/// `position` is assigned once by the caller (or by [`TrackRequest::from_names`])
/// and survives batching unchanged, so results can always be related back to
/// the original ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRequest {
    /// Human-readable track name, used both as the resolver query and
    /// (sanitized) as the output file name
    pub display_name: String,
    /// Zero-based index in the originally submitted list
    pub position: usize,
}

impl TrackRequest {
    /// Build an ordered request list from plain names, assigning positions.
    pub fn from_names<I, S>(names: I) -> Vec<TrackRequest>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .enumerate()
            .map(|(position, name)| TrackRequest {
                display_name: name.into(),
                position,
            })
            .collect()
    }
}

/// A contiguous, ordered chunk of requested tracks assigned to one worker.
///
/// Batches are created by [`split_into_batches`](crate::engine::split_into_batches)
/// and consumed exactly once each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Zero-based index of this batch within its job
    pub index: usize,
    /// The tracks in this batch, in original order
    pub tracks: Vec<TrackRequest>,
}

/// Opaque token identifying one batch job.
///
/// 15 hex characters, randomly generated at job creation. Workers use it as
/// the key under which they report completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub String);

impl BatchId {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        use rand::Rng;
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill(&mut bytes[..]);
        let mut hex = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            hex.push_str(&format!("{b:02x}"));
        }
        hex.truncate(BATCH_ID_LEN);
        BatchId(hex)
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unit of work covering all batches derived from one request.
///
/// Owns the job directory *path*; the directory itself is created together
/// with its store record and destroyed by the caller's expiry system, never
/// by this library.
#[derive(Debug, Clone)]
pub struct BatchJob {
    /// Token identifying this job across workers and the completion log
    pub id: BatchId,
    /// Directory into which all workers write their track files
    pub dir: PathBuf,
    /// The batches to dispatch, in order
    pub batches: Vec<Batch>,
}

/// Outcome of attempting one track inside one worker. Workers aggregate
/// these for logging and event counts; callers observe the per-track story
/// through [`Event`]s and [`JobOutput::unavailable`], since a worker task can
/// outlive a timed-out settlement wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DownloadOutcome {
    /// The track that was attempted
    pub track: TrackRequest,
    /// What happened
    pub status: TrackStatus,
    /// Where the audio landed, when `status` is `Succeeded`
    pub local_file: Option<PathBuf>,
}

/// Per-track status inside a [`DownloadOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum TrackStatus {
    /// Audio resolved and written to the job directory
    Succeeded,
    /// The resolver found no audio source for the name
    NotFound,
    /// A transient resolver failure; not retried at this layer
    TransientError,
}

/// How the completion tracker stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Settlement {
    /// Every expected batch reported completion
    Settled,
    /// Progress stalled past the tolerance threshold (or the wall-clock
    /// ceiling / cancellation hit). Not a job failure: batches that did
    /// complete are still usable.
    TimedOut,
}

/// Metadata recorded with a job directory in the [`JobStore`](crate::store::JobStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Caller-supplied identity of the source (e.g., `sp_playlist__<id>`)
    pub identity_key: String,
    /// Number of tracks the job was created for
    pub track_count: usize,
    /// When the job was created
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Final result of an end-to-end download call.
#[derive(Debug, Clone)]
pub struct JobOutput {
    /// Zip archive bytes, ready to stream to the user
    pub archive: Vec<u8>,
    /// Requested names with no corresponding output file, in request order
    pub unavailable: Vec<String>,
    /// The job directory, when the batch path was taken (`None` on the
    /// direct in-memory path)
    pub job_dir: Option<PathBuf>,
    /// How waiting ended; `TimedOut` means the archive may be partial
    pub settlement: Settlement,
}

/// Events emitted by the engine (broadcast to all subscribers).
#[derive(Debug, Clone)]
pub enum Event {
    /// A job's batches were handed to the worker pool
    BatchDispatched {
        /// Job token
        id: BatchId,
        /// Number of batches scheduled
        batch_count: usize,
    },
    /// One worker finished its batch and reported in
    BatchCompleted {
        /// Job token
        id: BatchId,
        /// Index of the completed batch
        batch_index: usize,
        /// Tracks written successfully
        succeeded: usize,
        /// Tracks skipped as unavailable
        failed: usize,
    },
    /// A single track could not be resolved
    TrackUnavailable {
        /// Job token
        id: BatchId,
        /// Display name of the track
        name: String,
    },
    /// The completion tracker stopped waiting for a job
    JobSettled {
        /// Job token
        id: BatchId,
        /// How waiting ended
        settlement: Settlement,
    },
}
