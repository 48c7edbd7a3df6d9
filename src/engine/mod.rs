//! Batch fan-out download engine
//!
//! The [`BatchDownloader`] ties the pieces together:
//! - [`batching`] - order-preserving track-list splitting
//! - [`worker`] - per-batch workers and the bounded parallel dispatch
//! - [`completion`] - the append-only completion log and settlement tracking
//! - [`manifest`] - unavailable-track diffing and the `000_readme.txt` writer
//!
//! Control flow for a large list: dedup gate → batcher → worker pool →
//! completion tracker → manifest writer → archive assembler. Small lists take
//! a direct in-memory path with no job directory at all.

mod batching;
mod completion;
mod manifest;
mod worker;


pub use batching::split_into_batches;
pub use completion::{CompletionLog, await_settlement};
pub use manifest::{MANIFEST_FILE_NAME, diff_unavailable, write_unavailable_manifest};

use std::io::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::resolver::TrackResolver;
use crate::store::JobStore;
use crate::types::{
    BatchId, BatchJob, Event, JobMetadata, JobOutput, Settlement, TrackRequest,
};
use crate::utils;

/// Capacity of the event broadcast channel; slow subscribers lose the oldest
/// events, they never block the engine.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Batch fan-out download engine (cloneable - all fields are Arc-wrapped).
///
/// Construct one per process with an injected [`TrackResolver`] and
/// [`JobStore`], then call [`download_tracks`](Self::download_tracks) per
/// incoming request, or drive the phases yourself via
/// [`create_job`](Self::create_job), [`dispatch`](Self::dispatch), and
/// [`await_job`](Self::await_job).
#[derive(Clone)]
pub struct BatchDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    config: Arc<Config>,
    /// Injected track-resolution capability
    resolver: Arc<dyn TrackResolver>,
    /// Injected job-directory bookkeeping capability
    store: Arc<dyn JobStore>,
    /// Cross-worker completion record, polled by the tracker
    completion: CompletionLog,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Root cancellation token; child tokens are threaded through dispatch
    /// and the poll loop
    cancel_token: CancellationToken,
    /// Set to false during shutdown so no new jobs are accepted
    accepting_new: Arc<AtomicBool>,
}

impl BatchDownloader {
    /// Create a new engine.
    ///
    /// Fails fast with [`Error::Config`] when the configuration violates an
    /// invariant (zero batch size, empty worker pool).
    pub fn new(
        config: Config,
        resolver: Arc<dyn TrackResolver>,
        store: Arc<dyn JobStore>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            resolver,
            store,
            completion: CompletionLog::new(),
            event_tx,
            cancel_token: CancellationToken::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop accepting new jobs and cancel in-flight workers and waits.
    pub fn shutdown(&self) {
        info!("shutting down, cancelling in-flight jobs");
        self.accepting_new.store(false, Ordering::SeqCst);
        self.cancel_token.cancel();
    }

    /// Download a track list end to end and return the archive.
    ///
    /// Lists at or below the direct threshold are resolved straight into an
    /// in-memory zip. Larger lists go through the dedup gate, then the batch
    /// fan-out: split, dispatch, await settlement, diff, manifest, assemble.
    /// A [`Settlement::TimedOut`] job still produces an archive of whatever
    /// completed; the caller decides whether a partial result is acceptable.
    ///
    /// `identity_key` names the source for duplicate detection (e.g.
    /// `sp_playlist__<id>`, or [`utils::identity_key_for`] over the names).
    pub async fn download_tracks(
        &self,
        tracks: Vec<TrackRequest>,
        identity_key: &str,
    ) -> Result<JobOutput> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if tracks.is_empty() {
            return Err(Error::InvalidArgument(
                "track list must not be empty".to_string(),
            ));
        }

        if tracks.len() <= self.config.batch.direct_threshold {
            return self.download_direct(&tracks).await;
        }

        // Dedup gate: equivalent work already materialized short-circuits
        // straight to assembly of the existing directory.
        if self.store.exists_already(identity_key).await? {
            match self.store.lookup_job_directory(identity_key).await? {
                Some(dir) => {
                    info!(identity_key, ?dir, "reusing existing job directory");
                    let names = display_names(&tracks);
                    let produced = manifest::list_produced_files(&dir)?;
                    let unavailable = diff_unavailable(&names, &produced);
                    let archive = archive::assemble(&dir)?;
                    return Ok(JobOutput {
                        archive,
                        unavailable,
                        job_dir: Some(dir),
                        settlement: Settlement::Settled,
                    });
                }
                None => {
                    // Store inconsistency; treated as absent rather than fatal
                    warn!(identity_key, "store claims existence but has no directory");
                }
            }
        }

        let job = self.create_job(tracks.clone(), identity_key).await?;
        let expected = job.batches.len();
        let id = self.dispatch(&job);
        let settlement = self.await_job(&id, expected).await;

        let names = display_names(&tracks);
        let produced = manifest::list_produced_files(&job.dir)?;
        let unavailable = diff_unavailable(&names, &produced);
        write_unavailable_manifest(&job.dir, &unavailable)?;

        let archive = archive::assemble(&job.dir)?;
        self.completion.forget(&id);

        Ok(JobOutput {
            archive,
            unavailable,
            job_dir: Some(job.dir),
            settlement,
        })
    }

    /// The direct path for small lists: resolve each track sequentially and
    /// stream it straight into an in-memory zip. No job directory, no
    /// batching, no settlement wait; unavailable names are collected in-line.
    pub async fn download_direct(&self, tracks: &[TrackRequest]) -> Result<JobOutput> {
        if tracks.is_empty() {
            return Err(Error::InvalidArgument(
                "track list must not be empty".to_string(),
            ));
        }

        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = crate::archive::archive_file_options();
        let mut unavailable = Vec::new();

        for track in tracks {
            match self.resolver.resolve(&track.display_name).await {
                Ok(source) => {
                    let entry = format!("{}.mp3", utils::sanitize_filename(&track.display_name));
                    writer.start_file(entry, options)?;
                    writer.write_all(&source.data)?;
                }
                Err(e) => {
                    warn!(track = %track.display_name, error = %e, "track unavailable on direct path");
                    unavailable.push(track.display_name.clone());
                }
            }
        }

        let archive = writer.finish()?.into_inner();
        info!(
            tracks = tracks.len(),
            unavailable = unavailable.len(),
            archive_bytes = archive.len(),
            "direct download complete"
        );

        Ok(JobOutput {
            archive,
            unavailable,
            job_dir: None,
            settlement: Settlement::Settled,
        })
    }

    /// Create a [`BatchJob`]: split the list, create the job directory under
    /// the work root, and record directory and metadata with the store,
    /// stamped with the configured expiry.
    ///
    /// Check-then-create against the store is not assumed atomic; an
    /// already-existing directory is tolerated as a harmless duplicate.
    pub async fn create_job(
        &self,
        tracks: Vec<TrackRequest>,
        identity_key: &str,
    ) -> Result<BatchJob> {
        let track_count = tracks.len();
        let batches = split_into_batches(tracks, self.config.batch.batch_size)?;

        let dir = self.config.work_root.join(utils::job_dir_name());
        std::fs::create_dir_all(&dir)?;

        let metadata = JobMetadata {
            identity_key: identity_key.to_string(),
            track_count,
            created_at: chrono::Utc::now(),
        };
        let expires_at = chrono::Utc::now()
            + chrono::Duration::from_std(self.config.batch.job_expiry)
                .unwrap_or_else(|_| chrono::Duration::minutes(30));
        self.store
            .record_job_directory(&dir, &metadata, expires_at)
            .await?;

        let id = BatchId::generate();
        debug!(batch_id = %id, ?dir, batches = batches.len(), "job created");

        Ok(BatchJob { id, dir, batches })
    }

    /// Schedule all batches of `job` on the worker pool and return
    /// immediately with the job's token.
    ///
    /// Workers run on a pool bounded by `max_concurrent_batches`, each
    /// sequential within its batch, publishing into the completion log as
    /// they finish. Poll progress via [`await_job`](Self::await_job) or
    /// [`completed_batches`](Self::completed_batches).
    pub fn dispatch(&self, job: &BatchJob) -> BatchId {
        let ctx = worker::WorkerContext {
            batch_id: job.id.clone(),
            dir: job.dir.clone(),
            resolver: Arc::clone(&self.resolver),
            completion: self.completion.clone(),
            event_tx: self.event_tx.clone(),
            cancel_token: self.cancel_token.child_token(),
        };
        let batches = job.batches.clone();
        let concurrency = self.config.batch.max_concurrent_batches;

        self.event_tx
            .send(Event::BatchDispatched {
                id: job.id.clone(),
                batch_count: batches.len(),
            })
            .ok();
        info!(
            batch_id = %job.id,
            batch_count = batches.len(),
            concurrency,
            "dispatching batches"
        );

        tokio::spawn(async move {
            worker::run_all_batches(ctx, batches, concurrency).await;
        });

        job.id.clone()
    }

    /// Wait until `expected` batches of job `id` have reported completion,
    /// or progress stalls past the configured tolerance.
    ///
    /// `TimedOut` means "stop waiting", not failure: batches that completed
    /// are on disk and usable.
    pub async fn await_job(&self, id: &BatchId, expected: usize) -> Settlement {
        let completion = self.completion.clone();
        let poll_id = id.clone();
        let settlement = await_settlement(
            move || completion.completed_count(&poll_id),
            expected,
            &self.config.poll,
            &self.cancel_token,
        )
        .await;

        info!(batch_id = %id, ?settlement, "job settled");
        self.event_tx
            .send(Event::JobSettled {
                id: id.clone(),
                settlement,
            })
            .ok();

        settlement
    }

    /// Number of batches that have reported completion for job `id`.
    pub fn completed_batches(&self, id: &BatchId) -> usize {
        self.completion.completed_count(id)
    }
}

fn display_names(tracks: &[TrackRequest]) -> Vec<String> {
    tracks.iter().map(|t| t.display_name.clone()).collect()
}
