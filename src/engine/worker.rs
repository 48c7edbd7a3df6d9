//! Batch workers and parallel dispatch
//!
//! One worker per batch, run through a buffered stream bounded by the pool
//! size. A worker downloads its tracks one at a time (bounding per-worker
//! resource use), writes each into the shared job directory, and publishes
//! its batch index into the completion log on exit. Workers share no mutable
//! state beyond that log: file writes are disjoint by batch partitioning.

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ResolveError;
use crate::resolver::TrackResolver;
use crate::types::{Batch, BatchId, DownloadOutcome, Event, TrackRequest, TrackStatus};
use crate::utils::sanitize_filename;

use super::completion::CompletionLog;

/// Everything a worker needs, cloned per batch.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) batch_id: BatchId,
    pub(crate) dir: PathBuf,
    pub(crate) resolver: Arc<dyn TrackResolver>,
    pub(crate) completion: CompletionLog,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) cancel_token: CancellationToken,
}

/// Run all batches of a job through a worker pool of `concurrency` workers.
///
/// Resolves once every worker has finished (or the job was cancelled);
/// callers that only need scheduling spawn this and return immediately.
pub(crate) async fn run_all_batches(
    ctx: WorkerContext,
    batches: Vec<Batch>,
    concurrency: usize,
) -> Vec<DownloadOutcome> {
    let results: Vec<Vec<DownloadOutcome>> = stream::iter(batches)
        .map(|batch| {
            let ctx = ctx.clone();
            async move { run_batch(&ctx, batch).await }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut outcomes: Vec<DownloadOutcome> = results.into_iter().flatten().collect();
    // Workers finish in arbitrary order; restore request order for callers
    outcomes.sort_by_key(|o| o.track.position);

    let succeeded = outcomes
        .iter()
        .filter(|o| o.status == TrackStatus::Succeeded)
        .count();
    info!(
        batch_id = %ctx.batch_id,
        succeeded,
        failed = outcomes.len() - succeeded,
        "all batch workers finished"
    );

    outcomes
}

/// Download one batch sequentially, then publish its completion.
///
/// A resolver failure is local to its track: the worker records it and moves
/// on, never aborting the batch and never retrying. Cancellation stops the
/// worker between tracks without publishing completion, so the tracker sees
/// the batch as unfinished.
pub(crate) async fn run_batch(ctx: &WorkerContext, batch: Batch) -> Vec<DownloadOutcome> {
    let mut outcomes = Vec::with_capacity(batch.tracks.len());

    for track in batch.tracks {
        if ctx.cancel_token.is_cancelled() {
            warn!(
                batch_id = %ctx.batch_id,
                batch_index = batch.index,
                "worker cancelled mid-batch"
            );
            return outcomes;
        }

        let outcome = match ctx.resolver.resolve(&track.display_name).await {
            Ok(source) => {
                let file_name = format!("{}.mp3", sanitize_filename(&track.display_name));
                let path = ctx.dir.join(file_name);
                match tokio::fs::write(&path, &source.data).await {
                    Ok(()) => {
                        debug!(
                            batch_id = %ctx.batch_id,
                            track = %track.display_name,
                            bytes = source.data.len(),
                            "track downloaded"
                        );
                        DownloadOutcome {
                            track,
                            status: TrackStatus::Succeeded,
                            local_file: Some(path),
                        }
                    }
                    Err(e) => {
                        // Disk trouble is surfaced like a transient resolver
                        // failure: recorded, not fatal to the batch
                        warn!(
                            batch_id = %ctx.batch_id,
                            track = %track.display_name,
                            error = %e,
                            "failed to write track file"
                        );
                        unavailable(ctx, track, TrackStatus::TransientError)
                    }
                }
            }
            Err(ResolveError::NotFound(_)) => {
                warn!(
                    batch_id = %ctx.batch_id,
                    track = %track.display_name,
                    "no audio source found"
                );
                unavailable(ctx, track, TrackStatus::NotFound)
            }
            Err(ResolveError::Transient { reason, .. }) => {
                warn!(
                    batch_id = %ctx.batch_id,
                    track = %track.display_name,
                    reason = %reason,
                    "transient resolver failure, not retrying here"
                );
                unavailable(ctx, track, TrackStatus::TransientError)
            }
        };
        outcomes.push(outcome);
    }

    // Append-only and idempotent; partitioning guarantees this index is ours
    ctx.completion.record(&ctx.batch_id, batch.index);

    let succeeded = outcomes
        .iter()
        .filter(|o| o.status == TrackStatus::Succeeded)
        .count();
    ctx.event_tx
        .send(Event::BatchCompleted {
            id: ctx.batch_id.clone(),
            batch_index: batch.index,
            succeeded,
            failed: outcomes.len() - succeeded,
        })
        .ok();

    outcomes
}

fn unavailable(ctx: &WorkerContext, track: TrackRequest, status: TrackStatus) -> DownloadOutcome {
    ctx.event_tx
        .send(Event::TrackUnavailable {
            id: ctx.batch_id.clone(),
            name: track.display_name.clone(),
        })
        .ok();
    DownloadOutcome {
        track,
        status,
        local_file: None,
    }
}
