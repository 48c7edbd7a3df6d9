//! Completion log and settlement tracking
//!
//! Workers publish their batch index into the [`CompletionLog`] when they
//! finish; the coordinating task polls the log through [`await_settlement`]
//! until every expected batch has reported in or progress stalls past the
//! tolerance threshold. Pure pull: the tracker never blocks worker progress,
//! and workers never signal the tracker directly.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PollConfig;
use crate::types::{BatchId, Settlement};

/// Append-only record of which batch indices have completed, per job.
///
/// The single piece of cross-worker shared mutation in the engine. Inserts
/// are idempotent (set semantics), so a worker reporting twice is harmless.
/// Batch partitioning guarantees no two workers ever report the same index.
#[derive(Debug, Clone, Default)]
pub struct CompletionLog {
    inner: Arc<Mutex<HashMap<BatchId, HashSet<usize>>>>,
}

impl CompletionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `batch_index` of job `id` has completed.
    ///
    /// Returns `false` if that index was already recorded.
    pub fn record(&self, id: &BatchId, batch_index: usize) -> bool {
        self.locked()
            .entry(id.clone())
            .or_default()
            .insert(batch_index)
    }

    /// Number of distinct batches that have reported completion for `id`.
    pub fn completed_count(&self, id: &BatchId) -> usize {
        self.locked().get(id).map_or(0, HashSet::len)
    }

    /// The completed batch indices for `id`, sorted ascending.
    pub fn completed_indices(&self, id: &BatchId) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .locked()
            .get(id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        indices.sort_unstable();
        indices
    }

    /// Drop all record of job `id` (after the caller has consumed the result).
    pub fn forget(&self, id: &BatchId) {
        self.locked().remove(id);
    }

    // Poisoning cannot leave the set in a torn state (single insert per
    // critical section), so recover rather than propagate.
    fn locked(&self) -> MutexGuard<'_, HashMap<BatchId, HashSet<usize>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Poll a completion feed until the job settles or stalls out.
///
/// `poll` reads the current completed-batch count; it is called once per
/// iteration, so a feed reaching `expected` within K readings settles within
/// K polls.
///
/// Wait strategy, all knobs from [`PollConfig`]:
/// - polls every `initial_interval` until the count first rises above zero,
///   then every `progress_interval`;
/// - an unchanged count across consecutive polls increments a stall counter;
///   at `stall_limit` consecutive unchanged polls the wait ends with
///   [`Settlement::TimedOut`];
/// - when the unchanged run breaks after the counter passed 1, the counter
///   resets to 1, not 0, so a long-lived job never fully regains its stall
///   allowance;
/// - `count >= expected` ends the wait immediately with
///   [`Settlement::Settled`], regardless of interval or stall state;
/// - the optional `max_wait` ceiling and the cancellation token both end the
///   wait with `TimedOut` ("stop waiting", not "job failed").
pub async fn await_settlement<F>(
    mut poll: F,
    expected: usize,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Settlement
where
    F: FnMut() -> usize,
{
    let started = std::time::Instant::now();
    let mut interval = config.initial_interval;
    let mut prev: usize = 0;
    let mut stalls: u32 = 0;

    loop {
        let count = poll();
        debug!(count, prev, stalls, expected, "settlement poll");

        if count >= expected {
            return Settlement::Settled;
        }

        if count == prev {
            stalls += 1;
            if stalls >= config.stall_limit {
                warn!(count, expected, "no progress across {} polls, giving up", stalls);
                return Settlement::TimedOut;
            }
        } else if stalls > 1 {
            stalls = 1;
        }

        if count > 0 {
            interval = config.progress_interval;
        }
        prev = count;

        if let Some(max_wait) = config.max_wait
            && started.elapsed() >= max_wait
        {
            warn!(count, expected, "wall-clock ceiling reached, giving up");
            return Settlement::TimedOut;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => {
                debug!(count, expected, "settlement wait cancelled");
                return Settlement::TimedOut;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_poll_config(stall_limit: u32) -> PollConfig {
        PollConfig {
            initial_interval: Duration::from_millis(2),
            progress_interval: Duration::from_millis(1),
            stall_limit,
            max_wait: None,
        }
    }

    /// Feed that replays a fixed sequence of counts, then repeats the last.
    fn feed(counts: Vec<usize>) -> impl FnMut() -> usize {
        let mut i = 0;
        move || {
            let value = *counts.get(i).unwrap_or(counts.last().unwrap_or(&0));
            i += 1;
            value
        }
    }

    // -------------------------------------------------------------------
    // CompletionLog
    // -------------------------------------------------------------------

    #[test]
    fn record_is_idempotent() {
        let log = CompletionLog::new();
        let id = BatchId("abc".to_string());

        assert!(log.record(&id, 0));
        assert!(!log.record(&id, 0));
        assert_eq!(log.completed_count(&id), 1);
    }

    #[test]
    fn counts_are_per_job() {
        let log = CompletionLog::new();
        let a = BatchId("a".to_string());
        let b = BatchId("b".to_string());

        log.record(&a, 0);
        log.record(&a, 1);
        log.record(&b, 0);

        assert_eq!(log.completed_count(&a), 2);
        assert_eq!(log.completed_count(&b), 1);
        assert_eq!(log.completed_count(&BatchId("c".to_string())), 0);
    }

    #[test]
    fn completed_indices_are_sorted() {
        let log = CompletionLog::new();
        let id = BatchId("abc".to_string());
        log.record(&id, 4);
        log.record(&id, 0);
        log.record(&id, 2);

        assert_eq!(log.completed_indices(&id), vec![0, 2, 4]);
    }

    #[test]
    fn forget_clears_job_state() {
        let log = CompletionLog::new();
        let id = BatchId("abc".to_string());
        log.record(&id, 0);
        log.forget(&id);
        assert_eq!(log.completed_count(&id), 0);
    }

    #[test]
    fn concurrent_appends_are_all_recorded() {
        let log = CompletionLog::new();
        let id = BatchId("abc".to_string());
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let log = log.clone();
                let id = id.clone();
                std::thread::spawn(move || log.record(&id, i))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.completed_count(&id), 32);
    }

    // -------------------------------------------------------------------
    // await_settlement
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn settles_when_count_reaches_expected() {
        let result = await_settlement(
            feed(vec![0, 1, 3, 5]),
            5,
            &fast_poll_config(15),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Settlement::Settled);
    }

    #[tokio::test]
    async fn settles_within_k_polls() {
        // Poll is invoked once per iteration; counting invocations bounds
        // the polls taken to settle.
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_in_feed = std::sync::Arc::clone(&calls);
        let mut inner = feed(vec![0, 2, 4]);
        let poll = move || {
            calls_in_feed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            inner()
        };

        let result =
            await_settlement(poll, 4, &fast_poll_config(15), &CancellationToken::new()).await;

        assert_eq!(result, Settlement::Settled);
        assert!(calls.load(std::sync::atomic::Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn settles_immediately_when_already_complete() {
        let result = await_settlement(
            || 3,
            3,
            &fast_poll_config(15),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Settlement::Settled);
    }

    #[tokio::test]
    async fn times_out_after_exactly_stall_limit_unchanged_polls() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_in_feed = std::sync::Arc::clone(&calls);
        let poll = move || {
            calls_in_feed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            0
        };

        let result =
            await_settlement(poll, 4, &fast_poll_config(15), &CancellationToken::new()).await;

        assert_eq!(result, Settlement::TimedOut);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 15);
    }

    #[tokio::test]
    async fn stall_counter_resets_to_one_after_progress() {
        // Three unchanged polls (stalls = 3), then progress (stalls resets to
        // 1, not 0), then stalled forever. With stall_limit 5 the remaining
        // budget after the reset is 4 unchanged polls, not 5.
        let counts = vec![0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1];
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_in_feed = std::sync::Arc::clone(&calls);
        let mut inner = feed(counts);
        let poll = move || {
            calls_in_feed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            inner()
        };

        let result =
            await_settlement(poll, 4, &fast_poll_config(5), &CancellationToken::new()).await;

        assert_eq!(result, Settlement::TimedOut);
        // Three unchanged zeros (stalls 1..3), one progressing poll (reset to
        // 1), then four unchanged ones reach the limit of 5 on the 8th poll.
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn cancellation_ends_the_wait() {
        let cancel = CancellationToken::new();
        let config = PollConfig {
            initial_interval: Duration::from_secs(60),
            ..fast_poll_config(15)
        };
        cancel.cancel();

        let result = await_settlement(|| 0, 4, &config, &cancel).await;
        assert_eq!(result, Settlement::TimedOut);
    }

    #[tokio::test]
    async fn max_wait_ceiling_fires_even_with_steady_progress() {
        // Advancing by one every poll never trips the stall rule; the
        // wall-clock ceiling is what ends the wait.
        let mut count = 0;
        let poll = move || {
            count += 1;
            count
        };
        let config = PollConfig {
            max_wait: Some(Duration::from_millis(10)),
            ..fast_poll_config(15)
        };

        let result = await_settlement(poll, usize::MAX, &config, &CancellationToken::new()).await;
        assert_eq!(result, Settlement::TimedOut);
    }
}
