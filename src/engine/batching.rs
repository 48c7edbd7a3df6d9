//! Track-list batching
//!
//! Splits an ordered track list into consecutive fixed-size batches for the
//! worker pool. Deterministic: the same input always yields the same batches,
//! and concatenating all batches reproduces the input exactly.

use crate::error::{Error, Result};
use crate::types::{Batch, TrackRequest};

/// Split `tracks` into consecutive batches of `batch_size`.
///
/// The final batch holds the remainder when the list does not divide evenly;
/// it is neither merged into the previous batch nor dropped. A list shorter
/// than `batch_size` yields a single batch.
///
/// # Errors
///
/// [`Error::InvalidArgument`] when `batch_size` is zero. Fails before any
/// work is scheduled.
pub fn split_into_batches(tracks: Vec<TrackRequest>, batch_size: usize) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        return Err(Error::InvalidArgument(
            "batch_size must be at least 1".to_string(),
        ));
    }

    Ok(tracks
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            tracks: chunk.to_vec(),
        })
        .collect())
}
