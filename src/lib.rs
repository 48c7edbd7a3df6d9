//! # playlist-dl
//!
//! Batch fan-out audio download engine, as a library.
//!
//! Given an ordered list of track names, playlist-dl splits it into
//! fixed-size batches, downloads each batch on a concurrent worker pool,
//! waits for completion with a bounded adaptive poll, records the tracks
//! that could not be resolved, and assembles a deterministic zip archive of
//! whatever landed on disk.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - no HTTP layer, no UI; embed it behind whatever
//!   transport you run
//! - **Capabilities injected** - "resolve a name to audio" and "remember
//!   which job directories exist" are traits the caller implements
//! - **Partial results are results** - unresolvable tracks become manifest
//!   entries, a stalled job still archives what completed
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use playlist_dl::{
//!     AudioSource, BatchDownloader, Config, MemoryJobStore, ResolveError,
//!     TrackRequest, TrackResolver,
//! };
//!
//! struct MyResolver;
//!
//! #[async_trait::async_trait]
//! impl TrackResolver for MyResolver {
//!     async fn resolve(&self, name: &str) -> Result<AudioSource, ResolveError> {
//!         // Look the name up on your media backend of choice
//!         Err(ResolveError::NotFound(name.to_string()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = BatchDownloader::new(
//!         Config::default(),
//!         Arc::new(MyResolver),
//!         Arc::new(MemoryJobStore::new()),
//!     )?;
//!
//!     let tracks = TrackRequest::from_names(["Song A", "Song B"]);
//!     let output = engine.download_tracks(tracks, "sp_playlist__abc123").await?;
//!     println!(
//!         "{} bytes, {} unavailable",
//!         output.archive.len(),
//!         output.unavailable.len()
//!     );
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Deterministic archive assembly
pub mod archive;
/// Configuration types
pub mod config;
/// Core engine (decomposed into focused submodules)
pub mod engine;
/// Error types
pub mod error;
/// Track resolution capability
pub mod resolver;
/// Job directory bookkeeping capability
pub mod store;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use archive::assemble;
pub use config::{BatchConfig, Config, PollConfig};
pub use engine::{
    BatchDownloader, CompletionLog, MANIFEST_FILE_NAME, await_settlement, diff_unavailable,
    split_into_batches, write_unavailable_manifest,
};
pub use error::{Error, ResolveError, Result};
pub use resolver::{AudioSource, TrackResolver};
pub use store::{JobStore, MemoryJobStore};
pub use types::{
    Batch, BatchId, BatchJob, Event, JobMetadata, JobOutput, Settlement, TrackRequest,
};
