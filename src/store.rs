//! Job directory bookkeeping capability
//!
//! Whether equivalent work was already done, and where it landed, is the
//! surrounding system's knowledge (typically a database with an expiry
//! sweeper). The engine consults it through [`JobStore`] and never assumes
//! check-then-create is atomic: a harmless duplicate directory is tolerated,
//! and record deletion is entirely the store owner's business.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::JobMetadata;

/// Persistence capability for job directories, implemented by the caller.
///
/// `identity_key` is caller-supplied (e.g., a stable external id for the
/// source playlist or album, or [`identity_key_for`](crate::utils::identity_key_for)
/// over the track list).
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Was a job for this identity already materialized?
    async fn exists_already(&self, identity_key: &str) -> Result<bool>;

    /// Record a freshly created job directory together with its metadata and
    /// the instant after which the store owner may collect it.
    async fn record_job_directory(
        &self,
        path: &Path,
        metadata: &JobMetadata,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Directory of a previously recorded job, if one exists.
    async fn lookup_job_directory(&self, identity_key: &str) -> Result<Option<PathBuf>>;
}

/// One recorded job directory inside [`MemoryJobStore`].
#[derive(Debug, Clone)]
struct JobRecord {
    path: PathBuf,
    expires_at: DateTime<Utc>,
}

/// In-memory [`JobStore`] for tests and single-process embedders.
///
/// Lookup honors `expires_at`: an expired record behaves as absent, matching
/// what a database-backed store with an expiry sweeper would return.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    records: Arc<tokio::sync::RwLock<HashMap<String, JobRecord>>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryJobStore {
    async fn exists_already(&self, identity_key: &str) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records
            .get(identity_key)
            .is_some_and(|r| r.expires_at > Utc::now()))
    }

    async fn record_job_directory(
        &self,
        path: &Path,
        metadata: &JobMetadata,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(
            metadata.identity_key.clone(),
            JobRecord {
                path: path.to_path_buf(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn lookup_job_directory(&self, identity_key: &str) -> Result<Option<PathBuf>> {
        let records = self.records.read().await;
        Ok(records
            .get(identity_key)
            .filter(|r| r.expires_at > Utc::now())
            .map(|r| r.path.clone()))
    }
}
