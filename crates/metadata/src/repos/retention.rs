//! Retention repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime};

/// Upload counts keyed by repository id.
pub type RepositoryCounts = BTreeMap<i64, u64>;

/// Repository for data retention sweeps.
#[async_trait]
pub trait RetentionRepo: Send + Sync {
    /// Stamp `last_retention_scan_at` on `protected_ids` and set `expired` on `expired_ids`.
    async fn mark_expired(
        &self,
        protected_ids: &[i64],
        expired_ids: &[i64],
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Move completed, expired, unreferenced uploads to `deleting`.
    ///
    /// Touched repositories are marked dirty and returned with their counts.
    async fn reclaim_expired(&self) -> MetadataResult<RepositoryCounts>;

    /// Soft-delete uploads of repositories deleted at least `grace_period` before `now`.
    async fn purge_deleted_repository_uploads(
        &self,
        grace_period: Duration,
        now: OffsetDateTime,
    ) -> MetadataResult<RepositoryCounts>;
}
