//! Source repository and commit-graph bookkeeping.

use crate::error::MetadataResult;
use crate::models::{DirtyRepositoryRow, RepositoryRow};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for tracked source repositories.
#[async_trait]
pub trait RepositoryRepo: Send + Sync {
    /// Create or rename a repository.
    async fn upsert_repository(&self, repository_id: i64, name: &str) -> MetadataResult<()>;

    async fn get_repository(&self, repository_id: i64) -> MetadataResult<Option<RepositoryRow>>;

    /// Soft-delete a repository. Returns false when absent or already deleted.
    async fn delete_repository(
        &self,
        repository_id: i64,
        deleted_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Request a commit-graph recompute for a repository.
    async fn mark_repository_as_dirty(&self, repository_id: i64) -> MetadataResult<()>;

    /// Repositories with a pending commit-graph recompute.
    async fn get_dirty_repositories(&self) -> MetadataResult<Vec<DirtyRepositoryRow>>;

    /// Record that the commit graph was recomputed up to `dirty_token`.
    ///
    /// Once the marker has caught up with every pending recompute, the
    /// repository's `deleting` uploads move to `deleted` and become eligible
    /// for hard deletion. Returns how many uploads moved.
    async fn set_repository_as_updated(
        &self,
        repository_id: i64,
        dirty_token: i64,
        now: OffsetDateTime,
    ) -> MetadataResult<u64>;

    /// Replace the set of uploads visible from the default-branch tip.
    async fn set_uploads_visible_at_tip(
        &self,
        repository_id: i64,
        upload_ids: &[i64],
    ) -> MetadataResult<()>;
}
