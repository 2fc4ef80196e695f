//! Upload record repository.

use crate::error::MetadataResult;
use crate::models::{NewUpload, UploadListOptions, UploadPage, UploadRow};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for the upload record lifecycle.
///
/// Every transition is guarded by the state machine in
/// [`codeintel_core::UploadState`]: an update applies only when the stored
/// state is a legal source, otherwise `InvalidStateTransition` is returned and
/// nothing changes.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Insert a new upload in the `uploading` state and return its id.
    async fn insert_upload(&self, upload: &NewUpload) -> MetadataResult<i64>;

    /// Record receipt of one part. Idempotent for repeated indices.
    async fn add_upload_part(&self, upload_id: i64, part_index: i64) -> MetadataResult<()>;

    /// `uploading -> queued`, recording the final payload size.
    async fn mark_queued(&self, upload_id: i64, upload_size: Option<i64>) -> MetadataResult<()>;

    /// Claim the next queued upload for processing.
    ///
    /// Uploads whose `process_after` lies in the future are skipped.
    async fn dequeue_upload(&self, now: OffsetDateTime) -> MetadataResult<Option<UploadRow>>;

    /// `processing -> completed`.
    async fn mark_completed(&self, upload_id: i64, finished_at: OffsetDateTime)
    -> MetadataResult<()>;

    /// `processing -> errored`.
    async fn mark_errored(
        &self,
        upload_id: i64,
        reason: &str,
        finished_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Move a live upload to `failed` and bump its failure counter.
    ///
    /// A later re-queue is left to an external retry policy.
    async fn mark_failed(
        &self,
        upload_id: i64,
        reason: &str,
        finished_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Get a non-deleted upload by id.
    async fn get_upload(&self, upload_id: i64) -> MetadataResult<Option<UploadRow>>;

    /// Get the non-deleted uploads among `upload_ids`, ordered by id.
    async fn get_uploads_by_ids(&self, upload_ids: &[i64]) -> MetadataResult<Vec<UploadRow>>;

    /// List uploads matching `options`, with the total count under the same predicate.
    async fn list_uploads(&self, options: &UploadListOptions) -> MetadataResult<UploadPage>;

    /// Soft delete: `completed -> deleting`, anything else live `-> deleted`.
    ///
    /// Marks the owning repository dirty. Returns false when the upload is
    /// absent or already deleted.
    async fn delete_upload(&self, upload_id: i64) -> MetadataResult<bool>;

    /// Remove `deleted` upload rows for good. Other ids are skipped.
    ///
    /// Reference counts are updated as if the uploads were removed from the
    /// dependency graph, in the same transaction as the delete.
    async fn hard_delete_uploads(&self, upload_ids: &[i64]) -> MetadataResult<u64>;

    /// Ids of `deleted` uploads awaiting hard deletion, oldest first.
    async fn get_soft_deleted_upload_ids(&self, limit: u32) -> MetadataResult<Vec<i64>>;

    /// Soft-delete uploads still `uploading` that were created before `uploaded_before`.
    async fn reap_stuck_uploads(&self, uploaded_before: OffsetDateTime) -> MetadataResult<u64>;

    /// Oldest known commit date among completed uploads of a repository.
    async fn get_oldest_commit_date(
        &self,
        repository_id: i64,
    ) -> MetadataResult<Option<OffsetDateTime>>;

    /// Set the commit date once the commit has been resolved.
    async fn update_committed_at(
        &self,
        upload_id: i64,
        committed_at: OffsetDateTime,
    ) -> MetadataResult<()>;
}
