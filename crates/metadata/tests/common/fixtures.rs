//! Test fixtures for building upload records.

use codeintel_core::PackageCoordinate;
use codeintel_metadata::MetadataStore;
use codeintel_metadata::models::NewUpload;
use time::OffsetDateTime;
use time::macros::datetime;

/// Fixed clock used by tests that compare timestamps.
#[allow(dead_code)]
pub const NOW: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

/// Build a single-part upload for `repository_id`.
#[allow(dead_code)]
pub fn new_upload(repository_id: i64, commit: &str) -> NewUpload {
    NewUpload {
        repository_id,
        commit_hash: commit.to_string(),
        root: String::new(),
        indexer: "scip-typescript".to_string(),
        num_parts: 1,
        associated_index_id: None,
        committed_at: None,
        uploaded_at: NOW,
    }
}

/// `npm` coordinate at version 1.0.0.
#[allow(dead_code)]
pub fn pkg(name: &str) -> PackageCoordinate {
    PackageCoordinate::new("npm", name, "1.0.0").expect("valid coordinate")
}

/// Insert an upload and walk it through to `completed`.
#[allow(dead_code)]
pub async fn completed_upload(
    store: &dyn MetadataStore,
    repository_id: i64,
    commit: &str,
    committed_at: Option<OffsetDateTime>,
    provides: &[PackageCoordinate],
    references: &[PackageCoordinate],
) -> i64 {
    let mut upload = new_upload(repository_id, commit);
    upload.committed_at = committed_at;
    let id = store.insert_upload(&upload).await.expect("insert upload");
    store.add_upload_part(id, 0).await.expect("add part");
    store.mark_queued(id, Some(1024)).await.expect("mark queued");
    let dequeued = store
        .dequeue_upload(NOW)
        .await
        .expect("dequeue")
        .expect("queued upload");
    assert_eq!(dequeued.id, id, "fixtures complete one upload at a time");
    store.update_packages(id, provides).await.expect("packages");
    store
        .update_package_references(id, references)
        .await
        .expect("references");
    store.mark_completed(id, NOW).await.expect("mark completed");
    id
}

/// Current reference count of an upload, including soft-deleted ones.
#[allow(dead_code)]
pub async fn reference_count(pool: &sqlx::Pool<sqlx::Sqlite>, upload_id: i64) -> i64 {
    sqlx::query_scalar("SELECT reference_count FROM uploads WHERE id = ?")
        .bind(upload_id)
        .fetch_one(pool)
        .await
        .expect("reference count")
}

/// Raw stored state, including `deleted` uploads hidden from normal reads.
#[allow(dead_code)]
pub async fn raw_state(pool: &sqlx::Pool<sqlx::Sqlite>, upload_id: i64) -> Option<String> {
    sqlx::query_scalar("SELECT state FROM uploads WHERE id = ?")
        .bind(upload_id)
        .fetch_optional(pool)
        .await
        .expect("state")
}

/// Report the commit graph of `repository_id` as recomputed up to its latest
/// dirty token, settling its `deleting` uploads. Returns how many moved.
#[allow(dead_code)]
pub async fn settle_repository(store: &dyn MetadataStore, repository_id: i64) -> u64 {
    let dirty_token = store
        .get_dirty_repositories()
        .await
        .expect("dirty repositories")
        .into_iter()
        .find(|row| row.repository_id == repository_id)
        .map_or(0, |row| row.dirty_token);
    store
        .set_repository_as_updated(repository_id, dirty_token, NOW)
        .await
        .expect("set repository as updated")
}
