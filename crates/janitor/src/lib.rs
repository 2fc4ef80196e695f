//! Background janitor for code-intelligence upload records.
//!
//! A janitor pass runs every sweep against the metadata store in a fixed order:
//! reap stuck uploads, purge uploads of deleted repositories, run the retention
//! scan, reclaim expired uploads, then hard-delete `deleted` uploads. Uploads
//! in `deleting` are left alone until the commit-graph updater reports their
//! repository as updated. A failing sweep is logged and counted; the remaining
//! sweeps still run.

use codeintel_core::config::JanitorConfig;
use codeintel_core::{ScanKind, UNKNOWN_COMMIT_DATE, UploadState};
use codeintel_metadata::models::{UploadListOptions, UploadRow};
use codeintel_metadata::{MetadataResult, MetadataStore};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;

/// Counters for one janitor pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JanitorStats {
    /// Uploads stuck in `uploading` moved to `deleted`.
    pub uploads_reaped: u64,
    /// Uploads of deleted repositories moved to `deleted`.
    pub uploads_purged: u64,
    /// Repositories visited by the retention scan.
    pub repositories_scanned: u64,
    /// Uploads newly flagged as expired.
    pub uploads_expired: u64,
    /// Expired, unreferenced uploads moved to `deleting`.
    pub uploads_reclaimed: u64,
    /// `deleted` uploads removed from the store.
    pub uploads_hard_deleted: u64,
    /// Sweeps or repositories that failed.
    pub errors: u64,
}

/// Drives the background sweeps against a metadata store.
pub struct Janitor {
    metadata: Arc<dyn MetadataStore>,
    config: JanitorConfig,
}

impl Janitor {
    pub fn new(metadata: Arc<dyn MetadataStore>, config: JanitorConfig) -> Self {
        Self { metadata, config }
    }

    pub fn config(&self) -> &JanitorConfig {
        &self.config
    }

    /// Run every sweep once as of `now`.
    pub async fn run_once(&self, now: OffsetDateTime) -> JanitorStats {
        let mut stats = JanitorStats::default();

        match self
            .metadata
            .reap_stuck_uploads(now - self.config.upload_timeout())
            .await
        {
            Ok(count) => stats.uploads_reaped = count,
            Err(e) => {
                tracing::warn!(error = %e, transient = e.is_transient(), "Failed to reap stuck uploads");
                stats.errors += 1;
            }
        }

        match self
            .metadata
            .purge_deleted_repository_uploads(self.config.deleted_repository_grace_period(), now)
            .await
        {
            Ok(counts) => stats.uploads_purged = counts.values().sum(),
            Err(e) => {
                tracing::warn!(error = %e, transient = e.is_transient(), "Failed to purge uploads of deleted repositories");
                stats.errors += 1;
            }
        }

        self.retention_scan(now, &mut stats).await;

        match self.metadata.reclaim_expired().await {
            Ok(counts) => stats.uploads_reclaimed = counts.values().sum(),
            Err(e) => {
                tracing::warn!(error = %e, transient = e.is_transient(), "Failed to reclaim expired uploads");
                stats.errors += 1;
            }
        }

        match self.hard_delete().await {
            Ok(count) => stats.uploads_hard_deleted = count,
            Err(e) => {
                tracing::warn!(error = %e, transient = e.is_transient(), "Failed to hard-delete uploads");
                stats.errors += 1;
            }
        }

        if stats.errors > 0 {
            tracing::warn!(errors = stats.errors, "Janitor pass completed with errors");
        } else {
            tracing::info!(
                reaped = stats.uploads_reaped,
                purged = stats.uploads_purged,
                scanned = stats.repositories_scanned,
                expired = stats.uploads_expired,
                reclaimed = stats.uploads_reclaimed,
                hard_deleted = stats.uploads_hard_deleted,
                "Janitor pass completed"
            );
        }
        stats
    }

    async fn retention_scan(&self, now: OffsetDateTime, stats: &mut JanitorStats) {
        let repositories = match self
            .metadata
            .select_for_scan(
                ScanKind::RetentionScan,
                self.config.retention_process_delay(),
                self.config.retention_batch_size,
                now,
            )
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to select repositories for retention scan");
                stats.errors += 1;
                return;
            }
        };

        for repository_id in repositories {
            stats.repositories_scanned += 1;
            match self.apply_retention(repository_id, now).await {
                Ok(expired) => stats.uploads_expired += expired,
                Err(e) => {
                    tracing::warn!(
                        repository_id,
                        error = %e,
                        "Failed to apply retention policy"
                    );
                    stats.errors += 1;
                }
            }
        }
    }

    /// Expire old completed uploads of one repository and stamp the rest.
    async fn apply_retention(&self, repository_id: i64, now: OffsetDateTime) -> MetadataResult<u64> {
        let page = self
            .metadata
            .list_uploads(&UploadListOptions {
                repository_id: Some(repository_id),
                state: Some(UploadState::Completed.into()),
                last_retention_scan_before: Some(now - self.config.retention_process_delay()),
                ..Default::default()
            })
            .await?;

        let cutoff = now - self.config.max_upload_age();
        let (expired, protected): (Vec<&UploadRow>, Vec<&UploadRow>) = page
            .uploads
            .iter()
            .partition(|upload| !upload.visible_at_tip && upload_age_reference(upload) < cutoff);
        let expired: Vec<i64> = expired.iter().map(|u| u.id).collect();
        let protected: Vec<i64> = protected.iter().map(|u| u.id).collect();

        self.metadata.mark_expired(&protected, &expired, now).await?;

        tracing::debug!(
            repository_id,
            expired = expired.len(),
            protected = protected.len(),
            "Retention policy applied"
        );
        Ok(expired.len() as u64)
    }

    async fn hard_delete(&self) -> MetadataResult<u64> {
        let ids = self
            .metadata
            .get_soft_deleted_upload_ids(self.config.hard_delete_batch_size)
            .await?;
        if ids.is_empty() {
            return Ok(0);
        }
        self.metadata.hard_delete_uploads(&ids).await
    }
}

/// Timestamp an upload's age is measured from: its commit date when known,
/// otherwise when it was uploaded.
fn upload_age_reference(upload: &UploadRow) -> OffsetDateTime {
    match upload.committed_at {
        Some(committed_at) if committed_at != UNKNOWN_COMMIT_DATE => committed_at,
        _ => upload.uploaded_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeintel_core::config::ReferenceCountConfig;
    use codeintel_core::{PackageCoordinate, ReferenceCountMode};
    use codeintel_metadata::SqliteStore;
    use codeintel_metadata::models::NewUpload;
    use time::Duration;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

    async fn test_store(dir: &tempfile::TempDir) -> Arc<dyn MetadataStore> {
        let store = SqliteStore::new(dir.path().join("janitor.db"), None)
            .await
            .expect("open store")
            .with_reference_counts(ReferenceCountConfig::default());
        Arc::new(store)
    }

    fn upload(repository_id: i64, commit: &str, uploaded_at: OffsetDateTime) -> NewUpload {
        NewUpload {
            repository_id,
            commit_hash: commit.to_string(),
            root: String::new(),
            indexer: "scip-go".to_string(),
            num_parts: 1,
            associated_index_id: None,
            committed_at: None,
            uploaded_at,
        }
    }

    async fn complete(
        store: &dyn MetadataStore,
        new: NewUpload,
        provides: &[PackageCoordinate],
        references: &[PackageCoordinate],
    ) -> i64 {
        let id = store.insert_upload(&new).await.unwrap();
        store.mark_queued(id, None).await.unwrap();
        let claimed = store.dequeue_upload(NOW).await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        store.update_packages(id, provides).await.unwrap();
        store.update_package_references(id, references).await.unwrap();
        store.mark_completed(id, NOW).await.unwrap();
        id
    }

    async fn stored_state(store: &dyn MetadataStore, id: i64) -> Option<String> {
        let page = store
            .list_uploads(&UploadListOptions {
                allow_expired: true,
                ..Default::default()
            })
            .await
            .unwrap();
        page.uploads.into_iter().find(|u| u.id == id).map(|u| u.state)
    }

    fn config() -> JanitorConfig {
        JanitorConfig {
            max_upload_age_secs: 7 * 86400,
            ..JanitorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_empty_store_pass() {
        let dir = tempfile::tempdir().unwrap();
        let janitor = Janitor::new(test_store(&dir).await, config());
        assert_eq!(janitor.run_once(NOW).await, JanitorStats::default());
    }

    #[tokio::test]
    async fn test_pass_reaps_and_hard_deletes_stuck_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store.upsert_repository(1, "repo").await.unwrap();
        let stuck = store
            .insert_upload(&upload(1, "stuck", NOW - Duration::days(2)))
            .await
            .unwrap();

        let janitor = Janitor::new(store.clone(), config());
        let stats = janitor.run_once(NOW).await;
        assert_eq!(stats.uploads_reaped, 1);
        assert_eq!(stats.uploads_hard_deleted, 1);
        assert_eq!(stats.errors, 0);
        assert!(store.get_soft_deleted_upload_ids(10).await.unwrap().is_empty());
        assert!(store.get_upload(stuck).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retention_expires_and_reclaims_old_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store.upsert_repository(1, "repo").await.unwrap();
        store.upsert_repository(2, "consumer").await.unwrap();

        let lib = PackageCoordinate::new("go", "example.com/lib", "v1.2.0").unwrap();
        let old = NOW - Duration::days(30);
        let stale = complete(store.as_ref(), upload(1, "stale", old), &[], &[]).await;
        let provider = complete(store.as_ref(), upload(1, "lib", old), &[lib.clone()], &[]).await;
        let tip = complete(store.as_ref(), upload(1, "tip", old), &[], &[]).await;
        let recent = complete(store.as_ref(), upload(1, "recent", NOW), &[], &[]).await;
        let consumer =
            complete(store.as_ref(), upload(2, "app", NOW), &[], &[lib.clone()]).await;
        store
            .update_reference_counts(&[consumer], ReferenceCountMode::Add)
            .await
            .unwrap();

        store.set_uploads_visible_at_tip(1, &[tip]).await.unwrap();
        store.set_repository_as_updated(1, 0, NOW).await.unwrap();

        let janitor = Janitor::new(store.clone(), config());
        let stats = janitor.run_once(NOW).await;
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.repositories_scanned, 1);
        assert_eq!(stats.uploads_expired, 2);
        assert_eq!(stats.uploads_reclaimed, 1);
        assert_eq!(stats.uploads_hard_deleted, 0);

        // Reclaimed uploads wait for the commit graph to catch up.
        assert_eq!(
            stored_state(store.as_ref(), stale).await.as_deref(),
            Some("deleting")
        );
        // Expired but still referenced by the consumer.
        assert_eq!(
            stored_state(store.as_ref(), provider).await.as_deref(),
            Some("completed")
        );
        assert_eq!(
            stored_state(store.as_ref(), tip).await.as_deref(),
            Some("completed")
        );
        let recent = store.get_upload(recent).await.unwrap().unwrap();
        assert!(!recent.expired);
        assert_eq!(recent.last_retention_scan_at, Some(NOW));

        // Reclaiming marked the repository dirty once.
        assert_eq!(store.set_repository_as_updated(1, 1, NOW).await.unwrap(), 1);

        // The watermark throttles a second scan of the same repository.
        let stats = janitor.run_once(NOW + Duration::minutes(5)).await;
        assert_eq!(stats.repositories_scanned, 0);
        assert_eq!(stats.uploads_hard_deleted, 1);
        assert_eq!(stored_state(store.as_ref(), stale).await, None);
    }

    #[tokio::test]
    async fn test_referenced_deleting_upload_survives_pass() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store.upsert_repository(1, "lib").await.unwrap();
        store.upsert_repository(2, "app").await.unwrap();

        let lib = PackageCoordinate::new("go", "example.com/lib", "v1.2.0").unwrap();
        let provider = complete(store.as_ref(), upload(1, "lib", NOW), &[lib.clone()], &[]).await;
        let consumer = complete(store.as_ref(), upload(2, "app", NOW), &[], &[lib]).await;
        store
            .update_reference_counts(&[consumer], ReferenceCountMode::Add)
            .await
            .unwrap();
        assert!(store.delete_upload(provider).await.unwrap());

        let janitor = Janitor::new(store.clone(), config());
        let stats = janitor.run_once(NOW).await;
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.uploads_hard_deleted, 0);
        let deleting = store.get_upload(provider).await.unwrap().unwrap();
        assert_eq!(deleting.state, "deleting");
        assert_eq!(deleting.reference_count, 1);

        assert_eq!(store.set_repository_as_updated(1, 1, NOW).await.unwrap(), 1);
        let stats = janitor.run_once(NOW).await;
        assert_eq!(stats.uploads_hard_deleted, 1);
        assert_eq!(stored_state(store.as_ref(), provider).await, None);
        assert!(store.get_upload(consumer).await.unwrap().is_some());
    }

    #[test]
    fn test_age_reference_skips_unknown_commit_date() {
        let uploaded_at = datetime!(2024-05-01 00:00 UTC);
        let mut row = UploadRow {
            id: 1,
            repository_id: 1,
            repository_name: "repo".to_string(),
            commit_hash: "abc".to_string(),
            root: String::new(),
            indexer: "scip-go".to_string(),
            state: "completed".to_string(),
            num_parts: 1,
            uploaded_parts: Default::default(),
            upload_size: None,
            failure_message: None,
            num_resets: 0,
            num_failures: 0,
            reference_count: 0,
            expired: false,
            committed_at: Some(UNKNOWN_COMMIT_DATE),
            uploaded_at,
            started_at: None,
            finished_at: None,
            process_after: None,
            last_retention_scan_at: None,
            associated_index_id: None,
            visible_at_tip: false,
            place_in_queue: None,
        };
        assert_eq!(upload_age_reference(&row), uploaded_at);

        let committed = datetime!(2024-01-01 00:00 UTC);
        row.committed_at = Some(committed);
        assert_eq!(upload_age_reference(&row), committed);
    }
}
