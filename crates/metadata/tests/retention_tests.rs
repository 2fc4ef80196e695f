//! Integration tests for the retention sweeper.

mod common;

use codeintel_core::ReferenceCountMode;
use codeintel_core::config::ReferenceCountConfig;
use codeintel_metadata::models::UploadListOptions;
use common::{NOW, TestMetadata, completed_upload, new_upload, pkg, raw_state};
use time::Duration;

#[tokio::test]
async fn test_mark_expired_stamps_and_flags() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let store = metadata.store();
    store.upsert_repository(1, "repo").await.unwrap();

    let protected = completed_upload(store.as_ref(), 1, "keep", Some(NOW), &[], &[]).await;
    let expired = completed_upload(store.as_ref(), 1, "drop", Some(NOW), &[], &[]).await;

    store
        .mark_expired(&[protected], &[expired], NOW)
        .await
        .expect("Mark expired failed");

    let page = store
        .list_uploads(&UploadListOptions {
            allow_expired: true,
            oldest_first: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.uploads.len(), 2);
    let kept = &page.uploads[0];
    assert_eq!(kept.id, protected);
    assert_eq!(kept.last_retention_scan_at, Some(NOW));
    assert!(!kept.expired);
    let gone = &page.uploads[1];
    assert!(gone.expired);
    assert_eq!(gone.last_retention_scan_at, None);

    // Both lists empty is a valid no-op.
    store.mark_expired(&[], &[], NOW).await.unwrap();
}

#[tokio::test]
async fn test_last_retention_scan_before_filter() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();
    store.upsert_repository(1, "repo").await.unwrap();

    let scanned = completed_upload(store.as_ref(), 1, "a", Some(NOW), &[], &[]).await;
    let stale = completed_upload(store.as_ref(), 1, "b", Some(NOW), &[], &[]).await;
    let never = completed_upload(store.as_ref(), 1, "c", Some(NOW), &[], &[]).await;
    store
        .mark_expired(&[stale], &[], NOW - Duration::days(3))
        .await
        .unwrap();
    store.mark_expired(&[scanned], &[], NOW).await.unwrap();

    let page = store
        .list_uploads(&UploadListOptions {
            last_retention_scan_before: Some(NOW - Duration::days(1)),
            oldest_first: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let ids: Vec<i64> = page.uploads.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![stale, never]);
}

#[tokio::test]
async fn test_reclaim_spares_referenced_uploads() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();
    store.upsert_repository(1, "repo-a").await.unwrap();
    store.upsert_repository(2, "repo-b").await.unwrap();

    let referenced = completed_upload(store.as_ref(), 1, "lib", Some(NOW), &[pkg("lib")], &[]).await;
    let unreferenced = completed_upload(store.as_ref(), 1, "old", Some(NOW), &[], &[]).await;
    let consumer = completed_upload(store.as_ref(), 2, "app", Some(NOW), &[], &[pkg("lib")]).await;
    store
        .update_reference_counts(&[consumer], ReferenceCountMode::Add)
        .await
        .unwrap();

    store
        .mark_expired(&[consumer], &[referenced, unreferenced], NOW)
        .await
        .unwrap();

    let counts = store.reclaim_expired().await.expect("Reclaim failed");
    assert_eq!(counts.get(&1), Some(&1));
    assert_eq!(counts.len(), 1);

    assert_eq!(raw_state(metadata.pool(), unreferenced).await.as_deref(), Some("deleting"));
    assert_eq!(raw_state(metadata.pool(), referenced).await.as_deref(), Some("completed"));
    assert_eq!(raw_state(metadata.pool(), consumer).await.as_deref(), Some("completed"));

    let dirty = store.get_dirty_repositories().await.unwrap();
    assert_eq!(dirty.len(), 1);
    assert_eq!(dirty[0].repository_id, 1);

    // Second pass finds nothing new.
    assert!(store.reclaim_expired().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reclaim_is_disabled_with_reference_counts() {
    let metadata = TestMetadata::with_reference_counts(ReferenceCountConfig { disabled: true })
        .await
        .unwrap();
    let store = metadata.store();
    store.upsert_repository(1, "repo").await.unwrap();

    let expired = completed_upload(store.as_ref(), 1, "old", Some(NOW), &[], &[]).await;
    store.mark_expired(&[], &[expired], NOW).await.unwrap();

    assert!(store.reclaim_expired().await.unwrap().is_empty());
    assert_eq!(raw_state(metadata.pool(), expired).await.as_deref(), Some("completed"));
}

#[tokio::test]
async fn test_purge_waits_for_grace_period() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();
    store.upsert_repository(1, "gone").await.unwrap();
    store.upsert_repository(2, "alive").await.unwrap();

    let completed = completed_upload(store.as_ref(), 1, "c1", Some(NOW), &[], &[]).await;
    let uploading = store.insert_upload(&new_upload(1, "c2")).await.unwrap();
    let other = completed_upload(store.as_ref(), 2, "c3", Some(NOW), &[], &[]).await;

    assert!(
        store
            .delete_repository(1, NOW - Duration::minutes(10))
            .await
            .unwrap()
    );
    assert!(!store.delete_repository(1, NOW).await.unwrap());

    let grace = Duration::minutes(30);
    assert!(
        store
            .purge_deleted_repository_uploads(grace, NOW)
            .await
            .unwrap()
            .is_empty()
    );

    let later = NOW + Duration::minutes(25);
    let counts = store
        .purge_deleted_repository_uploads(grace, later)
        .await
        .unwrap();
    assert_eq!(counts.get(&1), Some(&2));

    assert_eq!(raw_state(metadata.pool(), completed).await.as_deref(), Some("deleted"));
    assert_eq!(raw_state(metadata.pool(), uploading).await.as_deref(), Some("deleted"));
    assert_eq!(raw_state(metadata.pool(), other).await.as_deref(), Some("completed"));

    // Already-deleted uploads are not counted again.
    assert!(
        store
            .purge_deleted_repository_uploads(grace, later)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        store
            .get_repository(1)
            .await
            .unwrap()
            .expect("repository row kept")
            .deleted_at
            .is_some()
    );
}
