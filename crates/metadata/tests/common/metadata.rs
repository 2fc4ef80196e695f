//! Metadata store test utilities.

use codeintel_core::config::ReferenceCountConfig;
use codeintel_metadata::{MetadataResult, MetadataStore, SqliteStore};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A test metadata store wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    pub(crate) sqlite_store: Arc<SqliteStore>,
    db_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestMetadata {
    /// Create a new test metadata store on a temporary SQLite file.
    pub async fn new() -> MetadataResult<Self> {
        Self::with_reference_counts(ReferenceCountConfig::default()).await
    }

    /// Create a store with explicit reference-count engine settings.
    #[allow(dead_code)]
    pub async fn with_reference_counts(config: ReferenceCountConfig) -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let store = SqliteStore::new(&db_path, None)
            .await?
            .with_reference_counts(config);
        let arc_store = Arc::new(store);

        Ok(Self {
            store: arc_store.clone(),
            sqlite_store: arc_store,
            db_path,
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the metadata store.
    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    /// Open another store on the same database file, as a second process would.
    #[allow(dead_code)]
    pub async fn open_another(&self) -> MetadataResult<Arc<dyn MetadataStore>> {
        let store = SqliteStore::new(&self.db_path, Some(30)).await?;
        Ok(Arc::new(store))
    }

    /// Get a reference to the SQLite connection pool for raw queries.
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        self.sqlite_store.pool()
    }
}
