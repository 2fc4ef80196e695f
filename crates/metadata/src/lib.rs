//! Metadata store abstraction and implementation for code-intelligence uploads.
//!
//! This crate provides the durable side of the upload lifecycle:
//! - Upload records and their state machine
//! - Package coordinates and the dependency graph between uploads
//! - Reference counts maintained by the reference-count engine
//! - Retention sweeps and per-repository scan watermarks

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use codeintel_core::config::{MetadataConfig, ReferenceCountConfig};
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(
    config: &MetadataConfig,
    reference_counts: ReferenceCountConfig,
) -> MetadataResult<Arc<dyn MetadataStore>> {
    config.validate().map_err(MetadataError::Config)?;
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs)
                .await?
                .with_reference_counts(reference_counts);
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
