//! Reference-count repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use codeintel_core::ReferenceCountMode;

/// Repository applying the reference-count engine.
#[async_trait]
pub trait ReferenceCountRepo: Send + Sync {
    /// Recompute reference counts around `upload_ids`.
    ///
    /// All writes land in one transaction, in ascending upload id order.
    /// Returns the number of uploads written. When reference counting is
    /// disabled this is a logged no-op returning 0.
    async fn update_reference_counts(
        &self,
        upload_ids: &[i64],
        mode: ReferenceCountMode,
    ) -> MetadataResult<u64>;
}
