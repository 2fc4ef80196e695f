//! Dependency graph repository.

use crate::error::MetadataResult;
use crate::models::{PackageRow, RankedProviderRow};
use async_trait::async_trait;
use codeintel_core::PackageCoordinate;

/// Repository for the package coordinates uploads provide and reference.
#[async_trait]
pub trait DependencyRepo: Send + Sync {
    /// Replace the coordinates an upload provides.
    async fn update_packages(
        &self,
        upload_id: i64,
        packages: &[PackageCoordinate],
    ) -> MetadataResult<()>;

    /// Replace the coordinates an upload depends on.
    async fn update_package_references(
        &self,
        upload_id: i64,
        references: &[PackageCoordinate],
    ) -> MetadataResult<()>;

    async fn get_packages(&self, upload_id: i64) -> MetadataResult<Vec<PackageRow>>;

    async fn get_package_references(&self, upload_id: i64) -> MetadataResult<Vec<PackageRow>>;

    /// Ranked providers of every coordinate `upload_id` references.
    ///
    /// Ordered by coordinate then rank; rank 1 is the canonical provider.
    async fn dependencies_of(&self, upload_id: i64) -> MetadataResult<Vec<RankedProviderRow>>;

    /// Uploads referencing a coordinate `upload_id` canonically provides.
    ///
    /// Empty when `upload_id` is not canonical for any coordinate.
    async fn dependents_of(&self, upload_id: i64) -> MetadataResult<Vec<PackageRow>>;
}
