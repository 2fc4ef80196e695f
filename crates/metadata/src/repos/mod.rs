//! Repository traits for metadata operations.

pub mod dependencies;
pub mod reference_counts;
pub mod repositories;
pub mod retention;
pub mod scans;
pub mod uploads;

pub use dependencies::DependencyRepo;
pub use reference_counts::ReferenceCountRepo;
pub use repositories::RepositoryRepo;
pub use retention::{RepositoryCounts, RetentionRepo};
pub use scans::ScanRepo;
pub use uploads::UploadRepo;
