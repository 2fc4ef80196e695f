//! Database models mapping to the metadata schema.

use codeintel_core::{PackageCoordinate, StateFilter, UploadState};
use sqlx::FromRow;
use sqlx::types::Json;
use std::collections::BTreeSet;
use time::OffsetDateTime;

use crate::error::{MetadataError, MetadataResult};

// =============================================================================
// Repositories
// =============================================================================

/// A tracked source repository.
#[derive(Debug, Clone, FromRow)]
pub struct RepositoryRow {
    pub id: i64,
    pub name: String,
    pub deleted_at: Option<OffsetDateTime>,
}

/// Commit-graph recompute marker for a repository.
///
/// The graph is settled when `update_token` has caught up with `dirty_token`.
#[derive(Debug, Clone, FromRow)]
pub struct DirtyRepositoryRow {
    pub repository_id: i64,
    pub dirty_token: i64,
    pub update_token: i64,
    pub updated_at: Option<OffsetDateTime>,
}

// =============================================================================
// Uploads
// =============================================================================

/// Upload record as returned by every read.
#[derive(Debug, Clone, FromRow)]
pub struct UploadRow {
    pub id: i64,
    pub repository_id: i64,
    pub repository_name: String,
    pub commit_hash: String,
    pub root: String,
    pub indexer: String,
    pub state: String,
    pub num_parts: i64,
    pub uploaded_parts: Json<BTreeSet<i64>>,
    pub upload_size: Option<i64>,
    pub failure_message: Option<String>,
    pub num_resets: i64,
    pub num_failures: i64,
    pub reference_count: i64,
    pub expired: bool,
    pub committed_at: Option<OffsetDateTime>,
    pub uploaded_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub finished_at: Option<OffsetDateTime>,
    pub process_after: Option<OffsetDateTime>,
    pub last_retention_scan_at: Option<OffsetDateTime>,
    pub associated_index_id: Option<i64>,
    /// Reachable from the repository's default-branch tip.
    pub visible_at_tip: bool,
    /// 1-based position among queued uploads in dequeue order.
    pub place_in_queue: Option<i64>,
}

impl UploadRow {
    /// Parse the stored state.
    pub fn upload_state(&self) -> MetadataResult<UploadState> {
        UploadState::parse(&self.state)
            .map_err(|e| MetadataError::Internal(format!("upload {}: {e}", self.id)))
    }

    /// Part indices received so far, ascending.
    pub fn parts(&self) -> Vec<i64> {
        self.uploaded_parts.0.iter().copied().collect()
    }
}

/// Fields supplied by the ingest collaborator when an upload is created.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub repository_id: i64,
    pub commit_hash: String,
    pub root: String,
    pub indexer: String,
    pub num_parts: i64,
    pub associated_index_id: Option<i64>,
    pub committed_at: Option<OffsetDateTime>,
    pub uploaded_at: OffsetDateTime,
}

/// Filters and pagination for listing uploads.
#[derive(Debug, Clone, Default)]
pub struct UploadListOptions {
    pub repository_id: Option<i64>,
    /// Substring matched against commit, root, state, failure message,
    /// repository name and indexer.
    pub term: Option<String>,
    /// When unset, only `deleted` uploads are hidden.
    pub state: Option<StateFilter>,
    pub visible_at_tip: bool,
    /// Canonical providers of the packages this upload references.
    pub dependency_of: Option<i64>,
    /// Uploads referencing a package this upload canonically provides.
    pub dependent_of: Option<i64>,
    pub uploaded_before: Option<OffsetDateTime>,
    pub uploaded_after: Option<OffsetDateTime>,
    pub last_retention_scan_before: Option<OffsetDateTime>,
    pub allow_expired: bool,
    pub oldest_first: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl UploadListOptions {
    /// Reject filter combinations that can never match.
    pub fn validate(&self) -> MetadataResult<()> {
        if let (Some(after), Some(before)) = (self.uploaded_after, self.uploaded_before)
            && after >= before
        {
            return Err(MetadataError::Validation(format!(
                "uploaded_after ({after}) must be earlier than uploaded_before ({before})"
            )));
        }
        if self.limit == Some(0) {
            return Err(MetadataError::Validation(
                "limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One page of uploads plus the total matching the same predicate.
#[derive(Debug, Clone)]
pub struct UploadPage {
    pub uploads: Vec<UploadRow>,
    pub total_count: i64,
}

// =============================================================================
// Dependency graph
// =============================================================================

/// A package coordinate attached to an upload.
#[derive(Debug, Clone, FromRow)]
pub struct PackageRow {
    pub upload_id: i64,
    pub scheme: String,
    pub name: String,
    pub version: String,
}

impl PackageRow {
    pub fn coordinate(&self) -> PackageCoordinate {
        PackageCoordinate {
            scheme: self.scheme.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// A completed upload providing a coordinate, with its canonical rank.
#[derive(Debug, Clone, FromRow)]
pub struct RankedProviderRow {
    pub upload_id: i64,
    pub scheme: String,
    pub name: String,
    pub version: String,
    pub committed_at: Option<OffsetDateTime>,
    /// 1 for the canonical provider.
    pub rank: i64,
}

impl RankedProviderRow {
    pub fn is_canonical(&self) -> bool {
        self.rank == 1
    }

    pub fn coordinate(&self) -> PackageCoordinate {
        PackageCoordinate {
            scheme: self.scheme.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

// =============================================================================
// Scans
// =============================================================================

/// Last time a repository was selected for a scan kind.
#[derive(Debug, Clone, FromRow)]
pub struct ScanWatermarkRow {
    pub repository_id: i64,
    pub scan_kind: String,
    pub last_scanned_at: OffsetDateTime,
}
