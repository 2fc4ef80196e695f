//! Scan scheduling repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use codeintel_core::ScanKind;
use time::{Duration, OffsetDateTime};

/// Repository for per-repository scan watermarks.
#[async_trait]
pub trait ScanRepo: Send + Sync {
    /// Select up to `limit` repositories due for `kind` and advance their watermark to `now`.
    ///
    /// A repository is due when it was never scanned or was last scanned more
    /// than `min_interval` before `now`. Never-scanned repositories come first,
    /// then the stalest, with repository id as tie-break.
    async fn select_for_scan(
        &self,
        kind: ScanKind,
        min_interval: Duration,
        limit: u32,
        now: OffsetDateTime,
    ) -> MetadataResult<Vec<i64>>;

    async fn get_scan_watermark(
        &self,
        repository_id: i64,
        kind: ScanKind,
    ) -> MetadataResult<Option<OffsetDateTime>>;
}
