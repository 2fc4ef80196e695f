//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{
    DependencyRepo, ReferenceCountRepo, RepositoryRepo, RetentionRepo, ScanRepo, UploadRepo,
};
use async_trait::async_trait;
use codeintel_core::config::ReferenceCountConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    UploadRepo
    + DependencyRepo
    + ReferenceCountRepo
    + RetentionRepo
    + ScanRepo
    + RepositoryRepo
    + Send
    + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
///
/// The pool holds a single connection, so transactions from one store run
/// serially. Read-then-write transactions open with `BEGIN IMMEDIATE` so that
/// several processes sharing the file queue on the write lock (bounded by the
/// busy timeout) instead of failing on a stale snapshot. Writes inside a
/// transaction are issued in ascending id order.
///
/// Timestamps are stored as UTC RFC 3339 text with nine subsecond digits, so
/// text order is time order.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    reference_counts: ReferenceCountConfig,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let busy_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(600));

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MetadataError::Config(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            reference_counts: ReferenceCountConfig::default(),
        };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "opened sqlite metadata store");
        Ok(store)
    }

    /// Apply reference-count engine settings.
    pub fn with_reference_counts(mut self, config: ReferenceCountConfig) -> Self {
        if config.disabled {
            tracing::warn!(
                "reference counting is disabled; counts will drift until it is re-enabled"
            );
        }
        self.reference_counts = config;
        self
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::RepositoryCounts;
    use codeintel_core::refcount::recomputed_uploads;
    use codeintel_core::{
        CountChange, PackageCoordinate, ProviderRow, ReferenceCountMode, ReferenceEdge,
        ReferenceGraph, ScanKind, UNKNOWN_COMMIT_DATE, UploadState, plan_reference_counts,
    };
    use sqlx::{FromRow, QueryBuilder, SqliteConnection, Transaction};
    use std::collections::BTreeSet;
    use time::macros::format_description;
    use time::{OffsetDateTime, UtcOffset};

    /// Columns of [`UploadRow`].
    const UPLOAD_COLUMNS: &str = r#"
        SELECT
            u.id, u.repository_id, r.name AS repository_name, u.commit_hash, u.root,
            u.indexer, u.state, u.num_parts,
            (SELECT json_group_array(p.part_index) FROM upload_parts p WHERE p.upload_id = u.id)
                AS uploaded_parts,
            u.upload_size, u.failure_message, u.num_resets, u.num_failures,
            u.reference_count, u.expired, u.committed_at, u.uploaded_at, u.started_at,
            u.finished_at, u.process_after, u.last_retention_scan_at, u.associated_index_id,
            EXISTS (
                SELECT 1 FROM uploads_visible_at_tip t
                WHERE t.upload_id = u.id AND t.repository_id = u.repository_id
            ) AS visible_at_tip,
            q.queue_rank AS place_in_queue
    "#;

    const UPLOAD_FROM: &str = r#"
        FROM uploads u
        JOIN repositories r ON r.id = u.repository_id
        LEFT JOIN (
            SELECT id, ROW_NUMBER() OVER (ORDER BY COALESCE(process_after, uploaded_at), id)
                AS queue_rank
            FROM uploads
            WHERE state = 'queued'
        ) q ON q.id = u.id
    "#;

    /// Completed providers ranked per coordinate; rank 1 is canonical.
    const RANKED_PROVIDERS: &str = r#"
        SELECT
            p.upload_id, p.scheme, p.name, p.version, u.committed_at,
            ROW_NUMBER() OVER (
                PARTITION BY p.scheme, p.name, p.version
                ORDER BY u.committed_at IS NULL, u.committed_at, u.id
            ) AS rank
        FROM packages p
        JOIN uploads u ON u.id = p.upload_id
        WHERE u.state = 'completed'
    "#;

    /// Encode ids for `json_each(?)`.
    fn id_list(ids: &[i64]) -> MetadataResult<String> {
        serde_json::to_string(ids).map_err(|e| MetadataError::Internal(e.to_string()))
    }

    fn sorted_ids(ids: &[i64]) -> Vec<i64> {
        let set: BTreeSet<i64> = ids.iter().copied().collect();
        set.into_iter().collect()
    }

    /// Encode a timestamp for storage or comparison.
    ///
    /// Every bound timestamp goes through here: fixed-width UTC text compares
    /// the same way the instants do, whatever offset the caller used.
    fn db_time(t: OffsetDateTime) -> MetadataResult<String> {
        t.to_offset(UtcOffset::UTC)
            .format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
            ))
            .map_err(|e| MetadataError::Internal(format!("cannot encode timestamp {t}: {e}")))
    }

    /// Escape `%`, `_` and the escape character itself for `LIKE ... ESCAPE '\'`.
    fn like_pattern(term: &str) -> String {
        let mut pattern = String::with_capacity(term.len() + 2);
        pattern.push('%');
        for c in term.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    }

    async fn mark_repository_dirty(
        conn: &mut SqliteConnection,
        repository_id: i64,
    ) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dirty_repositories (repository_id, dirty_token, update_token)
            VALUES (?, 1, 0)
            ON CONFLICT (repository_id) DO UPDATE SET dirty_token = dirty_token + 1
            "#,
        )
        .bind(repository_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    fn push_state_guard(qb: &mut QueryBuilder<'static, Sqlite>, upload_id: i64, to: UploadState) {
        qb.push(" WHERE id = ").push_bind(upload_id);
        qb.push(" AND state IN (");
        let mut states = qb.separated(", ");
        for state in to.sources() {
            states.push_bind(state.as_str());
        }
        states.push_unseparated(")");
    }

    fn upload_query(
        select: &str,
        options: &UploadListOptions,
    ) -> MetadataResult<QueryBuilder<'static, Sqlite>> {
        let mut qb = QueryBuilder::new("");
        if options.dependency_of.is_some() || options.dependent_of.is_some() {
            qb.push("WITH ranked AS (").push(RANKED_PROVIDERS).push(") ");
        }
        qb.push(select).push(UPLOAD_FROM);
        qb.push(" WHERE r.deleted_at IS NULL");

        if let Some(repository_id) = options.repository_id {
            qb.push(" AND u.repository_id = ").push_bind(repository_id);
        }
        if let Some(term) = options.term.as_deref().filter(|t| !t.is_empty()) {
            let pattern = like_pattern(term);
            qb.push(" AND (");
            let mut columns = qb.separated(" OR ");
            for column in [
                "u.commit_hash",
                "u.root",
                "u.state",
                "u.failure_message",
                "r.name",
                "u.indexer",
            ] {
                columns.push(format!("{column} LIKE "));
                columns.push_bind_unseparated(pattern.clone());
                columns.push_unseparated(" ESCAPE '\\'");
            }
            columns.push_unseparated(")");
        }
        match options.state {
            Some(filter) => {
                qb.push(" AND u.state IN (");
                let mut states = qb.separated(", ");
                for state in filter.states() {
                    states.push_bind(state.as_str());
                }
                states.push_unseparated(")");
            }
            None => {
                qb.push(" AND u.state != 'deleted'");
            }
        }
        if options.visible_at_tip {
            qb.push(
                " AND EXISTS (SELECT 1 FROM uploads_visible_at_tip t \
                 WHERE t.upload_id = u.id AND t.repository_id = u.repository_id)",
            );
        }
        if let Some(upload_id) = options.dependency_of {
            qb.push(
                " AND u.id IN (SELECT rk.upload_id FROM ranked rk \
                 JOIN package_references pr ON pr.scheme = rk.scheme \
                 AND pr.name = rk.name AND pr.version = rk.version \
                 WHERE rk.rank = 1 AND rk.upload_id != pr.upload_id AND pr.upload_id = ",
            )
            .push_bind(upload_id)
            .push(")");
        }
        if let Some(upload_id) = options.dependent_of {
            qb.push(
                " AND u.id IN (SELECT pr.upload_id FROM package_references pr \
                 JOIN ranked rk ON pr.scheme = rk.scheme \
                 AND pr.name = rk.name AND pr.version = rk.version \
                 WHERE rk.rank = 1 AND pr.upload_id != rk.upload_id AND rk.upload_id = ",
            )
            .push_bind(upload_id)
            .push(")");
        }
        if let Some(before) = options.uploaded_before {
            qb.push(" AND u.uploaded_at < ").push_bind(db_time(before)?);
        }
        if let Some(after) = options.uploaded_after {
            qb.push(" AND u.uploaded_at > ").push_bind(db_time(after)?);
        }
        if let Some(before) = options.last_retention_scan_before {
            qb.push(" AND (u.last_retention_scan_at IS NULL OR u.last_retention_scan_at < ")
                .push_bind(db_time(before)?)
                .push(")");
        }
        if !options.allow_expired {
            qb.push(" AND u.expired = 0");
        }
        Ok(qb)
    }

    impl SqliteStore {
        /// Open a transaction holding the write lock from its first statement.
        async fn begin_write(&self) -> MetadataResult<Transaction<'static, Sqlite>> {
            Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
        }

        /// Run a guarded state update and explain why it did not apply.
        async fn apply_transition(
            &self,
            mut qb: QueryBuilder<'static, Sqlite>,
            upload_id: i64,
            to: UploadState,
        ) -> MetadataResult<()> {
            push_state_guard(&mut qb, upload_id, to);
            let result = qb.build().execute(&self.pool).await?;
            if result.rows_affected() > 0 {
                tracing::debug!(upload_id, state = %to, "upload transitioned");
                return Ok(());
            }

            let current: Option<String> =
                sqlx::query_scalar("SELECT state FROM uploads WHERE id = ?")
                    .bind(upload_id)
                    .fetch_optional(&self.pool)
                    .await?;
            match current {
                None => Err(MetadataError::NotFound(format!("upload {upload_id}"))),
                Some(from) => Err(MetadataError::InvalidStateTransition {
                    from,
                    to: to.as_str().to_string(),
                }),
            }
        }

        async fn fetch_providers(
            conn: &mut SqliteConnection,
            coordinates: &BTreeSet<PackageCoordinate>,
        ) -> MetadataResult<Vec<ProviderRow>> {
            #[derive(FromRow)]
            struct ProviderRecord {
                upload_id: i64,
                committed_at: Option<OffsetDateTime>,
                scheme: String,
                name: String,
                version: String,
            }

            if coordinates.is_empty() {
                return Ok(Vec::new());
            }
            let encoded = serde_json::to_string(coordinates)
                .map_err(|e| MetadataError::Internal(e.to_string()))?;
            let rows = sqlx::query_as::<_, ProviderRecord>(
                r#"
                SELECT p.upload_id, u.committed_at, p.scheme, p.name, p.version
                FROM json_each(?) c
                JOIN packages p
                  ON p.scheme = json_extract(c.value, '$.scheme')
                 AND p.name = json_extract(c.value, '$.name')
                 AND p.version = json_extract(c.value, '$.version')
                JOIN uploads u ON u.id = p.upload_id
                WHERE u.state = 'completed'
                "#,
            )
            .bind(encoded)
            .fetch_all(&mut *conn)
            .await?;

            Ok(rows
                .into_iter()
                .map(|row| ProviderRow {
                    upload_id: row.upload_id,
                    committed_at: row.committed_at,
                    coordinate: PackageCoordinate {
                        scheme: row.scheme,
                        name: row.name,
                        version: row.version,
                    },
                })
                .collect())
        }

        async fn fetch_references(
            conn: &mut SqliteConnection,
            coordinates: &BTreeSet<PackageCoordinate>,
        ) -> MetadataResult<Vec<PackageRow>> {
            if coordinates.is_empty() {
                return Ok(Vec::new());
            }
            let encoded = serde_json::to_string(coordinates)
                .map_err(|e| MetadataError::Internal(e.to_string()))?;
            let rows = sqlx::query_as::<_, PackageRow>(
                r#"
                SELECT pr.upload_id, pr.scheme, pr.name, pr.version
                FROM json_each(?) c
                JOIN package_references pr
                  ON pr.scheme = json_extract(c.value, '$.scheme')
                 AND pr.name = json_extract(c.value, '$.name')
                 AND pr.version = json_extract(c.value, '$.version')
                "#,
            )
            .bind(encoded)
            .fetch_all(&mut *conn)
            .await?;
            Ok(rows)
        }

        async fn fetch_package_rows(
            conn: &mut SqliteConnection,
            table: &str,
            upload_ids: &[i64],
        ) -> MetadataResult<Vec<PackageRow>> {
            if upload_ids.is_empty() {
                return Ok(Vec::new());
            }
            let sql = format!(
                "SELECT upload_id, scheme, name, version FROM {table} \
                 WHERE upload_id IN (SELECT value FROM json_each(?))"
            );
            let rows = sqlx::query_as::<_, PackageRow>(&sql)
                .bind(id_list(upload_ids)?)
                .fetch_all(&mut *conn)
                .await?;
            Ok(rows)
        }

        /// Load the graph around `targets`, plan the count changes and write them.
        async fn apply_reference_counts(
            conn: &mut SqliteConnection,
            targets: &[i64],
            mode: ReferenceCountMode,
        ) -> MetadataResult<u64> {
            let targets = sorted_ids(targets);
            if targets.is_empty() {
                return Ok(0);
            }
            let target_set: BTreeSet<i64> = targets.iter().copied().collect();

            let target_packages = Self::fetch_package_rows(conn, "packages", &targets).await?;
            let target_references =
                Self::fetch_package_rows(conn, "package_references", &targets).await?;

            let mut coordinates: BTreeSet<PackageCoordinate> = target_packages
                .iter()
                .chain(target_references.iter())
                .map(PackageRow::coordinate)
                .collect();

            // Uploads that compete with the targets for a coordinate get a full
            // recount, which spans every coordinate they provide.
            let mut graph = ReferenceGraph {
                target_packages: target_packages.iter().map(PackageRow::coordinate).collect(),
                providers: Self::fetch_providers(conn, &coordinates).await?,
                references: Vec::new(),
            };
            let recomputed: Vec<i64> = recomputed_uploads(&target_set, mode, &graph)
                .into_iter()
                .collect();
            let provided = Self::fetch_package_rows(conn, "packages", &recomputed).await?;
            coordinates.extend(provided.iter().map(PackageRow::coordinate));

            graph.providers = Self::fetch_providers(conn, &coordinates).await?;
            graph.references = Self::fetch_references(conn, &coordinates)
                .await?
                .iter()
                .chain(target_references.iter())
                .map(|row| ReferenceEdge {
                    upload_id: row.upload_id,
                    coordinate: row.coordinate(),
                })
                .collect();

            let updates = plan_reference_counts(&targets, mode, &graph);
            for update in &updates {
                match update.change {
                    CountChange::Set(count) => {
                        sqlx::query("UPDATE uploads SET reference_count = ? WHERE id = ?")
                            .bind(count.max(0))
                            .bind(update.upload_id)
                            .execute(&mut *conn)
                            .await?;
                    }
                    CountChange::Adjust(delta) => {
                        sqlx::query(
                            "UPDATE uploads SET reference_count = MAX(0, reference_count + ?) \
                             WHERE id = ?",
                        )
                        .bind(delta)
                        .bind(update.upload_id)
                        .execute(&mut *conn)
                        .await?;
                    }
                }
            }

            tracing::debug!(
                targets = targets.len(),
                mode = mode.as_str(),
                updated = updates.len(),
                "reference counts updated"
            );
            Ok(updates.len() as u64)
        }

        async fn replace_package_rows(
            &self,
            table: &str,
            upload_id: i64,
            coordinates: &[PackageCoordinate],
        ) -> MetadataResult<()> {
            let mut tx = self.begin_write().await?;

            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM uploads WHERE id = ?)")
                .bind(upload_id)
                .fetch_one(&mut *tx)
                .await?;
            if !exists {
                return Err(MetadataError::NotFound(format!("upload {upload_id}")));
            }

            sqlx::query(&format!("DELETE FROM {table} WHERE upload_id = ?"))
                .bind(upload_id)
                .execute(&mut *tx)
                .await?;

            let unique: BTreeSet<&PackageCoordinate> = coordinates.iter().collect();
            let insert = format!(
                "INSERT INTO {table} (upload_id, scheme, name, version) VALUES (?, ?, ?, ?)"
            );
            for coordinate in unique {
                sqlx::query(&insert)
                    .bind(upload_id)
                    .bind(&coordinate.scheme)
                    .bind(&coordinate.name)
                    .bind(&coordinate.version)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok(())
        }
    }

    #[async_trait]
    impl UploadRepo for SqliteStore {
        async fn insert_upload(&self, upload: &NewUpload) -> MetadataResult<i64> {
            if upload.num_parts < 1 {
                return Err(MetadataError::Validation(format!(
                    "num_parts must be at least 1, got {}",
                    upload.num_parts
                )));
            }

            let result = sqlx::query(
                r#"
                INSERT INTO uploads (
                    repository_id, commit_hash, root, indexer, state, num_parts,
                    associated_index_id, committed_at, uploaded_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(upload.repository_id)
            .bind(&upload.commit_hash)
            .bind(&upload.root)
            .bind(&upload.indexer)
            .bind(UploadState::Uploading.as_str())
            .bind(upload.num_parts)
            .bind(upload.associated_index_id)
            .bind(upload.committed_at.map(db_time).transpose()?)
            .bind(db_time(upload.uploaded_at)?)
            .execute(&self.pool)
            .await?;

            let upload_id = result.last_insert_rowid();
            tracing::debug!(
                upload_id,
                repository_id = upload.repository_id,
                "upload inserted"
            );
            Ok(upload_id)
        }

        async fn add_upload_part(&self, upload_id: i64, part_index: i64) -> MetadataResult<()> {
            let mut tx = self.begin_write().await?;

            let row: Option<(String, i64)> =
                sqlx::query_as("SELECT state, num_parts FROM uploads WHERE id = ?")
                    .bind(upload_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some((state, num_parts)) = row else {
                return Err(MetadataError::NotFound(format!("upload {upload_id}")));
            };
            if state != UploadState::Uploading.as_str() {
                return Err(MetadataError::Validation(format!(
                    "upload {upload_id} is {state}; parts are only accepted while uploading"
                )));
            }
            if !(0..num_parts).contains(&part_index) {
                return Err(MetadataError::Validation(format!(
                    "part index {part_index} out of range for upload {upload_id} with {num_parts} parts"
                )));
            }

            sqlx::query("INSERT OR IGNORE INTO upload_parts (upload_id, part_index) VALUES (?, ?)")
                .bind(upload_id)
                .bind(part_index)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn mark_queued(&self, upload_id: i64, upload_size: Option<i64>) -> MetadataResult<()> {
            let mut qb = QueryBuilder::new("UPDATE uploads SET state = ");
            qb.push_bind(UploadState::Queued.as_str());
            qb.push(", upload_size = ").push_bind(upload_size);
            self.apply_transition(qb, upload_id, UploadState::Queued)
                .await
        }

        async fn dequeue_upload(&self, now: OffsetDateTime) -> MetadataResult<Option<UploadRow>> {
            let now = db_time(now)?;
            let mut tx = self.begin_write().await?;

            let next: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT id FROM uploads
                WHERE state = 'queued' AND (process_after IS NULL OR process_after <= ?)
                ORDER BY COALESCE(process_after, uploaded_at), id
                LIMIT 1
                "#,
            )
            .bind(&now)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(upload_id) = next else {
                tx.commit().await?;
                return Ok(None);
            };

            let claimed = sqlx::query(
                "UPDATE uploads SET state = 'processing', started_at = ? WHERE id = ? AND state = 'queued'",
            )
            .bind(&now)
            .bind(upload_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            if claimed.rows_affected() == 0 {
                tracing::debug!(upload_id, "queued upload claimed elsewhere");
                return Ok(None);
            }

            tracing::debug!(upload_id, "upload dequeued");
            self.get_upload(upload_id).await
        }

        async fn mark_completed(
            &self,
            upload_id: i64,
            finished_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let mut qb = QueryBuilder::new("UPDATE uploads SET state = ");
            qb.push_bind(UploadState::Completed.as_str());
            qb.push(", finished_at = ").push_bind(db_time(finished_at)?);
            self.apply_transition(qb, upload_id, UploadState::Completed)
                .await
        }

        async fn mark_errored(
            &self,
            upload_id: i64,
            reason: &str,
            finished_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let mut qb = QueryBuilder::new("UPDATE uploads SET state = ");
            qb.push_bind(UploadState::Errored.as_str());
            qb.push(", failure_message = ").push_bind(reason.to_string());
            qb.push(", finished_at = ").push_bind(db_time(finished_at)?);
            self.apply_transition(qb, upload_id, UploadState::Errored)
                .await
        }

        async fn mark_failed(
            &self,
            upload_id: i64,
            reason: &str,
            finished_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let mut qb = QueryBuilder::new("UPDATE uploads SET state = ");
            qb.push_bind(UploadState::Failed.as_str());
            qb.push(", failure_message = ").push_bind(reason.to_string());
            qb.push(", finished_at = ").push_bind(db_time(finished_at)?);
            qb.push(", num_failures = num_failures + 1");
            self.apply_transition(qb, upload_id, UploadState::Failed)
                .await
        }

        async fn get_upload(&self, upload_id: i64) -> MetadataResult<Option<UploadRow>> {
            let sql = format!(
                "{UPLOAD_COLUMNS} {UPLOAD_FROM} \
                 WHERE r.deleted_at IS NULL AND u.state != 'deleted' AND u.id = ?"
            );
            let row = sqlx::query_as::<_, UploadRow>(&sql)
                .bind(upload_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_uploads_by_ids(&self, upload_ids: &[i64]) -> MetadataResult<Vec<UploadRow>> {
            if upload_ids.is_empty() {
                return Ok(Vec::new());
            }
            let sql = format!(
                "{UPLOAD_COLUMNS} {UPLOAD_FROM} \
                 WHERE r.deleted_at IS NULL AND u.state != 'deleted' \
                 AND u.id IN (SELECT value FROM json_each(?)) \
                 ORDER BY u.id"
            );
            let rows = sqlx::query_as::<_, UploadRow>(&sql)
                .bind(id_list(upload_ids)?)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn list_uploads(&self, options: &UploadListOptions) -> MetadataResult<UploadPage> {
            options.validate()?;

            // Count and page under one snapshot so they agree.
            let mut tx = self.pool.begin().await?;

            let mut count_query = upload_query("SELECT COUNT(*) ", options)?;
            let total_count = count_query
                .build_query_scalar::<i64>()
                .fetch_one(&mut *tx)
                .await?;

            let mut page_query = upload_query(UPLOAD_COLUMNS, options)?;
            if options.oldest_first {
                page_query.push(" ORDER BY u.uploaded_at, u.id");
            } else {
                page_query.push(" ORDER BY u.uploaded_at DESC, u.id DESC");
            }
            page_query
                .push(" LIMIT ")
                .push_bind(options.limit.map(i64::from).unwrap_or(-1));
            page_query.push(" OFFSET ").push_bind(i64::from(options.offset));
            let uploads = page_query
                .build_query_as::<UploadRow>()
                .fetch_all(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(UploadPage {
                uploads,
                total_count,
            })
        }

        async fn delete_upload(&self, upload_id: i64) -> MetadataResult<bool> {
            let mut tx = self.begin_write().await?;

            let row: Option<(String, i64)> =
                sqlx::query_as("SELECT state, repository_id FROM uploads WHERE id = ?")
                    .bind(upload_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some((state, repository_id)) = row else {
                tx.commit().await?;
                return Ok(false);
            };
            let current = UploadState::parse(&state)?;
            let Some(target) = current.soft_delete_target() else {
                tx.commit().await?;
                return Ok(false);
            };
            current.transition_to(target)?;

            sqlx::query("UPDATE uploads SET state = ? WHERE id = ? AND state = ?")
                .bind(target.as_str())
                .bind(upload_id)
                .bind(current.as_str())
                .execute(&mut *tx)
                .await?;
            mark_repository_dirty(&mut tx, repository_id).await?;
            tx.commit().await?;

            tracing::info!(upload_id, repository_id, state = %target, "upload soft-deleted");
            Ok(true)
        }

        async fn hard_delete_uploads(&self, upload_ids: &[i64]) -> MetadataResult<u64> {
            let ids = sorted_ids(upload_ids);
            if ids.is_empty() {
                return Ok(0);
            }

            let mut tx = self.begin_write().await?;

            // Rows still `deleting` wait for their repository's graph to settle.
            let ids: Vec<i64> = sqlx::query_scalar(
                "SELECT id FROM uploads \
                 WHERE state = 'deleted' AND id IN (SELECT value FROM json_each(?)) \
                 ORDER BY id",
            )
            .bind(id_list(&ids)?)
            .fetch_all(&mut *tx)
            .await?;
            if ids.is_empty() {
                tx.commit().await?;
                return Ok(0);
            }

            if self.reference_counts.disabled {
                tracing::warn!(
                    count = ids.len(),
                    "reference counting disabled; hard-deleting uploads without updating counts"
                );
            } else {
                Self::apply_reference_counts(&mut tx, &ids, ReferenceCountMode::Remove).await?;
            }

            let result = sqlx::query("DELETE FROM uploads WHERE id IN (SELECT value FROM json_each(?))")
                .bind(id_list(&ids)?)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            let deleted = result.rows_affected();
            tracing::info!(count = deleted, "uploads hard-deleted");
            Ok(deleted)
        }

        async fn get_soft_deleted_upload_ids(&self, limit: u32) -> MetadataResult<Vec<i64>> {
            let ids = sqlx::query_scalar(
                "SELECT id FROM uploads WHERE state = 'deleted' ORDER BY id LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(ids)
        }

        async fn reap_stuck_uploads(&self, uploaded_before: OffsetDateTime) -> MetadataResult<u64> {
            let mut tx = self.begin_write().await?;

            let stuck: Vec<i64> = sqlx::query_scalar(
                "SELECT id FROM uploads WHERE state = 'uploading' AND uploaded_at < ? ORDER BY id",
            )
            .bind(db_time(uploaded_before)?)
            .fetch_all(&mut *tx)
            .await?;

            let mut reaped = 0;
            for upload_id in &stuck {
                let result = sqlx::query(
                    "UPDATE uploads SET state = 'deleted' WHERE id = ? AND state = 'uploading'",
                )
                .bind(upload_id)
                .execute(&mut *tx)
                .await?;
                reaped += result.rows_affected();
            }

            tx.commit().await?;

            if reaped > 0 {
                tracing::info!(count = reaped, "reaped uploads stuck in uploading");
            }
            Ok(reaped)
        }

        async fn get_oldest_commit_date(
            &self,
            repository_id: i64,
        ) -> MetadataResult<Option<OffsetDateTime>> {
            let oldest: Option<OffsetDateTime> = sqlx::query_scalar(
                r#"
                SELECT committed_at FROM uploads
                WHERE repository_id = ?
                  AND state = 'completed'
                  AND committed_at IS NOT NULL
                  AND committed_at != ?
                ORDER BY committed_at
                LIMIT 1
                "#,
            )
            .bind(repository_id)
            .bind(db_time(UNKNOWN_COMMIT_DATE)?)
            .fetch_optional(&self.pool)
            .await?;
            Ok(oldest)
        }

        async fn update_committed_at(
            &self,
            upload_id: i64,
            committed_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE uploads SET committed_at = ? WHERE id = ? AND state != 'deleted'",
            )
            .bind(db_time(committed_at)?)
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("upload {upload_id}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DependencyRepo for SqliteStore {
        async fn update_packages(
            &self,
            upload_id: i64,
            packages: &[PackageCoordinate],
        ) -> MetadataResult<()> {
            self.replace_package_rows("packages", upload_id, packages)
                .await
        }

        async fn update_package_references(
            &self,
            upload_id: i64,
            references: &[PackageCoordinate],
        ) -> MetadataResult<()> {
            self.replace_package_rows("package_references", upload_id, references)
                .await
        }

        async fn get_packages(&self, upload_id: i64) -> MetadataResult<Vec<PackageRow>> {
            let rows = sqlx::query_as::<_, PackageRow>(
                "SELECT upload_id, scheme, name, version FROM packages \
                 WHERE upload_id = ? ORDER BY scheme, name, version",
            )
            .bind(upload_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_package_references(&self, upload_id: i64) -> MetadataResult<Vec<PackageRow>> {
            let rows = sqlx::query_as::<_, PackageRow>(
                "SELECT upload_id, scheme, name, version FROM package_references \
                 WHERE upload_id = ? ORDER BY scheme, name, version",
            )
            .bind(upload_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn dependencies_of(&self, upload_id: i64) -> MetadataResult<Vec<RankedProviderRow>> {
            let sql = format!(
                r#"
                WITH ranked AS ({RANKED_PROVIDERS})
                SELECT rk.upload_id, rk.scheme, rk.name, rk.version, rk.committed_at, rk.rank
                FROM ranked rk
                JOIN package_references pr
                  ON pr.scheme = rk.scheme AND pr.name = rk.name AND pr.version = rk.version
                WHERE pr.upload_id = ? AND rk.upload_id != pr.upload_id
                ORDER BY rk.scheme, rk.name, rk.version, rk.rank
                "#
            );
            let rows = sqlx::query_as::<_, RankedProviderRow>(&sql)
                .bind(upload_id)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn dependents_of(&self, upload_id: i64) -> MetadataResult<Vec<PackageRow>> {
            let sql = format!(
                r#"
                WITH ranked AS ({RANKED_PROVIDERS})
                SELECT pr.upload_id, pr.scheme, pr.name, pr.version
                FROM package_references pr
                JOIN ranked rk
                  ON pr.scheme = rk.scheme AND pr.name = rk.name AND pr.version = rk.version
                WHERE rk.upload_id = ? AND rk.rank = 1 AND pr.upload_id != rk.upload_id
                ORDER BY pr.upload_id, pr.scheme, pr.name, pr.version
                "#
            );
            let rows = sqlx::query_as::<_, PackageRow>(&sql)
                .bind(upload_id)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl ReferenceCountRepo for SqliteStore {
        async fn update_reference_counts(
            &self,
            upload_ids: &[i64],
            mode: ReferenceCountMode,
        ) -> MetadataResult<u64> {
            if self.reference_counts.disabled {
                tracing::warn!(
                    count = upload_ids.len(),
                    mode = mode.as_str(),
                    "reference counting disabled; skipping reference count update"
                );
                return Ok(0);
            }

            let mut tx = self.begin_write().await?;
            let updated = Self::apply_reference_counts(&mut tx, upload_ids, mode).await?;
            tx.commit().await?;
            Ok(updated)
        }
    }

    #[async_trait]
    impl RetentionRepo for SqliteStore {
        async fn mark_expired(
            &self,
            protected_ids: &[i64],
            expired_ids: &[i64],
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            let protected_ids = sorted_ids(protected_ids);
            let expired_ids = sorted_ids(expired_ids);
            let now = db_time(now)?;

            let mut tx = self.begin_write().await?;

            if !protected_ids.is_empty() {
                sqlx::query(
                    "UPDATE uploads SET last_retention_scan_at = ? \
                     WHERE id IN (SELECT value FROM json_each(?))",
                )
                .bind(&now)
                .bind(id_list(&protected_ids)?)
                .execute(&mut *tx)
                .await?;
            }
            if !expired_ids.is_empty() {
                sqlx::query(
                    "UPDATE uploads SET expired = 1 WHERE id IN (SELECT value FROM json_each(?))",
                )
                .bind(id_list(&expired_ids)?)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;

            tracing::debug!(
                protected = protected_ids.len(),
                expired = expired_ids.len(),
                "upload retention updated"
            );
            Ok(())
        }

        async fn reclaim_expired(&self) -> MetadataResult<RepositoryCounts> {
            if self.reference_counts.disabled {
                tracing::warn!("reference counting disabled; skipping expired upload reclaim");
                return Ok(RepositoryCounts::new());
            }

            let mut tx = self.begin_write().await?;

            let repository_ids: Vec<i64> = sqlx::query_scalar(
                r#"
                UPDATE uploads SET state = 'deleting'
                WHERE id IN (
                    SELECT id FROM uploads
                    WHERE state = 'completed' AND expired = 1 AND reference_count = 0
                    ORDER BY id
                )
                RETURNING repository_id
                "#,
            )
            .fetch_all(&mut *tx)
            .await?;

            let mut counts = RepositoryCounts::new();
            for repository_id in repository_ids {
                *counts.entry(repository_id).or_default() += 1;
            }
            for &repository_id in counts.keys() {
                mark_repository_dirty(&mut tx, repository_id).await?;
            }

            tx.commit().await?;

            for (repository_id, count) in &counts {
                tracing::info!(
                    repository_id,
                    count,
                    "expired unreferenced uploads moved to deleting"
                );
            }
            Ok(counts)
        }

        async fn purge_deleted_repository_uploads(
            &self,
            grace_period: time::Duration,
            now: OffsetDateTime,
        ) -> MetadataResult<RepositoryCounts> {
            let cutoff = db_time(now - grace_period)?;

            // No completed -> deleting stop: the repository can no longer serve
            // queries for these uploads.
            let repository_ids: Vec<i64> = sqlx::query_scalar(
                r#"
                UPDATE uploads SET state = 'deleted'
                WHERE state != 'deleted'
                  AND repository_id IN (
                    SELECT id FROM repositories
                    WHERE deleted_at IS NOT NULL AND deleted_at <= ?
                  )
                RETURNING repository_id
                "#,
            )
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

            let mut counts = RepositoryCounts::new();
            for repository_id in repository_ids {
                *counts.entry(repository_id).or_default() += 1;
            }
            for (repository_id, count) in &counts {
                tracing::info!(
                    repository_id,
                    count,
                    "deleted uploads of removed repository"
                );
            }
            Ok(counts)
        }
    }

    #[async_trait]
    impl ScanRepo for SqliteStore {
        async fn select_for_scan(
            &self,
            kind: ScanKind,
            min_interval: time::Duration,
            limit: u32,
            now: OffsetDateTime,
        ) -> MetadataResult<Vec<i64>> {
            if limit == 0 {
                return Ok(Vec::new());
            }

            let candidates = match kind {
                ScanKind::IndexScan => "SELECT r.id FROM repositories r WHERE r.deleted_at IS NULL",
                ScanKind::RetentionScan => {
                    r#"
                    SELECT r.id FROM repositories r
                    JOIN dirty_repositories d ON d.repository_id = r.id
                    WHERE r.deleted_at IS NULL
                      AND d.update_token = d.dirty_token
                      AND EXISTS (
                        SELECT 1 FROM uploads u
                        WHERE u.repository_id = r.id AND u.state = 'completed'
                      )
                    "#
                }
            };
            let sql = format!(
                r#"
                SELECT c.id FROM ({candidates}) c
                LEFT JOIN repository_scan_watermarks w
                  ON w.repository_id = c.id AND w.scan_kind = ?
                WHERE w.last_scanned_at IS NULL OR w.last_scanned_at < ?
                ORDER BY w.last_scanned_at IS NOT NULL, w.last_scanned_at, c.id
                LIMIT ?
                "#
            );

            let due_before = db_time(now - min_interval)?;
            let now = db_time(now)?;

            let mut tx = self.begin_write().await?;

            let selected: Vec<i64> = sqlx::query_scalar(&sql)
                .bind(kind.as_str())
                .bind(due_before)
                .bind(limit)
                .fetch_all(&mut *tx)
                .await?;

            // The watermark bump is the lease.
            for repository_id in sorted_ids(&selected) {
                sqlx::query(
                    r#"
                    INSERT INTO repository_scan_watermarks (repository_id, scan_kind, last_scanned_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT (repository_id, scan_kind)
                    DO UPDATE SET last_scanned_at = excluded.last_scanned_at
                    "#,
                )
                .bind(repository_id)
                .bind(kind.as_str())
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;

            tracing::debug!(scan_kind = %kind, count = selected.len(), "repositories selected for scan");
            Ok(selected)
        }

        async fn get_scan_watermark(
            &self,
            repository_id: i64,
            kind: ScanKind,
        ) -> MetadataResult<Option<OffsetDateTime>> {
            let row = sqlx::query_as::<_, ScanWatermarkRow>(
                "SELECT repository_id, scan_kind, last_scanned_at FROM repository_scan_watermarks \
                 WHERE repository_id = ? AND scan_kind = ?",
            )
            .bind(repository_id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|r| r.last_scanned_at))
        }
    }

    #[async_trait]
    impl RepositoryRepo for SqliteStore {
        async fn upsert_repository(&self, repository_id: i64, name: &str) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO repositories (id, name) VALUES (?, ?)
                ON CONFLICT (id) DO UPDATE SET name = excluded.name
                "#,
            )
            .bind(repository_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_repository(&self, repository_id: i64) -> MetadataResult<Option<RepositoryRow>> {
            let row = sqlx::query_as::<_, RepositoryRow>(
                "SELECT id, name, deleted_at FROM repositories WHERE id = ?",
            )
            .bind(repository_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn delete_repository(
            &self,
            repository_id: i64,
            deleted_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE repositories SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(db_time(deleted_at)?)
            .bind(repository_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn mark_repository_as_dirty(&self, repository_id: i64) -> MetadataResult<()> {
            let mut conn = self.pool.acquire().await?;
            mark_repository_dirty(&mut conn, repository_id).await
        }

        async fn get_dirty_repositories(&self) -> MetadataResult<Vec<DirtyRepositoryRow>> {
            let rows = sqlx::query_as::<_, DirtyRepositoryRow>(
                r#"
                SELECT d.repository_id, d.dirty_token, d.update_token, d.updated_at
                FROM dirty_repositories d
                JOIN repositories r ON r.id = d.repository_id
                WHERE r.deleted_at IS NULL AND d.dirty_token > d.update_token
                ORDER BY d.repository_id
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn set_repository_as_updated(
            &self,
            repository_id: i64,
            dirty_token: i64,
            now: OffsetDateTime,
        ) -> MetadataResult<u64> {
            let mut tx = self.begin_write().await?;

            sqlx::query(
                r#"
                INSERT INTO dirty_repositories (repository_id, dirty_token, update_token, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (repository_id) DO UPDATE SET
                    update_token = MAX(update_token, excluded.update_token),
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(repository_id)
            .bind(dirty_token)
            .bind(dirty_token)
            .bind(db_time(now)?)
            .execute(&mut *tx)
            .await?;

            // The graph no longer routes anything through `deleting` uploads
            // once it has caught up with every soft delete.
            let settled = sqlx::query(
                r#"
                UPDATE uploads SET state = 'deleted'
                WHERE repository_id = ? AND state = 'deleting'
                  AND EXISTS (
                    SELECT 1 FROM dirty_repositories d
                    WHERE d.repository_id = ? AND d.update_token >= d.dirty_token
                  )
                "#,
            )
            .bind(repository_id)
            .bind(repository_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            tx.commit().await?;

            if settled > 0 {
                tracing::info!(repository_id, count = settled, "deleting uploads settled");
            }
            Ok(settled)
        }

        async fn set_uploads_visible_at_tip(
            &self,
            repository_id: i64,
            upload_ids: &[i64],
        ) -> MetadataResult<()> {
            let mut tx = self.begin_write().await?;

            sqlx::query("DELETE FROM uploads_visible_at_tip WHERE repository_id = ?")
                .bind(repository_id)
                .execute(&mut *tx)
                .await?;
            for upload_id in sorted_ids(upload_ids) {
                sqlx::query(
                    "INSERT INTO uploads_visible_at_tip (repository_id, upload_id) VALUES (?, ?)",
                )
                .bind(repository_id)
                .bind(upload_id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Tracked source repositories
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    deleted_at TEXT
);

-- Upload records
CREATE TABLE IF NOT EXISTS uploads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository_id INTEGER NOT NULL REFERENCES repositories(id),
    commit_hash TEXT NOT NULL,
    root TEXT NOT NULL DEFAULT '',
    indexer TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'uploading',
    num_parts INTEGER NOT NULL DEFAULT 1,
    upload_size INTEGER,
    failure_message TEXT,
    num_resets INTEGER NOT NULL DEFAULT 0,
    num_failures INTEGER NOT NULL DEFAULT 0,
    reference_count INTEGER NOT NULL DEFAULT 0 CHECK (reference_count >= 0),
    expired INTEGER NOT NULL DEFAULT 0,
    committed_at TEXT,
    uploaded_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    process_after TEXT,
    last_retention_scan_at TEXT,
    associated_index_id INTEGER
);
CREATE INDEX IF NOT EXISTS idx_uploads_repository_state ON uploads(repository_id, state);
CREATE INDEX IF NOT EXISTS idx_uploads_state_uploaded_at ON uploads(state, uploaded_at);

-- Received parts of multi-part uploads
CREATE TABLE IF NOT EXISTS upload_parts (
    upload_id INTEGER NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
    part_index INTEGER NOT NULL,
    PRIMARY KEY (upload_id, part_index)
);

-- Package coordinates provided by uploads
CREATE TABLE IF NOT EXISTS packages (
    upload_id INTEGER NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
    scheme TEXT NOT NULL,
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    PRIMARY KEY (upload_id, scheme, name, version)
);
CREATE INDEX IF NOT EXISTS idx_packages_coordinate ON packages(scheme, name, version);

-- Package coordinates uploads depend on
CREATE TABLE IF NOT EXISTS package_references (
    upload_id INTEGER NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
    scheme TEXT NOT NULL,
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    PRIMARY KEY (upload_id, scheme, name, version)
);
CREATE INDEX IF NOT EXISTS idx_package_references_coordinate
    ON package_references(scheme, name, version);

-- Uploads reachable from the default-branch tip (written by the commit-graph updater)
CREATE TABLE IF NOT EXISTS uploads_visible_at_tip (
    repository_id INTEGER NOT NULL,
    upload_id INTEGER NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
    PRIMARY KEY (repository_id, upload_id)
);
CREATE INDEX IF NOT EXISTS idx_uploads_visible_at_tip_upload ON uploads_visible_at_tip(upload_id);

-- Commit-graph recompute markers
CREATE TABLE IF NOT EXISTS dirty_repositories (
    repository_id INTEGER PRIMARY KEY REFERENCES repositories(id),
    dirty_token INTEGER NOT NULL DEFAULT 0,
    update_token INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT
);

-- Per-repository scan watermarks
CREATE TABLE IF NOT EXISTS repository_scan_watermarks (
    repository_id INTEGER NOT NULL REFERENCES repositories(id),
    scan_kind TEXT NOT NULL,
    last_scanned_at TEXT NOT NULL,
    PRIMARY KEY (repository_id, scan_kind)
);
"#;
