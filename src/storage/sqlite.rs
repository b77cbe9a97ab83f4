//! SQLite history backend
//!
//! One `transitions` table, created by the migrations in `./migrations`.
//! The database runs in WAL mode so `latest` queries do not block appends.
//! Timestamps are stored as Unix milliseconds; the raw upstream snapshot is
//! stored verbatim as JSON text.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::EntityId;

use super::backend::{HealthStatus, HistoryBackend, QueryRange};
use super::error::{StorageError, StorageResult};
use super::schema::{TransitionEvent, TransitionKind};

/// SQLite history backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database and run migrations
    ///
    /// ```no_run
    /// # use livewatch::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./history.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("opening history database {db_path_str}");

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        debug!("history schema up to date");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn row_to_event(row: SqliteRow) -> StorageResult<TransitionEvent> {
        let kind_str: String = row.get("kind");
        let kind = kind_str
            .parse::<TransitionKind>()
            .map_err(StorageError::CorruptRow)?;

        Ok(TransitionEvent {
            timestamp: Self::millis_to_timestamp(row.get("timestamp")),
            entity_id: EntityId(row.get::<i64, _>("entity_id") as u64),
            host_name: row.get("host_name"),
            kind,
            raw_snapshot: row.get("raw_snapshot"),
            summary: row.get("summary"),
        })
    }
}

#[async_trait]
impl HistoryBackend for SqliteBackend {
    #[instrument(skip(self, event), fields(entity = %event.entity_id, kind = %event.kind))]
    async fn append(&self, event: TransitionEvent) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transitions (timestamp, entity_id, host_name, kind, raw_snapshot, summary)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Self::timestamp_to_millis(&event.timestamp))
        .bind(event.entity_id.0 as i64)
        .bind(&event.host_name)
        .bind(event.kind.to_string())
        .bind(&event.raw_snapshot)
        .bind(&event.summary)
        .execute(&self.pool)
        .await?;

        debug!("transition persisted");
        Ok(())
    }

    #[instrument(skip(self), fields(entity = %query.entity_id))]
    async fn query_range(&self, query: QueryRange) -> StorageResult<Vec<TransitionEvent>> {
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);

        let rows = sqlx::query(
            r#"
            SELECT timestamp, entity_id, host_name, kind, raw_snapshot, summary
            FROM transitions
            WHERE entity_id = ? AND timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(query.entity_id.0 as i64)
        .bind(Self::timestamp_to_millis(&query.start))
        .bind(Self::timestamp_to_millis(&query.end))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    #[instrument(skip(self))]
    async fn query_latest(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> StorageResult<Vec<TransitionEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, entity_id, host_name, kind, raw_snapshot, summary
            FROM transitions
            WHERE entity_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(entity_id.0 as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut events = rows
            .into_iter()
            .map(Self::row_to_event)
            .collect::<StorageResult<Vec<_>>>()?;
        // chronological order (oldest first)
        events.reverse();

        Ok(events)
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        info!("cleaning up transitions older than {}", before);

        let result = sqlx::query("DELETE FROM transitions WHERE timestamp < ?")
            .bind(Self::timestamp_to_millis(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old transitions", deleted);

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                backend: "sqlite",
                detail: self.db_path.clone(),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    backend: "sqlite",
                    detail: format!("{} unreachable: {e}", self.db_path),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
