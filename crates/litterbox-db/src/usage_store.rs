//! Usage event persistence.
//!
//! Events are insert-only. A batch is written in one transaction: each id
//! is checked for prior existence and then staged, and the transaction
//! commits once at the end. Any duplicate aborts the whole batch.

use chrono::{DateTime, Utc};
use litterbox_types::{EdgeDeviceId, UsageEvent, UsageEventId};
use uuid::Uuid;

use crate::error::{DbError, UNIQUE_VIOLATION};
use crate::postgres::PostgresPool;

/// Operations on the `litterbox_usage_data` table.
#[derive(Debug, Clone)]
pub struct UsageStore {
    pool: PostgresPool,
}

impl UsageStore {
    /// Create a new usage store on top of a connection pool.
    pub const fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    /// Return the underlying pool.
    pub const fn pool(&self) -> &PostgresPool {
        &self.pool
    }

    /// Insert a batch of usage events in a single transaction.
    ///
    /// Every event id is checked against the table (and against earlier
    /// events of the same batch) before its insert is staged. The first
    /// id that already exists aborts the transaction.
    ///
    /// Returns the number of rows committed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::DuplicateRecord`] carrying the offending id if any
    /// event already exists; nothing is committed in that case. This is
    /// also returned when a concurrent writer commits the same id first.
    /// Returns [`DbError::Postgres`] for any other transactional failure,
    /// after the transaction has been rolled back.
    pub async fn insert_batch(&self, events: &[UsageEvent]) -> Result<usize, DbError> {
        if events.is_empty() {
            return Ok(0);
        }
        if self.pool.is_closed() {
            return Err(DbError::Closed);
        }

        tracing::debug!(count = events.len(), "Inserting usage events");

        // Dropping `tx` without commit rolls back.
        let mut tx = self.pool.pool().begin().await?;

        for event in events {
            let exists: bool = sqlx::query_scalar(
                r"SELECT EXISTS (SELECT 1 FROM litterbox_usage_data WHERE id = $1)",
            )
            .bind(event.id.into_inner())
            .fetch_one(&mut *tx)
            .await?;

            if exists {
                tracing::error!(
                    id = %event.id,
                    device = %event.source_device_id,
                    "Usage event already exists, investigate this issue"
                );
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(error = %e, "Rollback after duplicate failed");
                }
                return Err(DbError::DuplicateRecord(event.id));
            }

            sqlx::query(
                r"INSERT INTO litterbox_usage_data
                    (id, litterbox_edge_device_id, enter_time, exit_time, weight_enter, weight_exit, created_at)
                  VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(event.id.into_inner())
            .bind(event.source_device_id.into_inner())
            .bind(event.enter_time)
            .bind(event.exit_time)
            .bind(event.weight_enter)
            .bind(event.weight_exit)
            .bind(event.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| duplicate_or_postgres(e, event.id))?;
        }

        tx.commit().await?;

        tracing::info!(count = events.len(), "Inserted usage events");
        Ok(events.len())
    }

    /// Return every stored usage event, oldest visit first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn fetch_all(&self) -> Result<Vec<UsageRow>, DbError> {
        let rows = sqlx::query_as::<_, UsageRow>(
            r"SELECT id, litterbox_edge_device_id, enter_time, exit_time, weight_enter, weight_exit, created_at
              FROM litterbox_usage_data
              ORDER BY enter_time, id",
        )
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows)
    }

    /// Return the most recent enter timestamp, or `None` if the table is empty.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn latest_enter_time(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar(r"SELECT MAX(enter_time) FROM litterbox_usage_data")
                .fetch_one(self.pool.pool())
                .await?;

        match latest {
            Some(ts) => tracing::debug!(latest = %ts, "Latest usage timestamp"),
            None => tracing::debug!("No usage data found"),
        }
        Ok(latest)
    }

    /// Page through one device's visits in `[from, to)`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn fetch_range(
        &self,
        device: EdgeDeviceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<UsageRow>, DbError> {
        let rows = sqlx::query_as::<_, UsageRow>(
            r"SELECT id, litterbox_edge_device_id, enter_time, exit_time, weight_enter, weight_exit, created_at
              FROM litterbox_usage_data
              WHERE litterbox_edge_device_id = $1 AND enter_time >= $2 AND enter_time < $3
              ORDER BY enter_time DESC, id
              LIMIT $4 OFFSET $5",
        )
        .bind(device.into_inner())
        .bind(from)
        .bind(to)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows)
    }

    /// Count stored usage events.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn count(&self) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar(r"SELECT COUNT(*) FROM litterbox_usage_data")
            .fetch_one(self.pool.pool())
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Close the underlying pool. Safe to call more than once.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Map a unique violation on the primary key to [`DbError::DuplicateRecord`].
fn duplicate_or_postgres(error: sqlx::Error, id: UsageEventId) -> DbError {
    let is_unique_violation = error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);
    if is_unique_violation {
        DbError::DuplicateRecord(id)
    } else {
        DbError::Postgres(error)
    }
}

/// A row from the `litterbox_usage_data` table.
///
/// Uses runtime types rather than compile-time checked types to
/// avoid requiring a live database during builds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UsageRow {
    /// Event id.
    pub id: Uuid,
    /// Emitting device.
    pub litterbox_edge_device_id: Uuid,
    /// Visit start.
    pub enter_time: DateTime<Utc>,
    /// Visit end.
    pub exit_time: DateTime<Utc>,
    /// Scale reading on entry.
    pub weight_enter: f64,
    /// Scale reading on exit.
    pub weight_exit: f64,
    /// Producer-side creation time.
    pub created_at: DateTime<Utc>,
}

impl From<UsageRow> for UsageEvent {
    fn from(row: UsageRow) -> Self {
        Self {
            id: UsageEventId(row.id),
            source_device_id: EdgeDeviceId(row.litterbox_edge_device_id),
            enter_time: row.enter_time,
            exit_time: row.exit_time,
            weight_enter: row.weight_enter,
            weight_exit: row.weight_exit,
            created_at: row.created_at,
        }
    }
}
