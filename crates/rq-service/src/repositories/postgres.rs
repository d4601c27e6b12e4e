//! PostgreSQL queue store.
//!
//! Layout: `groups` keyed by name and `queue_entries` keyed by session id,
//! with an index on `(group_name, joined_at)` for ordered scans.
//!
//! Mutations that depend on a group's member count take a row lock on the
//! group (`FOR UPDATE`, or the lock implied by an upsert) inside a
//! transaction. Joins, clears, group deletion and the reaper are therefore
//! linearized per group, while unrelated groups proceed concurrently.
//!
//! All queries use parameterized statements.

use super::{
    group_exists, group_not_found, participant_not_found, JoinOutcome, QueueStore, RosterSnapshot,
};
use crate::errors::RqError;
use crate::models::{GroupRecord, QueueEntry, DEFAULT_GROUP};
use crate::policy::{order_roster, rank_of, MonotonicClock, QueuePolicy};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
struct GroupRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<GroupRow> for GroupRecord {
    fn from(row: GroupRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    session_id: Uuid,
    name: String,
    group_name: String,
    joined_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl From<EntryRow> for QueueEntry {
    fn from(row: EntryRow) -> Self {
        Self {
            session_id: row.session_id,
            name: row.name,
            group_name: row.group_name,
            joined_at: row.joined_at,
            last_active: row.last_active,
        }
    }
}

const ENTRY_COLUMNS: &str = "session_id, name, group_name, joined_at, last_active";

/// PostgreSQL implementation of [`QueueStore`].
pub struct PgQueueStore {
    pool: PgPool,
    clock: MonotonicClock,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: MonotonicClock::new(),
        }
    }

    /// Apply the bundled migrations. Seeds the default group.
    pub async fn migrate(&self) -> Result<(), RqError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RqError::Database(e.to_string()))?;
        Ok(())
    }

    /// Lock a group row for the remainder of the transaction.
    ///
    /// Returns false if the group does not exist.
    async fn lock_group(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
    ) -> Result<bool, RqError> {
        let locked: Option<(String,)> =
            sqlx::query_as("SELECT name FROM groups WHERE name = $1 FOR UPDATE")
                .bind(name)
                .fetch_optional(&mut **tx)
                .await?;
        Ok(locked.is_some())
    }

    async fn ordered_roster(
        tx: &mut Transaction<'_, Postgres>,
        group_name: &str,
    ) -> Result<Vec<QueueEntry>, RqError> {
        // Ties on joined_at fall back to the session id so scans are deterministic
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM queue_entries \
             WHERE group_name = $1 ORDER BY joined_at ASC, session_id ASC"
        ))
        .bind(group_name)
        .fetch_all(&mut **tx)
        .await?;

        let mut roster: Vec<QueueEntry> = rows.into_iter().map(QueueEntry::from).collect();
        order_roster(&mut roster);
        Ok(roster)
    }
}

#[async_trait::async_trait]
impl QueueStore for PgQueueStore {
    async fn ping(&self) -> Result<(), RqError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(group = %name))]
    async fn create_group(&self, name: &str) -> Result<GroupRecord, RqError> {
        let row: Option<GroupRow> = sqlx::query_as(
            r#"
            INSERT INTO groups (id, name, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(GroupRecord::from).ok_or_else(|| group_exists(name))
    }

    async fn ensure_group(&self, name: &str) -> Result<bool, RqError> {
        let result = sqlx::query(
            r#"
            INSERT INTO groups (id, name, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip_all, fields(group = %name))]
    async fn delete_group(&self, name: &str) -> Result<u64, RqError> {
        let mut tx = self.pool.begin().await?;

        if !Self::lock_group(&mut tx, name).await? {
            return Err(group_not_found(name));
        }

        let cleared = sqlx::query("DELETE FROM queue_entries WHERE group_name = $1")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM groups WHERE name = $1")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(cleared)
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RqError> {
        let rows: Vec<GroupRow> =
            sqlx::query_as("SELECT id, name, created_at FROM groups ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(GroupRecord::from).collect())
    }

    #[instrument(skip_all, fields(group = %group_name))]
    async fn join(
        &self,
        name: &str,
        group_name: &str,
        max_participants: usize,
    ) -> Result<JoinOutcome, RqError> {
        let mut tx = self.pool.begin().await?;

        // Upsert doubles as the per-group lock: DO UPDATE row-locks the group
        // whether or not it already existed. xmax = 0 only for a fresh insert.
        let (group_created,): (bool,) = sqlx::query_as(
            r#"
            INSERT INTO groups (id, name, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING (xmax = 0)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(group_name)
        .bind(self.clock.now())
        .fetch_one(&mut *tx)
        .await?;

        let (current,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM queue_entries WHERE group_name = $1")
                .bind(group_name)
                .fetch_one(&mut *tx)
                .await?;

        QueuePolicy::new(max_participants)
            .check_capacity(group_name, usize::try_from(current).unwrap_or(usize::MAX))?;

        let now = self.clock.now();
        let row: EntryRow = sqlx::query_as(&format!(
            "INSERT INTO queue_entries ({ENTRY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $4) RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(group_name)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let entry = QueueEntry::from(row);

        let roster = Self::ordered_roster(&mut tx, group_name).await?;
        let position = rank_of(&roster, entry.session_id).ok_or_else(|| {
            RqError::Internal("joined participant missing from roster".to_string())
        })?;

        tx.commit().await?;

        Ok(JoinOutcome {
            entry,
            position,
            group_created,
        })
    }

    async fn status_snapshot(&self, session_id: Uuid) -> Result<RosterSnapshot, RqError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "UPDATE queue_entries SET last_active = $2 \
             WHERE session_id = $1 RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(session_id)
        .bind(self.clock.now())
        .fetch_optional(&mut *tx)
        .await?;
        let entry = QueueEntry::from(row.ok_or_else(participant_not_found)?);

        let roster = Self::ordered_roster(&mut tx, &entry.group_name).await?;
        tx.commit().await?;

        Ok(RosterSnapshot { entry, roster })
    }

    async fn touch(&self, session_id: Uuid) -> Result<QueueEntry, RqError> {
        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "UPDATE queue_entries SET last_active = $2 \
             WHERE session_id = $1 RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(session_id)
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueEntry::from).ok_or_else(participant_not_found)
    }

    async fn demote(&self, session_id: Uuid) -> Result<QueueEntry, RqError> {
        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "UPDATE queue_entries SET joined_at = $2, last_active = $2 \
             WHERE session_id = $1 RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(session_id)
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueEntry::from).ok_or_else(participant_not_found)
    }

    async fn remove_entry(&self, session_id: Uuid) -> Result<QueueEntry, RqError> {
        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "DELETE FROM queue_entries WHERE session_id = $1 RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueEntry::from).ok_or_else(participant_not_found)
    }

    async fn list_entries(
        &self,
        group_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, RqError> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM queue_entries \
             WHERE ($1::TEXT IS NULL OR group_name = $1) \
             ORDER BY joined_at ASC, session_id ASC LIMIT $2"
        ))
        .bind(group_name)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(QueueEntry::from).collect())
    }

    #[instrument(skip_all, fields(group = %group_name))]
    async fn clear_group(&self, group_name: &str) -> Result<u64, RqError> {
        let mut tx = self.pool.begin().await?;

        // Serialize with concurrent joins; clearing an unknown group is a no-op
        Self::lock_group(&mut tx, group_name).await?;

        let cleared = sqlx::query("DELETE FROM queue_entries WHERE group_name = $1")
            .bind(group_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(cleared)
    }

    async fn reap_empty_groups(&self) -> Result<Vec<String>, RqError> {
        let candidates: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT g.name FROM groups g
            WHERE g.name <> $1
              AND NOT EXISTS (SELECT 1 FROM queue_entries q WHERE q.group_name = g.name)
            "#,
        )
        .bind(DEFAULT_GROUP)
        .fetch_all(&self.pool)
        .await?;

        let mut reaped = Vec::new();
        for (name,) in candidates {
            let mut tx = self.pool.begin().await?;

            if !Self::lock_group(&mut tx, &name).await? {
                continue;
            }

            // Re-check under the lock: a join may have landed since the scan
            let (members,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM queue_entries WHERE group_name = $1")
                    .bind(&name)
                    .fetch_one(&mut *tx)
                    .await?;
            if members > 0 {
                continue;
            }

            sqlx::query("DELETE FROM groups WHERE name = $1")
                .bind(&name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            info!(target: "rq.repository.postgres", group = %name, "Deleted empty group");
            reaped.push(name);
        }

        Ok(reaped)
    }
}
