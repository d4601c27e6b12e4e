//! Storage layer for groups and queue entries.
//!
//! `QueueStore` is the seam between the services and the backing store. Two
//! implementations exist:
//!
//! - `InMemoryStore` - process-local state behind a single async mutex
//! - `PgQueueStore` - PostgreSQL via sqlx, one row lock per group
//!
//! Every method that reads a group's count and then mutates its roster does so
//! atomically with respect to other mutations of the same group.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgQueueStore;

use crate::errors::RqError;
use crate::models::{GroupRecord, QueueEntry};
use uuid::Uuid;

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// The newly enqueued participant.
    pub entry: QueueEntry,

    /// 1-based rank within the group immediately after insertion.
    pub position: usize,

    /// Whether the group was created implicitly by this join.
    pub group_created: bool,
}

/// A participant together with its group's ordered roster, read atomically.
#[derive(Debug, Clone)]
pub struct RosterSnapshot {
    pub entry: QueueEntry,
    pub roster: Vec<QueueEntry>,
}

/// Storage operations for the group registry and turn queue.
#[async_trait::async_trait]
pub trait QueueStore: Send + Sync {
    /// Verify the store is reachable.
    async fn ping(&self) -> Result<(), RqError>;

    /// Create a group. Fails with `Conflict` if the name is taken.
    async fn create_group(&self, name: &str) -> Result<GroupRecord, RqError>;

    /// Create a group if absent. Returns true if it was created.
    async fn ensure_group(&self, name: &str) -> Result<bool, RqError>;

    /// Delete a group and all of its participants.
    ///
    /// Returns the number of participants removed. Fails with `NotFound` if
    /// the group does not exist. Callers enforce the default-group rule.
    async fn delete_group(&self, name: &str) -> Result<u64, RqError>;

    /// All known groups, oldest first.
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RqError>;

    /// Ensure the group exists, check capacity, and insert a new participant
    /// as one atomic unit.
    async fn join(
        &self,
        name: &str,
        group_name: &str,
        max_participants: usize,
    ) -> Result<JoinOutcome, RqError>;

    /// Refresh `last_active` and return the participant with its ordered roster.
    async fn status_snapshot(&self, session_id: Uuid) -> Result<RosterSnapshot, RqError>;

    /// Refresh `last_active` only.
    async fn touch(&self, session_id: Uuid) -> Result<QueueEntry, RqError>;

    /// Rewrite `joined_at` and `last_active` to now, moving the participant to
    /// the tail of its group.
    async fn demote(&self, session_id: Uuid) -> Result<QueueEntry, RqError>;

    /// Remove a participant. Fails with `NotFound` if absent.
    async fn remove_entry(&self, session_id: Uuid) -> Result<QueueEntry, RqError>;

    /// Participants ordered by `joined_at`, optionally filtered to one group.
    async fn list_entries(
        &self,
        group_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, RqError>;

    /// Remove every participant in a group, keeping the group itself.
    async fn clear_group(&self, group_name: &str) -> Result<u64, RqError>;

    /// Delete every group other than the default that has no participants.
    ///
    /// Returns the names of the deleted groups.
    async fn reap_empty_groups(&self) -> Result<Vec<String>, RqError>;
}

/// Message used for every unknown-session failure.
pub(crate) const PARTICIPANT_NOT_FOUND: &str = "Participant not found in queue";

pub(crate) fn participant_not_found() -> RqError {
    RqError::NotFound(PARTICIPANT_NOT_FOUND.to_string())
}

pub(crate) fn group_not_found(name: &str) -> RqError {
    RqError::NotFound(format!("Sub-group '{}' not found", name))
}

pub(crate) fn group_exists(name: &str) -> RqError {
    RqError::Conflict(format!("Sub-group '{}' already exists", name))
}
