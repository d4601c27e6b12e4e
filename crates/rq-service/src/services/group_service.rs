//! Group registry service.
//!
//! Groups partition the turn queue. The default group always exists and
//! cannot be deleted; any other group may be created explicitly, created
//! implicitly by a join, deleted explicitly, or retired by the reaper once
//! it is empty.

use crate::errors::RqError;
use crate::models::{is_default_group, validate_group_name, GroupRecord, DEFAULT_GROUP};
use crate::observability::metrics;
use crate::repositories::QueueStore;
use std::sync::Arc;
use tracing::{info, instrument};

/// Service for group registry operations.
#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn QueueStore>,
}

impl GroupService {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Create a group.
    ///
    /// # Errors
    ///
    /// - `RqError::InvalidArgument` - Empty or overlong name
    /// - `RqError::Conflict` - A group with this name exists
    #[instrument(skip_all, name = "rq.groups.create", fields(group = %name))]
    pub async fn create(&self, name: &str) -> Result<GroupRecord, RqError> {
        let name = validate_group_name(name)?;
        let record = self.store.create_group(name).await?;

        info!(
            target: "rq.services.groups",
            group = %record.name,
            group_id = %record.id,
            "Sub-group created"
        );

        Ok(record)
    }

    /// Delete a group and every participant queued in it.
    ///
    /// Returns the number of participants removed.
    ///
    /// # Errors
    ///
    /// - `RqError::Forbidden` - The default group (compared case-insensitively)
    /// - `RqError::NotFound` - No such group
    #[instrument(skip_all, name = "rq.groups.delete", fields(group = %name))]
    pub async fn delete(&self, name: &str) -> Result<u64, RqError> {
        let name = name.trim();
        if is_default_group(name) {
            return Err(RqError::Forbidden(format!(
                "Cannot delete the '{}' sub-group",
                DEFAULT_GROUP
            )));
        }

        let cleared = self.store.delete_group(name).await?;
        metrics::record_queue_departures("group_deleted", cleared);

        info!(
            target: "rq.services.groups",
            group = %name,
            participants_cleared = cleared,
            "Sub-group deleted"
        );

        Ok(cleared)
    }

    /// All groups, oldest first.
    pub async fn list(&self) -> Result<Vec<GroupRecord>, RqError> {
        self.store.list_groups().await
    }

    /// Create the group if it does not exist yet. Idempotent.
    ///
    /// `QueueService::join` calls this before enqueuing.
    pub async fn ensure_exists(&self, name: &str) -> Result<(), RqError> {
        let name = validate_group_name(name)?;
        if self.store.ensure_group(name).await? {
            info!(target: "rq.services.groups", group = %name, "Auto-created sub-group");
        }
        Ok(())
    }
}
