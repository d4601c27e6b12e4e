//! Turn queue service.
//!
//! Participants join a group, poll their position, act on their turn, and
//! leave. Positions are never cached: every status call recomputes the rank
//! from the group's current `joined_at` order, so leaves, skips and finishes
//! are reflected immediately.

use crate::errors::RqError;
use crate::models::{
    validate_display_name, validate_group_name, PeerInfo, QueueAction, QueueEntry,
    QueueStatusResponse,
};
use crate::observability::metrics;
use crate::policy::{status_from_roster, QueuePolicy, LIST_ALL_LIMIT, PEERS_LIMIT};
use crate::repositories::{participant_not_found, JoinOutcome, QueueStore};
use crate::services::GroupService;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Service for turn queue operations.
#[derive(Clone)]
pub struct QueueService {
    store: Arc<dyn QueueStore>,
    groups: GroupService,
    policy: QueuePolicy,
}

/// Parse a client-supplied session token. Malformed tokens cannot name an
/// enqueued participant, so they are reported the same way as unknown ones.
fn parse_session_id(session_id: &str) -> Result<Uuid, RqError> {
    Uuid::parse_str(session_id.trim()).map_err(|_| participant_not_found())
}

impl QueueService {
    pub fn new(store: Arc<dyn QueueStore>, policy: QueuePolicy) -> Self {
        let groups = GroupService::new(Arc::clone(&store));
        Self {
            store,
            groups,
            policy,
        }
    }

    /// Join `group_name`, creating the group if needed.
    ///
    /// # Errors
    ///
    /// - `RqError::InvalidArgument` - Invalid display or group name
    /// - `RqError::Full` - Group already at capacity
    #[instrument(skip_all, name = "rq.queue.join", fields(group = %group_name))]
    pub async fn join(&self, name: &str, group_name: &str) -> Result<JoinOutcome, RqError> {
        let name = validate_display_name(name)?;
        let group_name = validate_group_name(group_name)?;
        self.groups.ensure_exists(group_name).await?;

        // The store upserts the group again inside the join, so a reaper sweep
        // between the two calls cannot strand the participant.
        let outcome = match self
            .store
            .join(name, group_name, self.policy.max_participants_per_group)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::record_queue_join(e.code());
                return Err(e);
            }
        };
        metrics::record_queue_join("success");

        if outcome.group_created {
            debug!(
                target: "rq.services.queue",
                group = %group_name,
                "Sub-group re-created during join"
            );
        }
        info!(
            target: "rq.services.queue",
            group = %group_name,
            session_id = %outcome.entry.session_id,
            position = outcome.position,
            "Participant joined queue"
        );

        Ok(outcome)
    }

    /// Current position of a participant. Also refreshes its liveness.
    ///
    /// # Errors
    ///
    /// - `RqError::NotFound` - Session not enqueued
    #[instrument(skip_all, name = "rq.queue.status")]
    pub async fn status(&self, session_id: &str) -> Result<QueueStatusResponse, RqError> {
        let session_id = parse_session_id(session_id)?;
        let snapshot = self.store.status_snapshot(session_id).await?;

        status_from_roster(&snapshot.roster, session_id, &snapshot.entry.group_name)
            .ok_or_else(participant_not_found)
    }

    /// Apply `action` to a participant's queue entry.
    ///
    /// `start` only refreshes liveness. `skip` and `finish` move the
    /// participant to the tail of its group.
    ///
    /// # Errors
    ///
    /// - `RqError::InvalidArgument` - Unknown action
    /// - `RqError::NotFound` - Session not enqueued
    #[instrument(skip_all, name = "rq.queue.act", fields(action = %action))]
    pub async fn act(
        &self,
        session_id: &str,
        action: &str,
    ) -> Result<(QueueAction, QueueEntry), RqError> {
        let session_id = parse_session_id(session_id)?;
        let action: QueueAction = action.parse()?;

        let entry = if action.demotes() {
            self.store.demote(session_id).await?
        } else {
            self.store.touch(session_id).await?
        };
        metrics::record_queue_action(action.as_str());

        debug!(
            target: "rq.services.queue",
            session_id = %session_id,
            action = %action,
            group = %entry.group_name,
            "Processed queue action"
        );

        Ok((action, entry))
    }

    /// Remove a participant from its group.
    ///
    /// # Errors
    ///
    /// - `RqError::NotFound` - Session not enqueued
    #[instrument(skip_all, name = "rq.queue.leave")]
    pub async fn leave(&self, session_id: &str) -> Result<QueueEntry, RqError> {
        let session_id = parse_session_id(session_id)?;
        let entry = self.store.remove_entry(session_id).await?;
        metrics::record_queue_departures("leave", 1);

        info!(
            target: "rq.services.queue",
            session_id = %session_id,
            group = %entry.group_name,
            "Participant left queue"
        );

        Ok(entry)
    }

    /// Every participant across all groups in join order, capped.
    pub async fn list_all(&self) -> Result<Vec<QueueEntry>, RqError> {
        self.store.list_entries(None, LIST_ALL_LIMIT).await
    }

    /// Remove every participant in a group. Returns the count removed.
    #[instrument(skip_all, name = "rq.queue.clear", fields(group = %group_name))]
    pub async fn clear_group(&self, group_name: &str) -> Result<u64, RqError> {
        let group_name = group_name.trim();
        let cleared = self.store.clear_group(group_name).await?;
        metrics::record_queue_departures("clear", cleared);

        info!(
            target: "rq.services.queue",
            group = %group_name,
            count = cleared,
            "Admin cleared sub-group queue"
        );

        Ok(cleared)
    }

    /// Participants reachable over the signaling relay, in join order, capped.
    pub async fn peers(&self, group_name: Option<&str>) -> Result<Vec<PeerInfo>, RqError> {
        let group_name = group_name.map(str::trim).filter(|name| !name.is_empty());
        let entries = self.store.list_entries(group_name, PEERS_LIMIT).await?;
        Ok(entries.into_iter().map(PeerInfo::from).collect())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_GROUP;
    use crate::repositories::InMemoryStore;

    fn service() -> QueueService {
        QueueService::new(Arc::new(InMemoryStore::new()), QueuePolicy::new(20))
    }

    async fn join(queue: &QueueService, name: &str) -> String {
        queue
            .join(name, DEFAULT_GROUP)
            .await
            .unwrap()
            .entry
            .session_id
            .to_string()
    }

    #[tokio::test]
    async fn test_alice_and_bob_take_turns() {
        let queue = service();

        let alice = queue.join("Alice", DEFAULT_GROUP).await.unwrap();
        assert_eq!(alice.position, 1);
        let bob = queue.join("Bob", DEFAULT_GROUP).await.unwrap();
        assert_eq!(bob.position, 2);

        let alice_id = alice.entry.session_id.to_string();
        let bob_id = bob.entry.session_id.to_string();

        let bob_status = queue.status(&bob_id).await.unwrap();
        assert_eq!(bob_status.position1_name.as_deref(), Some("Alice"));
        assert!(bob_status.is_position2);

        queue.act(&alice_id, "finish").await.unwrap();

        assert_eq!(queue.status(&alice_id).await.unwrap().position, 2);
        let bob_status = queue.status(&bob_id).await.unwrap();
        assert_eq!(bob_status.position, 1);
        assert!(bob_status.is_position1);
        assert_eq!(bob_status.position2_name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_twenty_first_join_is_full() {
        let queue = service();
        for i in 0..20 {
            queue.join(&format!("p{i}"), DEFAULT_GROUP).await.unwrap();
        }

        assert!(matches!(
            queue.join("late", DEFAULT_GROUP).await,
            Err(RqError::Full(_))
        ));
    }

    #[tokio::test]
    async fn test_ranks_are_a_permutation() {
        let queue = service();
        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(join(&queue, &format!("p{i}")).await);
        }
        queue.act(&ids[2], "skip").await.unwrap();
        queue.act(&ids[0], "finish").await.unwrap();

        let mut ranks = Vec::new();
        for id in &ids {
            ranks.push(queue.status(id).await.unwrap().position);
        }
        ranks.sort_unstable();
        assert_eq!(ranks, (1..=6).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_skip_from_front_moves_to_last() {
        let queue = service();
        let first = join(&queue, "first").await;
        for i in 0..4 {
            join(&queue, &format!("p{i}")).await;
        }

        queue.act(&first, "skip").await.unwrap();

        let status = queue.status(&first).await.unwrap();
        assert_eq!(status.position, status.total_in_queue);
        assert_eq!(status.position1_name.as_deref(), Some("p0"));
    }

    #[tokio::test]
    async fn test_start_keeps_position() {
        let queue = service();
        let alice = join(&queue, "Alice").await;
        join(&queue, "Bob").await;

        let (action, entry) = queue.act(&alice, "start").await.unwrap();

        assert_eq!(action, QueueAction::Start);
        assert!(entry.last_active > entry.joined_at);
        assert_eq!(queue.status(&alice).await.unwrap().position, 1);
    }

    #[tokio::test]
    async fn test_unknown_action_is_invalid() {
        let queue = service();
        let alice = join(&queue, "Alice").await;

        assert!(matches!(
            queue.act(&alice, "pause").await,
            Err(RqError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_leave_shifts_ranks_down() {
        let queue = service();
        let a = join(&queue, "a").await;
        let b = join(&queue, "b").await;
        let c = join(&queue, "c").await;

        queue.leave(&a).await.unwrap();

        assert!(matches!(queue.status(&a).await, Err(RqError::NotFound(_))));
        assert_eq!(queue.status(&b).await.unwrap().position, 1);
        assert_eq!(queue.status(&c).await.unwrap().position, 2);
        assert!(matches!(queue.leave(&a).await, Err(RqError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_malformed_session_is_not_found() {
        let queue = service();

        assert!(matches!(
            queue.status("not-a-uuid").await,
            Err(RqError::NotFound(_))
        ));
        assert!(matches!(
            queue.act("not-a-uuid", "start").await,
            Err(RqError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_groups_are_ranked_independently() {
        let queue = service();
        join(&queue, "g1").await;
        let lab = queue.join("l1", "Lab A").await.unwrap();

        assert_eq!(lab.position, 1);
        let status = queue
            .status(&lab.entry.session_id.to_string())
            .await
            .unwrap();
        assert_eq!(status.total_in_queue, 1);
        assert_eq!(status.sub_group, "Lab A");
    }

    #[tokio::test]
    async fn test_clear_group_and_listings() {
        let queue = service();
        join(&queue, "g1").await;
        queue.join("l1", "Lab A").await.unwrap();
        queue.join("l2", "Lab A").await.unwrap();

        assert_eq!(queue.list_all().await.unwrap().len(), 3);
        assert_eq!(queue.peers(Some("Lab A")).await.unwrap().len(), 2);
        assert_eq!(queue.peers(None).await.unwrap().len(), 3);

        assert_eq!(queue.clear_group("Lab A").await.unwrap(), 2);

        let all = queue.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "g1");
    }

    #[tokio::test]
    async fn test_group_names_are_trimmed_everywhere() {
        let queue = service();
        let joined = queue.join("l1", "  Lab A ").await.unwrap();
        assert_eq!(joined.entry.group_name, "Lab A");
        queue.join("l2", "Lab A").await.unwrap();

        assert_eq!(queue.peers(Some(" Lab A ")).await.unwrap().len(), 2);
        assert_eq!(queue.clear_group("Lab A  ").await.unwrap(), 2);
        assert!(queue.peers(Some("Lab A")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_join_registers_new_group() {
        let store = Arc::new(InMemoryStore::new());
        let queue = QueueService::new(store.clone(), QueuePolicy::new(20));
        queue.join("l1", "Lab C").await.unwrap();

        let names: Vec<String> = store
            .list_groups()
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec![DEFAULT_GROUP.to_string(), "Lab C".to_string()]);
    }

    #[tokio::test]
    async fn test_peers_are_capped() {
        let queue = QueueService::new(Arc::new(InMemoryStore::new()), QueuePolicy::new(50));
        for i in 0..25 {
            queue.join(&format!("p{i}"), DEFAULT_GROUP).await.unwrap();
        }

        let peers = queue.peers(None).await.unwrap();
        assert_eq!(peers.len(), PEERS_LIMIT);
        assert_eq!(peers[0].name, "p0");
    }
}
