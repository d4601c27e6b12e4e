//! Process-local queue store.
//!
//! One `tokio::sync::Mutex` guards the registry, every roster and the session
//! index together, so compound operations (ensure group, count, insert) are
//! linearized without lock ordering concerns. Rosters are kept in queue order:
//! joins and demotions always append, and the clock never goes backwards.

use super::{
    group_exists, group_not_found, participant_not_found, JoinOutcome, QueueStore, RosterSnapshot,
};
use crate::errors::RqError;
use crate::models::{GroupRecord, QueueEntry, DEFAULT_GROUP};
use crate::policy::{order_roster, rank_of, MonotonicClock, QueuePolicy};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Default)]
struct QueueState {
    groups: HashMap<String, GroupRecord>,
    rosters: HashMap<String, Vec<QueueEntry>>,
    sessions: HashMap<Uuid, String>,
}

impl QueueState {
    fn insert_group(&mut self, name: &str, clock: &MonotonicClock) -> GroupRecord {
        let record = GroupRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: clock.now(),
        };
        self.groups.insert(name.to_string(), record.clone());
        record
    }

    fn entry_mut(&mut self, session_id: Uuid) -> Result<&mut QueueEntry, RqError> {
        let group_name = self
            .sessions
            .get(&session_id)
            .ok_or_else(participant_not_found)?;

        self.rosters
            .get_mut(group_name)
            .and_then(|roster| roster.iter_mut().find(|e| e.session_id == session_id))
            .ok_or_else(participant_not_found)
    }

    fn roster_len(&self, group_name: &str) -> usize {
        self.rosters.get(group_name).map_or(0, Vec::len)
    }

    fn remove_roster(&mut self, group_name: &str) -> u64 {
        let removed = self.rosters.remove(group_name).unwrap_or_default();
        for entry in &removed {
            self.sessions.remove(&entry.session_id);
        }
        removed.len() as u64
    }
}

/// In-memory implementation of [`QueueStore`].
///
/// Created at process start with the default group seeded; dropped at
/// shutdown. Nothing survives a restart.
#[derive(Debug)]
pub struct InMemoryStore {
    state: Mutex<QueueState>,
    clock: MonotonicClock,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let clock = MonotonicClock::new();
        let mut state = QueueState::default();
        state.insert_group(DEFAULT_GROUP, &clock);

        Self {
            state: Mutex::new(state),
            clock,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QueueStore for InMemoryStore {
    async fn ping(&self) -> Result<(), RqError> {
        Ok(())
    }

    #[instrument(skip_all, fields(group = %name))]
    async fn create_group(&self, name: &str) -> Result<GroupRecord, RqError> {
        let mut state = self.state.lock().await;
        if state.groups.contains_key(name) {
            return Err(group_exists(name));
        }
        Ok(state.insert_group(name, &self.clock))
    }

    async fn ensure_group(&self, name: &str) -> Result<bool, RqError> {
        let mut state = self.state.lock().await;
        if state.groups.contains_key(name) {
            return Ok(false);
        }
        state.insert_group(name, &self.clock);
        Ok(true)
    }

    #[instrument(skip_all, fields(group = %name))]
    async fn delete_group(&self, name: &str) -> Result<u64, RqError> {
        let mut state = self.state.lock().await;
        if state.groups.remove(name).is_none() {
            return Err(group_not_found(name));
        }
        Ok(state.remove_roster(name))
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RqError> {
        let state = self.state.lock().await;
        let mut groups: Vec<GroupRecord> = state.groups.values().cloned().collect();
        groups.sort_by_key(|g| g.created_at);
        Ok(groups)
    }

    #[instrument(skip_all, fields(group = %group_name))]
    async fn join(
        &self,
        name: &str,
        group_name: &str,
        max_participants: usize,
    ) -> Result<JoinOutcome, RqError> {
        let mut state = self.state.lock().await;

        let group_created = if state.groups.contains_key(group_name) {
            false
        } else {
            state.insert_group(group_name, &self.clock);
            true
        };

        QueuePolicy::new(max_participants).check_capacity(group_name, state.roster_len(group_name))?;

        let now = self.clock.now();
        let entry = QueueEntry {
            session_id: Uuid::new_v4(),
            name: name.to_string(),
            group_name: group_name.to_string(),
            joined_at: now,
            last_active: now,
        };

        state
            .sessions
            .insert(entry.session_id, group_name.to_string());
        let roster = state.rosters.entry(group_name.to_string()).or_default();
        roster.push(entry.clone());
        order_roster(roster);

        let position = rank_of(roster, entry.session_id).ok_or_else(|| {
            RqError::Internal("joined participant missing from roster".to_string())
        })?;

        Ok(JoinOutcome {
            entry,
            position,
            group_created,
        })
    }

    async fn status_snapshot(&self, session_id: Uuid) -> Result<RosterSnapshot, RqError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let entry = state.entry_mut(session_id)?;
        entry.last_active = now;
        let entry = entry.clone();

        let mut roster = state
            .rosters
            .get(&entry.group_name)
            .cloned()
            .unwrap_or_default();
        order_roster(&mut roster);

        Ok(RosterSnapshot { entry, roster })
    }

    async fn touch(&self, session_id: Uuid) -> Result<QueueEntry, RqError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let entry = state.entry_mut(session_id)?;
        entry.last_active = now;
        Ok(entry.clone())
    }

    async fn demote(&self, session_id: Uuid) -> Result<QueueEntry, RqError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let group_name = state
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(participant_not_found)?;
        let roster = state
            .rosters
            .get_mut(&group_name)
            .ok_or_else(participant_not_found)?;
        let idx = roster
            .iter()
            .position(|e| e.session_id == session_id)
            .ok_or_else(participant_not_found)?;

        // Re-append so ties (if the clock ever produced one) still resolve to the tail
        let mut entry = roster.remove(idx);
        entry.joined_at = now;
        entry.last_active = now;
        roster.push(entry.clone());

        debug!(target: "rq.repository.memory", session_id = %session_id, "Moved participant to tail");
        Ok(entry)
    }

    async fn remove_entry(&self, session_id: Uuid) -> Result<QueueEntry, RqError> {
        let mut state = self.state.lock().await;

        let group_name = state
            .sessions
            .remove(&session_id)
            .ok_or_else(participant_not_found)?;
        let roster = state
            .rosters
            .get_mut(&group_name)
            .ok_or_else(participant_not_found)?;
        let idx = roster
            .iter()
            .position(|e| e.session_id == session_id)
            .ok_or_else(participant_not_found)?;

        Ok(roster.remove(idx))
    }

    async fn list_entries(
        &self,
        group_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, RqError> {
        let state = self.state.lock().await;

        let mut entries: Vec<QueueEntry> = match group_name {
            Some(group) => state.rosters.get(group).cloned().unwrap_or_default(),
            None => state.rosters.values().flatten().cloned().collect(),
        };
        order_roster(&mut entries);
        entries.truncate(limit);

        Ok(entries)
    }

    #[instrument(skip_all, fields(group = %group_name))]
    async fn clear_group(&self, group_name: &str) -> Result<u64, RqError> {
        let mut state = self.state.lock().await;
        Ok(state.remove_roster(group_name))
    }

    async fn reap_empty_groups(&self) -> Result<Vec<String>, RqError> {
        let mut state = self.state.lock().await;

        let empty: Vec<String> = state
            .groups
            .keys()
            .filter(|name| name.as_str() != DEFAULT_GROUP && state.roster_len(name) == 0)
            .cloned()
            .collect();

        for name in &empty {
            state.groups.remove(name);
            state.rosters.remove(name);
        }

        Ok(empty)
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
    use std::sync::Arc;

    #[tokio::test]
    async fn test_default_group_is_seeded() {
        let store = InMemoryStore::new();
        let groups = store.list_groups().await.unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, DEFAULT_GROUP);
    }

    #[tokio::test]
    async fn test_create_group_conflict() {
        let store = InMemoryStore::new();
        store.create_group("Lab A").await.unwrap();

        let result = store.create_group("Lab A").await;
        assert!(matches!(result, Err(RqError::Conflict(_))));

        // Names are case-sensitive
        assert!(store.create_group("lab a").await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_group_is_idempotent() {
        let store = InMemoryStore::new();

        assert!(store.ensure_group("Lab A").await.unwrap());
        assert!(!store.ensure_group("Lab A").await.unwrap());
        assert_eq!(store.list_groups().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_join_creates_group_and_orders_positions() {
        let store = InMemoryStore::new();

        let alice = store.join("Alice", "Lab A", 20).await.unwrap();
        let bob = store.join("Bob", "Lab A", 20).await.unwrap();

        assert!(alice.group_created);
        assert!(!bob.group_created);
        assert_eq!(alice.position, 1);
        assert_eq!(bob.position, 2);
        assert!(bob.entry.joined_at > alice.entry.joined_at);
    }

    #[tokio::test]
    async fn test_join_rejects_when_full() {
        let store = InMemoryStore::new();
        for i in 0..3 {
            store.join(&format!("p{i}"), "General", 3).await.unwrap();
        }

        let result = store.join("late", "General", 3).await;
        assert!(matches!(result, Err(RqError::Full(_))));

        // Other groups are unaffected
        assert!(store.join("other", "Lab A", 3).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_joins_respect_capacity() {
        let store = Arc::new(InMemoryStore::new());

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.join(&format!("p{i}"), "General", 20).await })
            })
            .collect();

        let mut ok = 0;
        let mut full = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(RqError::Full(_)) => full += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(ok, 20);
        assert_eq!(full, 30);
        assert_eq!(
            store.list_entries(Some("General"), 100).await.unwrap().len(),
            20
        );
    }

    #[tokio::test]
    async fn test_demote_moves_to_tail() {
        let store = InMemoryStore::new();
        let alice = store.join("Alice", "General", 20).await.unwrap();
        store.join("Bob", "General", 20).await.unwrap();
        store.join("Carol", "General", 20).await.unwrap();

        store.demote(alice.entry.session_id).await.unwrap();

        let snapshot = store.status_snapshot(alice.entry.session_id).await.unwrap();
        let names: Vec<&str> = snapshot.roster.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Carol", "Alice"]);
    }

    #[tokio::test]
    async fn test_touch_refreshes_last_active_only() {
        let store = InMemoryStore::new();
        let alice = store.join("Alice", "General", 20).await.unwrap();

        let touched = store.touch(alice.entry.session_id).await.unwrap();

        assert_eq!(touched.joined_at, alice.entry.joined_at);
        assert!(touched.last_active > alice.entry.last_active);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let store = InMemoryStore::new();
        let unknown = Uuid::new_v4();

        assert!(matches!(
            store.status_snapshot(unknown).await,
            Err(RqError::NotFound(_))
        ));
        assert!(matches!(store.touch(unknown).await, Err(RqError::NotFound(_))));
        assert!(matches!(store.demote(unknown).await, Err(RqError::NotFound(_))));
        assert!(matches!(
            store.remove_entry(unknown).await,
            Err(RqError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_group_cascades() {
        let store = InMemoryStore::new();
        let alice = store.join("Alice", "Lab A", 20).await.unwrap();
        store.join("Bob", "Lab A", 20).await.unwrap();
        store.join("Carol", "General", 20).await.unwrap();

        let removed = store.delete_group("Lab A").await.unwrap();

        assert_eq!(removed, 2);
        assert!(matches!(
            store.status_snapshot(alice.entry.session_id).await,
            Err(RqError::NotFound(_))
        ));
        let remaining = store.list_entries(None, 100).await.unwrap();
        assert!(remaining.iter().all(|e| e.group_name != "Lab A"));
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_group() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.delete_group("Nope").await,
            Err(RqError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_group_keeps_group() {
        let store = InMemoryStore::new();
        store.join("Alice", "Lab A", 20).await.unwrap();
        store.join("Bob", "Lab A", 20).await.unwrap();

        assert_eq!(store.clear_group("Lab A").await.unwrap(), 2);
        assert_eq!(store.clear_group("Lab A").await.unwrap(), 0);
        assert!(store
            .list_groups()
            .await
            .unwrap()
            .iter()
            .any(|g| g.name == "Lab A"));
    }

    #[tokio::test]
    async fn test_list_entries_orders_across_groups_and_caps() {
        let store = InMemoryStore::new();
        store.join("a", "General", 20).await.unwrap();
        store.join("b", "Lab A", 20).await.unwrap();
        store.join("c", "General", 20).await.unwrap();

        let all = store.list_entries(None, 100).await.unwrap();
        let names: Vec<&str> = all.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let capped = store.list_entries(None, 2).await.unwrap();
        assert_eq!(capped.len(), 2);

        let lab = store.list_entries(Some("Lab A"), 100).await.unwrap();
        assert_eq!(lab.len(), 1);
    }

    #[tokio::test]
    async fn test_reap_removes_only_empty_non_default_groups() {
        let store = InMemoryStore::new();
        store.create_group("Empty").await.unwrap();
        store.join("Alice", "Busy", 20).await.unwrap();

        let reaped = store.reap_empty_groups().await.unwrap();

        assert_eq!(reaped, vec!["Empty".to_string()]);
        let names: Vec<String> = store
            .list_groups()
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert!(names.contains(&DEFAULT_GROUP.to_string()));
        assert!(names.contains(&"Busy".to_string()));
        assert!(!names.contains(&"Empty".to_string()));
    }
}
