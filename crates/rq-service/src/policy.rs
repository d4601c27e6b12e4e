//! Capacity and fairness rules shared by the queue stores.
//!
//! Ordering within a group is defined entirely by `joined_at`: a participant's
//! position is its 1-based rank when the group's members are sorted ascending
//! by that key. "Move to back" is implemented by rewriting `joined_at` to the
//! current time, so there is no separate sequence counter.

use crate::errors::RqError;
use crate::models::{QueueEntry, QueueStatusResponse};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// Maximum entries returned by the cross-group listing.
pub const LIST_ALL_LIMIT: usize = 100;

/// Maximum entries returned by the peer listing.
pub const PEERS_LIMIT: usize = 20;

/// Queue capacity policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Maximum participants enqueued in one group.
    pub max_participants_per_group: usize,
}

impl QueuePolicy {
    pub fn new(max_participants_per_group: usize) -> Self {
        Self {
            max_participants_per_group,
        }
    }

    /// Check whether one more participant fits into a group of `current` members.
    pub fn check_capacity(&self, group_name: &str, current: usize) -> Result<(), RqError> {
        if current >= self.max_participants_per_group {
            return Err(RqError::Full(format!(
                "Queue for '{}' is full (maximum {} participants)",
                group_name, self.max_participants_per_group
            )));
        }
        Ok(())
    }
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_PARTICIPANTS_PER_GROUP)
    }
}

/// Sort a roster into queue order. The sort is stable, so entries with equal
/// `joined_at` keep their input order.
pub fn order_roster(roster: &mut [QueueEntry]) {
    roster.sort_by_key(|entry| entry.joined_at);
}

/// 1-based rank of `session_id` within an ordered roster.
pub fn rank_of(roster: &[QueueEntry], session_id: Uuid) -> Option<usize> {
    roster
        .iter()
        .position(|entry| entry.session_id == session_id)
        .map(|idx| idx + 1)
}

/// Build the status view for `session_id` from its group's ordered roster.
///
/// Returns `None` if the session is not part of the roster.
pub fn status_from_roster(
    roster: &[QueueEntry],
    session_id: Uuid,
    group_name: &str,
) -> Option<QueueStatusResponse> {
    let position = rank_of(roster, session_id)?;

    Some(QueueStatusResponse {
        position,
        total_in_queue: roster.len(),
        position1_name: roster.first().map(|e| e.name.clone()),
        position2_name: roster.get(1).map(|e| e.name.clone()),
        is_position1: position == 1,
        is_position2: position == 2,
        sub_group: group_name.to_string(),
    })
}

/// Strictly increasing wall-clock source for ordering keys.
///
/// Each call returns `max(now, last + 1µs)` so two joins or demotions never
/// share a timestamp, even within one clock tick or across a backwards clock
/// step. Microsecond resolution matches PostgreSQL `timestamptz`.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next ordering timestamp.
    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let mut prev = self.last_micros.load(Ordering::SeqCst);

        loop {
            let next = wall.max(prev.saturating_add(1));
            match self.last_micros.compare_exchange(
                prev,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(name: &str, joined_at: DateTime<Utc>) -> QueueEntry {
        QueueEntry {
            session_id: Uuid::new_v4(),
            name: name.to_string(),
            group_name: "General".to_string(),
            joined_at,
            last_active: joined_at,
        }
    }

    #[test]
    fn test_capacity_allows_until_limit() {
        let policy = QueuePolicy::new(20);

        assert!(policy.check_capacity("General", 0).is_ok());
        assert!(policy.check_capacity("General", 19).is_ok());
        assert!(matches!(
            policy.check_capacity("General", 20),
            Err(RqError::Full(msg)) if msg.contains("maximum 20")
        ));
    }

    #[test]
    fn test_order_roster_is_stable_on_ties() {
        let t0 = Utc::now();
        let mut roster = vec![
            entry("late", t0 + Duration::seconds(5)),
            entry("tie-a", t0),
            entry("tie-b", t0),
        ];

        order_roster(&mut roster);

        let names: Vec<&str> = roster.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["tie-a", "tie-b", "late"]);
    }

    #[test]
    fn test_status_from_roster() {
        let t0 = Utc::now();
        let roster = vec![
            entry("Alice", t0),
            entry("Bob", t0 + Duration::seconds(1)),
            entry("Carol", t0 + Duration::seconds(2)),
        ];
        let carol = roster[2].session_id;

        let status = status_from_roster(&roster, carol, "General").unwrap();

        assert_eq!(status.position, 3);
        assert_eq!(status.total_in_queue, 3);
        assert_eq!(status.position1_name.as_deref(), Some("Alice"));
        assert_eq!(status.position2_name.as_deref(), Some("Bob"));
        assert!(!status.is_position1);
        assert!(!status.is_position2);
    }

    #[test]
    fn test_status_for_single_member() {
        let roster = vec![entry("Alice", Utc::now())];
        let status = status_from_roster(&roster, roster[0].session_id, "General").unwrap();

        assert_eq!(status.position, 1);
        assert!(status.is_position1);
        assert_eq!(status.position2_name, None);
    }

    #[test]
    fn test_status_for_unknown_session() {
        let roster = vec![entry("Alice", Utc::now())];
        assert!(status_from_roster(&roster, Uuid::new_v4(), "General").is_none());
    }

    #[test]
    fn test_monotonic_clock_is_strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut last = clock.now();

        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_monotonic_clock_tracks_wall_time() {
        let clock = MonotonicClock::new();
        let before = Utc::now() - Duration::seconds(1);

        assert!(clock.now() > before);
    }
}
