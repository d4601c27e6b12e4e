//! Group reaper background task.
//!
//! Every interval, deletes each group other than the default one that has no
//! participants. The first sweep happens one full interval after startup.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token fires. A sweep already in
//! progress runs to completion first; no new sweep is started.

use crate::observability::metrics;
use crate::repositories::QueueStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Start the group reaper.
///
/// # Arguments
///
/// * `store` - Store to sweep
/// * `interval` - Time between sweeps
/// * `cancel_token` - Token for graceful shutdown
///
/// # Returns
///
/// Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "rq.task.group_reaper")]
pub async fn start_group_reaper(
    store: Arc<dyn QueueStore>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "rq.task.group_reaper",
        interval_seconds = interval.as_secs(),
        "Starting group reaper task"
    );

    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_reap_cycle(store.as_ref()).await;
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "rq.task.group_reaper",
                    "Group reaper received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "rq.task.group_reaper", "Group reaper stopped");
}

/// Run a single sweep. Failures are logged and otherwise swallowed so the
/// next tick tries again.
pub(crate) async fn run_reap_cycle(store: &dyn QueueStore) {
    match store.reap_empty_groups().await {
        Ok(reaped) => {
            metrics::record_reaper_sweep("success", reaped.len());
            if !reaped.is_empty() {
                info!(
                    target: "rq.task.group_reaper",
                    count = reaped.len(),
                    groups = ?reaped,
                    "Reaped empty sub-groups"
                );
            }
        }
        Err(e) => {
            metrics::record_reaper_sweep("error", 0);
            error!(
                target: "rq.task.group_reaper",
                error = %e,
                "Group reaper sweep failed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::RqError;
    use crate::models::{GroupRecord, QueueEntry};
    use crate::repositories::{InMemoryStore, JoinOutcome, RosterSnapshot};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    const INTERVAL: Duration = Duration::from_secs(60);

    /// Store whose every operation fails. Counts reap attempts.
    #[derive(Default)]
    struct FailingStore {
        reap_calls: AtomicUsize,
    }

    fn down() -> RqError {
        RqError::Database("connection refused".to_string())
    }

    #[async_trait::async_trait]
    impl QueueStore for FailingStore {
        async fn ping(&self) -> Result<(), RqError> {
            Err(down())
        }
        async fn create_group(&self, _name: &str) -> Result<GroupRecord, RqError> {
            Err(down())
        }
        async fn ensure_group(&self, _name: &str) -> Result<bool, RqError> {
            Err(down())
        }
        async fn delete_group(&self, _name: &str) -> Result<u64, RqError> {
            Err(down())
        }
        async fn list_groups(&self) -> Result<Vec<GroupRecord>, RqError> {
            Err(down())
        }
        async fn join(&self, _name: &str, _group: &str, _max: usize) -> Result<JoinOutcome, RqError> {
            Err(down())
        }
        async fn status_snapshot(&self, _session_id: Uuid) -> Result<RosterSnapshot, RqError> {
            Err(down())
        }
        async fn touch(&self, _session_id: Uuid) -> Result<QueueEntry, RqError> {
            Err(down())
        }
        async fn demote(&self, _session_id: Uuid) -> Result<QueueEntry, RqError> {
            Err(down())
        }
        async fn remove_entry(&self, _session_id: Uuid) -> Result<QueueEntry, RqError> {
            Err(down())
        }
        async fn list_entries(
            &self,
            _group: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<QueueEntry>, RqError> {
            Err(down())
        }
        async fn clear_group(&self, _group: &str) -> Result<u64, RqError> {
            Err(down())
        }
        async fn reap_empty_groups(&self) -> Result<Vec<String>, RqError> {
            self.reap_calls.fetch_add(1, Ordering::SeqCst);
            Err(down())
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn group_names(store: &InMemoryStore) -> Vec<String> {
        store
            .list_groups()
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_sweep_waits_one_interval() {
        let store = Arc::new(InMemoryStore::new());
        store.create_group("Lab A").await.unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(start_group_reaper(store.clone(), INTERVAL, cancel.clone()));
        settle().await;

        assert!(group_names(&store).await.contains(&"Lab A".to_string()));

        tokio::time::advance(INTERVAL).await;
        settle().await;

        assert_eq!(group_names(&store).await, vec!["General".to_string()]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_occupied_groups_survive() {
        let store = Arc::new(InMemoryStore::new());
        store.join("Alice", "Lab A", 20).await.unwrap();
        store.create_group("Lab B").await.unwrap();

        run_reap_cycle(store.as_ref()).await;

        let names = group_names(&store).await;
        assert!(names.contains(&"Lab A".to_string()));
        assert!(!names.contains(&"Lab B".to_string()));
        assert!(names.contains(&"General".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_do_not_stop_the_loop() {
        let store = Arc::new(FailingStore::default());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(start_group_reaper(store.clone(), INTERVAL, cancel.clone()));
        settle().await;
        assert_eq!(store.reap_calls.load(Ordering::SeqCst), 0);

        for expected in 1..=3 {
            tokio::time::advance(INTERVAL).await;
            settle().await;
            assert_eq!(store.reap_calls.load(Ordering::SeqCst), expected);
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_on_cancellation_without_sweeping() {
        let store = Arc::new(FailingStore::default());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(start_group_reaper(store.clone(), INTERVAL, cancel.clone()));
        settle().await;

        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(store.reap_calls.load(Ordering::SeqCst), 0);
    }
}
