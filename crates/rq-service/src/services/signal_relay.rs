//! WebRTC signaling relay.
//!
//! Each recipient session has a mailbox of handshake envelopes that is held
//! in process memory until the recipient drains it. Senders and recipients
//! are not checked against the queue; any session id can address any other,
//! and the message `type` is forwarded as given.
//!
//! Mailboxes are bounded. Once a mailbox holds `capacity` envelopes, the
//! oldest one is dropped to make room for the next.

use crate::models::{SignalEnvelope, SignalKind};
use crate::observability::metrics;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// In-memory mailboxes keyed by recipient session id.
#[derive(Debug)]
pub struct SignalRelay {
    mailboxes: Mutex<HashMap<String, VecDeque<SignalEnvelope>>>,
    capacity: usize,
}

impl SignalRelay {
    /// Create a relay whose mailboxes hold at most `capacity` envelopes.
    pub fn new(capacity: usize) -> Self {
        Self {
            mailboxes: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append an envelope to `to`'s mailbox. Any kind is accepted.
    #[instrument(skip_all, name = "rq.relay.send", fields(kind = %kind))]
    pub async fn send(&self, from: &str, to: &str, kind: &str, data: serde_json::Value) {
        let from = from.trim();
        let to = to.trim();
        let label = SignalKind::classify(kind).as_str();

        let envelope = SignalEnvelope {
            from: from.to_string(),
            kind: kind.to_string(),
            data,
            timestamp: Utc::now(),
        };

        let mut mailboxes = self.mailboxes.lock().await;
        let mailbox = mailboxes.entry(to.to_string()).or_default();
        if mailbox.len() >= self.capacity {
            mailbox.pop_front();
            metrics::record_signal_dropped();
            warn!(
                target: "rq.services.relay",
                to = %to,
                capacity = self.capacity,
                "Mailbox full, dropped oldest signal"
            );
        }
        mailbox.push_back(envelope);
        let depth = mailbox.len();
        metrics::set_signal_mailboxes(mailboxes.len());
        drop(mailboxes);

        metrics::record_signal(label);
        debug!(
            target: "rq.services.relay",
            from = %from,
            to = %to,
            depth = depth,
            "Signal stored"
        );
    }

    /// Take every pending envelope for `session_id`, oldest first.
    ///
    /// The mailbox is removed as part of the same critical section, so an
    /// envelope is returned by at most one drain.
    pub async fn drain(&self, session_id: &str) -> Vec<SignalEnvelope> {
        let mut mailboxes = self.mailboxes.lock().await;
        let drained = mailboxes.remove(session_id.trim());
        metrics::set_signal_mailboxes(mailboxes.len());
        drop(mailboxes);

        drained.map(Vec::from).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drain_returns_send_order() {
        let relay = SignalRelay::new(16);

        relay.send("a", "b", "offer", json!({"sdp": "o"})).await;
        relay
            .send("a", "b", "ice-candidate", json!({"candidate": "c1"}))
            .await;
        relay.send("c", "b", "answer", json!({"sdp": "x"})).await;

        let signals = relay.drain("b").await;
        let kinds: Vec<&str> = signals.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["offer", "ice-candidate", "answer"]);
        assert_eq!(signals[2].from, "c");
        assert_eq!(signals[0].data, json!({"sdp": "o"}));
    }

    #[tokio::test]
    async fn test_second_drain_is_empty() {
        let relay = SignalRelay::new(16);
        relay.send("a", "b", "offer", json!(null)).await;

        assert_eq!(relay.drain("b").await.len(), 1);
        assert!(relay.drain("b").await.is_empty());
    }

    #[tokio::test]
    async fn test_drain_unknown_mailbox_is_empty() {
        let relay = SignalRelay::new(16);
        assert!(relay.drain("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn test_mailboxes_are_per_recipient() {
        let relay = SignalRelay::new(16);
        relay.send("a", "b", "offer", json!(1)).await;
        relay.send("b", "a", "answer", json!(2)).await;

        let for_a = relay.drain("a").await;
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].kind, "answer");
        assert_eq!(relay.drain("b").await.len(), 1);
    }

    #[tokio::test]
    async fn test_full_mailbox_drops_oldest() {
        let relay = SignalRelay::new(3);
        for i in 0..5 {
            relay.send("a", "b", "ice-candidate", json!(i)).await;
        }

        let payloads: Vec<serde_json::Value> =
            relay.drain("b").await.into_iter().map(|s| s.data).collect();
        assert_eq!(payloads, vec![json!(2), json!(3), json!(4)]);
    }

    #[tokio::test]
    async fn test_arbitrary_kind_is_delivered() {
        let relay = SignalRelay::new(16);
        relay
            .send("a", "b", "renegotiate", json!({"reason": "codec"}))
            .await;

        let signals = relay.drain("b").await;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, "renegotiate");
        assert_eq!(signals[0].data, json!({"reason": "codec"}));
    }

    #[tokio::test]
    async fn test_blank_ids_are_stored_as_given() {
        let relay = SignalRelay::new(16);
        relay.send("  ", "  ", "offer", json!(null)).await;

        let signals = relay.drain("").await;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].from, "");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_send_and_drain_loses_nothing() {
        const SENDERS: usize = 8;
        const PER_SENDER: usize = 50;

        let relay = Arc::new(SignalRelay::new(SENDERS * PER_SENDER));

        let mut senders = Vec::with_capacity(SENDERS);
        for sender in 0..SENDERS {
            let relay = Arc::clone(&relay);
            senders.push(tokio::spawn(async move {
                for seq in 0..PER_SENDER {
                    relay
                        .send(
                            &format!("s{sender}"),
                            "target",
                            "ice-candidate",
                            json!(format!("{sender}-{seq}")),
                        )
                        .await;
                    tokio::task::yield_now().await;
                }
            }));
        }

        let drainer = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move {
                let mut drained = Vec::new();
                for _ in 0..200 {
                    drained.extend(relay.drain("target").await);
                    tokio::task::yield_now().await;
                }
                drained
            })
        };

        for handle in senders {
            handle.await.unwrap();
        }
        let mut drained = drainer.await.unwrap();
        drained.extend(relay.drain("target").await);

        assert_eq!(drained.len(), SENDERS * PER_SENDER);
        let unique: HashSet<String> = drained
            .iter()
            .map(|s| s.data.as_str().unwrap().to_string())
            .collect();
        assert_eq!(unique.len(), SENDERS * PER_SENDER);

        // Per-sender order survives interleaving.
        for sender in 0..SENDERS {
            let from = format!("s{sender}");
            let seqs: Vec<String> = drained
                .iter()
                .filter(|s| s.from == from)
                .map(|s| s.data.as_str().unwrap().to_string())
                .collect();
            let expected: Vec<String> =
                (0..PER_SENDER).map(|seq| format!("{sender}-{seq}")).collect();
            assert_eq!(seqs, expected);
        }
    }
}
