//! HTTP request handlers for the ReadQueue service.

pub mod groups;
pub mod health;
pub mod metrics;
pub mod queue;
pub mod webrtc;

pub use groups::{create_group, delete_group, list_groups};
pub use health::health_check;
pub use metrics::metrics_handler;
pub use queue::{clear_queue, join_queue, leave_queue, list_queue, queue_action, queue_status};
pub use webrtc::{drain_signals, list_peers, send_signal};
