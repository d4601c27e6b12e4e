//! Service layer for the ReadQueue service.
//!
//! Services own the business rules and sit between the HTTP handlers and the
//! `QueueStore`.
//!
//! # Components
//!
//! - `group_service` - Group registry (create, delete, list, ensure)
//! - `queue_service` - Turn queue (join, status, actions, leave, listings)
//! - `signal_relay` - In-memory WebRTC signaling mailboxes

pub mod group_service;
pub mod queue_service;
pub mod signal_relay;

pub use group_service::GroupService;
pub use queue_service::QueueService;
pub use signal_relay::SignalRelay;
