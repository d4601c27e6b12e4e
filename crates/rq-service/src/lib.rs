//! ReadQueue Service Library
//!
//! A fair turn queue for shared reading stations, plus a small signaling
//! relay that lets two participants set up a direct WebRTC connection.
//!
//! - Named sub-groups, each with its own queue (the default group is "General")
//! - Position polling, start/skip/finish actions, and leaving
//! - Periodic removal of empty sub-groups
//! - Buffered offer/answer/ICE mailboxes drained by the recipient
//!
//! # Architecture
//!
//! Handler -> Service -> Store:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//! ```
//!
//! State lives in PostgreSQL when `DATABASE_URL` is set and in process memory
//! otherwise. Signaling mailboxes are always in memory.
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Domain, request and response types
//! - `observability` - Prometheus metrics
//! - `policy` - Capacity limit and queue ordering rules
//! - `repositories` - `QueueStore` and its implementations
//! - `routes` - Axum router setup
//! - `services` - Group registry, turn queue, signaling relay
//! - `tasks` - Background group reaper

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod policy;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
