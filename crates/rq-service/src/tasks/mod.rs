//! Background tasks for the ReadQueue service.
//!
//! # Tasks
//!
//! - `group_reaper` - Deletes empty non-default groups on a fixed interval

pub mod group_reaper;

pub use group_reaper::start_group_reaper;
