//! Background Tasks Module
//!
//! Periodic maintenance that runs alongside the interceptor.
//!
//! # Tasks
//! - Expiry sweep: drops expired entries from the in-memory store

mod cleanup;

pub use cleanup::spawn_cleanup_task;
