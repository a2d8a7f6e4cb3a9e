//! # waitline-rs
//!
//! Postgres-backed queue ordering and state engine for a walk-in/remote
//! service line.
//!
//! Tickets join an ordered waiting line, move through a closed status
//! machine, and carry a recomputed position and ETA while active. Reads go
//! through a TTL board cache with change broadcasting; outbound "you're next"
//! messages go through a notification outbox consumed by a dispatcher loop.

pub mod board;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod queue;
pub mod ratelimit;
pub mod telemetry;
