//! Metric instrument factories for waitline-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"waitline-rs"` meter.

use opentelemetry::metrics::{Counter, Meter};

/// Returns the shared meter for waitline-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("waitline-rs")
}

/// Counter: tickets joining the line.
/// Labels: `channel`, `result` ("ok" | "duplicate").
pub fn tickets_joined() -> Counter<u64> {
    meter()
        .u64_counter("waitline.tickets.joined")
        .with_description("Number of join attempts")
        .build()
}

/// Counter: ticket status transitions.
/// Labels: `from`, `to`.
pub fn ticket_transitions() -> Counter<u64> {
    meter()
        .u64_counter("waitline.tickets.transitions")
        .with_description("Number of ticket status transitions")
        .build()
}

/// Counter: board cache lookups.
/// Labels: `projection` ("board" | "settings"), `result` ("hit" | "miss" | "expired").
pub fn board_cache() -> Counter<u64> {
    meter()
        .u64_counter("waitline.cache.lookups")
        .with_description("Board cache lookups")
        .build()
}

/// Counter: requests rejected by the rate limiter.
/// Labels: `action`.
pub fn rate_limited() -> Counter<u64> {
    meter()
        .u64_counter("waitline.ratelimit.rejected")
        .with_description("Requests rejected by the rate limiter")
        .build()
}

/// Counter: notification outbox operations (enqueue, claim, sent, dropped).
/// Labels: `operation`.
pub fn outbox_operations() -> Counter<u64> {
    meter()
        .u64_counter("waitline.outbox.operations")
        .with_description("Notification outbox operations")
        .build()
}
