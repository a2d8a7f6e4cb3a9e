//! Fixed-window request throttling per (identity, action).
//!
//! The first request in a window starts the counter; once it reaches the
//! limit, further requests are rejected until the window expires. The window
//! is approximate, not sliding — a burst straddling a boundary can see up to
//! twice the limit. That trade-off is intentional.
//!
//! State lives in-process, so `allow` is infallible; the limiter can only
//! ever fail open.

use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default webhook budget: 10 requests per 5 minutes.
pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    len: Duration,
    count: u32,
}

#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, String), Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this request is within budget. Counts the request if so.
    pub async fn allow(&self, identity: &str, action: &str, limit: u32, window: Duration) -> bool {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();

        // Opportunistic cleanup of dead windows.
        windows.retain(|_, w| now.duration_since(w.started) < w.len);

        let key = (identity.to_string(), action.to_string());
        let entry = windows.entry(key).or_insert(Window {
            started: now,
            len: window,
            count: 0,
        });
        let allowed = decide(entry, limit, now);

        if !allowed {
            metrics::rate_limited().add(1, &[KeyValue::new("action", action.to_string())]);
        }
        allowed
    }
}

/// Window decision, separated from locking so it can be tested with a
/// synthetic clock.
fn decide(window: &mut Window, limit: u32, now: Instant) -> bool {
    if now.duration_since(window.started) >= window.len {
        // Window elapsed — start a new one with this request.
        window.started = now;
        window.count = 1;
        return true;
    }
    if window.count >= limit {
        return false;
    }
    window.count += 1;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(started: Instant, len_secs: u64) -> Window {
        Window {
            started,
            len: Duration::from_secs(len_secs),
            count: 0,
        }
    }

    #[test]
    fn eleventh_request_in_window_is_rejected() {
        let now = Instant::now();
        let mut w = window(now, 300);

        for i in 0..10 {
            assert!(decide(&mut w, 10, now), "request {i} should pass");
        }
        assert!(!decide(&mut w, 10, now));
        assert!(!decide(&mut w, 10, now));
    }

    #[test]
    fn window_expiry_resets_the_counter() {
        let start = Instant::now();
        let mut w = window(start, 300);

        for _ in 0..10 {
            assert!(decide(&mut w, 10, start));
        }
        assert!(!decide(&mut w, 10, start));

        let later = start + Duration::from_secs(301);
        assert!(decide(&mut w, 10, later));
        assert_eq!(w.count, 1);
    }

    #[test]
    fn boundary_burst_is_accepted_behavior() {
        // 2x the limit can land across a window boundary. Fixed window,
        // not sliding — documented trade-off.
        let start = Instant::now();
        let mut w = window(start, 10);

        let just_before = start + Duration::from_secs(9);
        for _ in 0..3 {
            assert!(decide(&mut w, 3, just_before));
        }
        let just_after = start + Duration::from_secs(10);
        for _ in 0..3 {
            assert!(decide(&mut w, 3, just_after));
        }
    }

    #[tokio::test]
    async fn limits_are_scoped_per_identity_and_action() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(300);

        assert!(limiter.allow("+15550001", "join", 1, window).await);
        assert!(!limiter.allow("+15550001", "join", 1, window).await);

        // Different action and different identity each get their own window.
        assert!(limiter.allow("+15550001", "status", 1, window).await);
        assert!(limiter.allow("+15550002", "join", 1, window).await);
    }
}
