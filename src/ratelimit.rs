//! Per-connection rate limiting.
//!
//! A fixed-window admission bucket (§3 "Rate-limit bucket", §4.2). Buckets
//! are owned exclusively by the connection's own read loop — never shared
//! across tasks — so no locking is needed.

use std::time::{Duration, Instant};

/// Fixed-window admission bucket for a single connection.
#[derive(Debug)]
pub struct RateBucket {
    window: Duration,
    max_messages: u32,
    count: u32,
    window_start: Instant,
}

impl RateBucket {
    /// Create a new bucket with the given window width and message cap.
    pub fn new(window: Duration, max_messages: u32) -> Self {
        Self {
            window,
            max_messages,
            count: 0,
            window_start: Instant::now(),
        }
    }

    /// Record one inbound frame. Returns `true` if it is admitted, `false`
    /// if it should be dropped for exceeding the window's message cap.
    ///
    /// The window resets once the clock moves past `window_start + window`;
    /// this is a fixed, not sliding, window per §3.
    pub fn admit(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.count = 0;
        }

        self.count += 1;
        self.count <= self.max_messages
    }
}
