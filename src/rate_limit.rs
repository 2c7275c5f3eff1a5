use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::metrics::RATE_LIMIT_ENTRIES;

pub const DEFAULT_RATE_LIMIT: u32 = 60;
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);
// longer windows are clamped so reset times always fit in an Instant
pub const MAX_RATE_WINDOW: Duration = Duration::from_secs(365 * 86400);

// Rate limit entry - tracks requests per caller id
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: Instant,
}

// Fixed window limiter, one entry per caller
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            limit,
            window: window.min(MAX_RATE_WINDOW),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn admit(&self, caller_id: &str) -> bool {
        self.admit_at(caller_id, Instant::now())
    }

    /// Admission decision at an explicit point in time.
    ///
    /// The entry guard holds the shard lock for the whole read-modify-write,
    /// so two concurrent calls for the same caller can never both take the
    /// last slot of a window.
    pub fn admit_at(&self, caller_id: &str, now: Instant) -> bool {
        let mut entry = self
            .entries
            .entry(caller_id.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                reset_time: now + self.window,
            });

        // fresh entry or window over..? start a new one
        if entry.count == 0 || now > entry.reset_time {
            entry.count = 1;
            entry.reset_time = now + self.window;
            return true;
        }

        // under limit.? Allow
        if entry.count < self.limit {
            entry.count += 1;
            return true;
        }

        // over limit, count stays as is
        false
    }

    // Time left until the caller's window resets (None if no live window)
    pub fn retry_after(&self, caller_id: &str) -> Option<Duration> {
        self.retry_after_at(caller_id, Instant::now())
    }

    pub fn retry_after_at(&self, caller_id: &str, now: Instant) -> Option<Duration> {
        let entry = self.entries.get(caller_id)?;
        if now > entry.reset_time {
            return None;
        }
        Some(entry.reset_time.saturating_duration_since(now))
    }

    #[cfg(test)]
    pub fn entry(&self, caller_id: &str) -> Option<RateLimitEntry> {
        self.entries.get(caller_id).map(|e| *e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Drop every entry whose window already ended, returns how many went
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.reset_time);
        before.saturating_sub(self.entries.len())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW)
    }
}

// Sweeper task - runs forever, evicting stale caller entries
pub async fn sweeper(limiter: Arc<RateLimiter>, sweep_interval: Duration) {
    let mut interval = interval(sweep_interval);

    tracing::info!(interval = ?sweep_interval, "rate limit sweeper started");

    loop {
        interval.tick().await;
        if limiter.is_empty() {
            continue;
        }

        let removed = limiter.sweep_expired();
        RATE_LIMIT_ENTRIES.set(limiter.len() as f64);

        if removed > 0 {
            tracing::debug!(removed, remaining = limiter.len(), "swept expired rate limit entries");
        }
    }
}

// "minute" for 60s, "30 seconds" for 30s and so on
pub fn describe_window(window: Duration) -> String {
    match window.as_secs() {
        1 => "second".to_string(),
        60 => "minute".to_string(),
        3600 => "hour".to_string(),
        86400 => "day".to_string(),
        0 => format!("{} milliseconds", window.as_millis()),
        secs => format!("{} seconds", secs),
    }
}
