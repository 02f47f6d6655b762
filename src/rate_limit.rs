// In-memory rate limiter for profile re-syncs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::model::Game;

/// Error returned when a player re-syncs again inside the window.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Rate limit exceeded: max {max} profile syncs per {}s", .window.as_secs())]
pub struct RateLimitError {
    pub max: usize,
    pub window: Duration,
    /// Time until the oldest sync in the window expires.
    pub retry_after: Duration,
}

/// Key for the rate limit map: one bucket per player per game.
type LimitKey = (Game, String);

/// Thread-safe sliding-window limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max: usize,
    window: Duration,
    inner: Arc<Mutex<HashMap<LimitKey, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a sync for `uid` if it is within the limit.
    pub fn check_limit(&self, game: Game, uid: &str) -> Result<(), RateLimitError> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let window = self.window;

        let entries = map.entry((game, uid.to_string())).or_default();

        // Remove expired entries
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= self.max {
            let retry_after = entries
                .first()
                .map(|t| window.saturating_sub(now.duration_since(*t)))
                .unwrap_or(window);
            return Err(RateLimitError {
                max: self.max,
                window,
                retry_after,
            });
        }

        entries.push(now);
        Ok(())
    }

    /// Forget the most recent sync, e.g. when it failed before writing.
    pub fn release(&self, game: Game, uid: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entries) = map.get_mut(&(game, uid.to_string())) {
            entries.pop();
        }
    }

    /// Drop buckets with no live entries.
    pub fn prune(&self) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let window = self.window;
        map.retain(|_, entries| {
            entries.retain(|t| now.duration_since(*t) < window);
            !entries.is_empty()
        });
    }

    pub fn tracked_players(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
