//! A small in-memory, fixed-window rate limiter keyed by client.
//!
//! The limiter knows nothing about HTTP; handlers decide what the key is (usually the remote IP) and what to do when a
//! request is refused.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use log::*;

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    /// Entries untouched for this long are dropped
    idle_ttl: Duration,
    state: Arc<Mutex<LimiterState>>,
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    start: Instant,
    count: u32,
}

struct LimiterState {
    windows: HashMap<String, WindowState>,
    last_sweep: Instant,
}

impl RateLimiter {
    /// A limiter that allows `max_requests` per key per window. A limit of zero allows everything.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let state = LimiterState { windows: HashMap::new(), last_sweep: Instant::now() };
        Self { window, max_requests, idle_ttl: window * 2, state: Arc::new(Mutex::new(state)) }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, DEFAULT_WINDOW)
    }

    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    /// Counts a request for `key` and returns whether it should be allowed.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        if self.max_requests == 0 {
            return true;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if now.saturating_duration_since(state.last_sweep) >= self.idle_ttl {
            state.evict_idle(now, self.idle_ttl);
        }
        let entry = state.windows.entry(key.to_string()).or_insert(WindowState { start: now, count: 0 });
        if now.saturating_duration_since(entry.start) >= self.window {
            *entry = WindowState { start: now, count: 0 };
        }
        entry.count = entry.count.saturating_add(1);
        entry.count <= self.max_requests
    }

    /// The number of keys currently being tracked.
    pub fn tracked_keys(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).windows.len()
    }
}

impl LimiterState {
    fn evict_idle(&mut self, now: Instant, idle_ttl: Duration) {
        let before = self.windows.len();
        self.windows.retain(|_, w| now.saturating_duration_since(w.start) < idle_ttl);
        self.last_sweep = now;
        let evicted = before - self.windows.len();
        if evicted > 0 {
            trace!("💻️ Rate limiter dropped {evicted} idle clients");
        }
    }
}
