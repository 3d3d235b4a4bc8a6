use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Sliding window in-memory rate limiter (process local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Records a hit for `key` and returns false once `limit` hits already
    /// fall inside `window`.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut hits = self.store.entry(key.to_string()).or_default();
        while hits.front().is_some_and(|t| now.duration_since(*t) >= window) {
            hits.pop_front();
        }
        if hits.len() >= limit {
            return false;
        }
        hits.push_back(now);
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub login_limit: usize,
    pub login_window: Duration,
    pub register_limit: usize,
    pub register_window: Duration,
}

/// Per-endpoint guard used by the credential handlers, keyed by client address.
#[derive(Clone)]
pub struct CredentialThrottle {
    limiter: InMemoryRateLimiter,
    cfg: RateLimitConfig,
}

impl CredentialThrottle {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }
    pub fn allow_login(&self, addr: &str) -> bool { self.limiter.check(&format!("login:{addr}"), self.cfg.login_limit, self.cfg.login_window) }
    pub fn allow_register(&self, addr: &str) -> bool { self.limiter.check(&format!("register:{addr}"), self.cfg.register_limit, self.cfg.register_window) }
}
