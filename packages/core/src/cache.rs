//! Single-value TTL cache.
//!
//! Backs endpoints that serve an expensive aggregate (the catalog
//! summary): the first request computes and stores the value, later
//! requests inside the TTL reuse it. Stale reads after a catalog change
//! are bounded by the TTL, which is acceptable for a snapshot report.

use std::time::{Duration, Instant};

pub struct ResponseCache<T: Clone> {
    entry: Option<(T, Instant)>,
    ttl: Duration,
}

impl<T: Clone> ResponseCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    /// The cached value, if one was stored within the TTL.
    pub fn get(&self) -> Option<T> {
        match &self.entry {
            Some((value, stored_at)) if stored_at.elapsed() <= self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    /// Store a value and restart its TTL window.
    pub fn set(&mut self, value: T) {
        self.entry = Some((value, Instant::now()));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
