//! Sliding-window log counters.
//!
//! # Responsibilities
//! - Keep a time-ordered log of recent request instants per key
//! - Decide admit/reject with an exact rolling count
//! - Drop keys that have gone idle
//!
//! # Design Decisions
//! - `DashMap` shards the store: a key is locked only for its own
//!   prune-append-compare sequence, other shards proceed in parallel
//! - Rejected requests are recorded too, so a client that keeps flooding
//!   keeps its window full until it backs off
//! - Each log keeps at most `quota + 1` entries: the newest `quota + 1`
//!   in-window instants decide exactly like the full log would

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::security::classifier::{Category, WINDOW};

/// Composite key: one counter per client and category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub client: String,
    pub category: Category,
}

impl RequestKey {
    pub fn new(client: impl Into<String>, category: Category) -> Self {
        Self {
            client: client.into(),
            category,
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.category)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject,
}

impl Decision {
    pub fn is_admitted(self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// Per-key request log.
#[derive(Debug)]
pub struct CounterEntry {
    timestamps: VecDeque<Instant>,
    last_access: Instant,
}

impl CounterEntry {
    fn new(now: Instant, capacity: usize) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(capacity),
            last_access: now,
        }
    }

    /// Prune, append, and return the resulting in-window count.
    fn record(&mut self, now: Instant, window: Duration, cap: usize) -> usize {
        // Concurrent callers may append slightly out of order, so no front-only pruning.
        if let Some(window_start) = now.checked_sub(window) {
            self.timestamps.retain(|t| *t >= window_start);
        }

        self.timestamps.push_back(now);
        while self.timestamps.len() > cap {
            // Log may be out of order: drop the oldest instant, not the front.
            let oldest = self
                .timestamps
                .iter()
                .enumerate()
                .min_by_key(|(_, t)| **t)
                .map(|(idx, _)| idx);
            match oldest {
                Some(idx) => {
                    self.timestamps.remove(idx);
                }
                None => break,
            }
        }

        if now > self.last_access {
            self.last_access = now;
        }
        self.timestamps.len()
    }

    /// Number of instants currently held.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn last_access(&self) -> Instant {
        self.last_access
    }
}

/// Concurrent store of request logs.
#[derive(Debug)]
pub struct WindowStore {
    entries: DashMap<RequestKey, CounterEntry>,
    window: Duration,
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new(WINDOW)
    }
}

impl WindowStore {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Idle time after which a key is evicted.
    pub fn idle_threshold(&self) -> Duration {
        self.window.saturating_mul(2)
    }

    /// Record a request for `key` now and decide whether it is admitted.
    pub fn check_and_record(&self, key: &RequestKey, max_requests: usize) -> Decision {
        self.check_and_record_at(key, max_requests, Instant::now())
    }

    /// Same as [`check_and_record`](Self::check_and_record) with an explicit clock.
    pub fn check_and_record_at(
        &self,
        key: &RequestKey,
        max_requests: usize,
        now: Instant,
    ) -> Decision {
        let cap = max_requests.saturating_add(1);

        // The entry guard holds the shard write lock until the count is read.
        let count = {
            let mut entry = match self.entries.get_mut(key) {
                Some(entry) => entry,
                None => self
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| CounterEntry::new(now, cap)),
            };
            entry.record(now, self.window, cap)
        };

        if count > max_requests {
            tracing::info!(
                key = %key,
                count,
                window_secs = self.window.as_secs(),
                "Rate limit applied"
            );
            Decision::Reject
        } else {
            Decision::Admit
        }
    }

    /// Remove every entry idle for longer than twice the window.
    ///
    /// Returns the number of evicted entries.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let threshold = self.idle_threshold();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_access) <= threshold);
        before.saturating_sub(self.entries.len())
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Current log length for `key`, if tracked.
    pub fn count(&self, key: &RequestKey) -> Option<usize> {
        self.entries.get(key).map(|entry| entry.len())
    }
}
