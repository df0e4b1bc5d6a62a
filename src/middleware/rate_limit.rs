//! Per-client fixed-window rate limiting.
//!
//! # Algorithm
//!
//! Each client key owns `{ count, window_start }`. A request either opens a
//! new window (`count = 1`) when none exists or the previous one has ended
//! (`now - window_start > window`), or increments `count`. The request is
//! rejected once the incremented count exceeds the ceiling. Rejected
//! requests still count.
//!
//! A client can land up to twice the ceiling across a window boundary
//! (a full burst at the end of one window and another at the start of the
//! next). That is the accepted cost of the fixed window.
//!
//! # Concurrency
//!
//! Counters live in a `DashMap`. The whole read-modify-write of one key runs
//! while holding that key's shard lock through the entry API, so two
//! simultaneous requests from one client can never both observe the same
//! stale count.
//!
//! # Memory
//!
//! Expired counters are removed by [`FixedWindowLimiter::sweep`], driven by
//! a background task (see `AppState`). When the number of tracked keys
//! reaches `max_clients`, a sweep also runs inline before a new key is
//! admitted, at most once per window. While every tracked window is still
//! live a sweep frees nothing, so the map may grow past the cap until the
//! next sweep that finds expired counters.
//!
//! # Scope
//!
//! State is per process. N instances give each client N times the ceiling.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::metrics;

/// One client's counter for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    pub count: u32,
    pub window_start: Instant,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Admitted within the ceiling.
    Allowed,
    /// Over the ceiling until the window ends in `retry_after`.
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

/// In-memory fixed-window limiter keyed by client identity.
///
/// Cheap to clone; clones share the same counters.
#[derive(Debug, Clone)]
pub struct FixedWindowLimiter {
    inner: Arc<LimiterInner>,
}

#[derive(Debug)]
struct LimiterInner {
    max_requests: u32,
    window: Duration,
    max_clients: usize,
    counters: DashMap<String, WindowCounter>,
    /// Reference point for `last_inline_sweep`.
    created: Instant,
    /// Nanoseconds after `created` of the last inline sweep, `NEVER` if none.
    last_inline_sweep: AtomicU64,
}

const NEVER: u64 = u64::MAX;

impl FixedWindowLimiter {
    /// Create a limiter admitting `max_requests` per `window` per key.
    ///
    /// `max_requests = 0` disables limiting.
    pub fn new(max_requests: u32, window: Duration, max_clients: usize) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                max_requests,
                window,
                max_clients,
                counters: DashMap::new(),
                created: Instant::now(),
                last_inline_sweep: AtomicU64::new(NEVER),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.max_requests > 0
    }

    /// Configured ceiling per window.
    pub fn limit(&self) -> u32 {
        self.inner.max_requests
    }

    /// Number of keys currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.inner.counters.len()
    }

    /// Record a request from `key` at the current time.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Record a request from `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let inner = &self.inner;
        if !self.is_enabled() {
            return RateLimitDecision::Allowed;
        }

        // Must run before `entry()`: `retain` takes every shard lock.
        if inner.counters.len() >= inner.max_clients
            && !inner.counters.contains_key(key)
            && self.claim_inline_sweep(now)
        {
            self.sweep_at(now);
        }

        let mut entry = inner.counters.entry(key.to_string()).or_insert(WindowCounter {
            count: 0,
            window_start: now,
        });
        let counter = entry.value_mut();

        if counter.count == 0 || now.saturating_duration_since(counter.window_start) > inner.window
        {
            *counter = WindowCounter {
                count: 1,
                window_start: now,
            };
            return RateLimitDecision::Allowed;
        }

        counter.count = counter.count.saturating_add(1);
        if counter.count > inner.max_requests {
            let elapsed = now.saturating_duration_since(counter.window_start);
            RateLimitDecision::Limited {
                retry_after: inner.window.saturating_sub(elapsed),
            }
        } else {
            RateLimitDecision::Allowed
        }
    }

    /// Whether an inline sweep may run at `now`; claims the slot if so.
    ///
    /// At most one inline sweep runs per window, so a flood of new keys at
    /// the cap does not rescan the whole map on every request.
    fn claim_inline_sweep(&self, now: Instant) -> bool {
        let inner = &self.inner;
        let at = u64::try_from(now.saturating_duration_since(inner.created).as_nanos())
            .unwrap_or(NEVER - 1);
        let window = u64::try_from(inner.window.as_nanos()).unwrap_or(NEVER);

        let last = inner.last_inline_sweep.load(Ordering::Acquire);
        if last != NEVER && at.saturating_sub(last) < window {
            return false;
        }
        inner
            .last_inline_sweep
            .compare_exchange(last, at, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Current counter for `key`, if tracked.
    pub fn counter(&self, key: &str) -> Option<WindowCounter> {
        self.inner.counters.get(key).map(|c| *c)
    }

    /// Remove counters whose window has ended. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Remove counters whose window has ended as of `now`.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let window = self.inner.window;
        let before = self.inner.counters.len();
        self.inner
            .counters
            .retain(|_, c| now.saturating_duration_since(c.window_start) <= window);
        let after = self.inner.counters.len();
        let removed = before.saturating_sub(after);

        if removed > 0 {
            debug!(removed, remaining = after, "Swept expired rate-limit counters");
        }
        metrics::set_tracked_clients(after);

        removed
    }
}

/// Whole seconds until `retry_after` elapses, never less than 1.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    let secs = if retry_after.subsec_nanos() > 0 { secs + 1 } else { secs };
    secs.max(1)
}
