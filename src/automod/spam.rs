use chrono::Utc;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Length of the anti-spam sliding window.
pub const SPAM_WINDOW_MS: i64 = 10_000;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Per-user message timestamps within the last `SPAM_WINDOW_MS`.
///
/// Process-local: each shard keeps its own windows. The LRU bound caps memory
/// on busy guilds; evicted users simply start a fresh window.
pub struct SpamTracker {
    clock: Arc<dyn Clock>,
    windows: Mutex<LruCache<u64, Vec<i64>>>,
}

impl SpamTracker {
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            clock,
            windows: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Records a message from `user_id` and returns how many of their messages
    /// fall inside the current window, this one included.
    pub fn record(&self, user_id: u64) -> usize {
        let now = self.clock.now_millis();
        // The whole read-modify-write happens under the lock so concurrent
        // messages from one user cannot undercount.
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if !windows.contains(&user_id) {
            windows.put(user_id, Vec::new());
        }
        let Some(stamps) = windows.get_mut(&user_id) else {
            return 1;
        };

        if let Some(&last) = stamps.last() {
            if now - last > SPAM_WINDOW_MS {
                stamps.clear();
            }
        }
        stamps.push(now);
        stamps.retain(|&t| now - t <= SPAM_WINDOW_MS);
        stamps.len()
    }

    #[cfg(test)]
    pub(crate) fn tracked_users(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
pub(crate) struct ManualClock {
    now: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(start: i64) -> Arc<Self> {
        Arc::new(Self {
            now: std::sync::atomic::AtomicI64::new(start),
        })
    }

    pub(crate) fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_within_window() {
        let clock = ManualClock::new(1_000_000);
        let tracker = SpamTracker::new(clock.clone(), 100);

        for expected in 1..=6 {
            assert_eq!(tracker.record(1), expected);
            clock.advance(1_000);
        }
        // A different user has an independent window.
        assert_eq!(tracker.record(2), 1);
    }

    #[test]
    fn test_gap_resets_window() {
        let clock = ManualClock::new(0);
        let tracker = SpamTracker::new(clock.clone(), 100);

        tracker.record(1);
        tracker.record(1);
        clock.advance(SPAM_WINDOW_MS + 1);
        assert_eq!(tracker.record(1), 1);
    }

    #[test]
    fn test_old_entries_slide_out() {
        let clock = ManualClock::new(0);
        let tracker = SpamTracker::new(clock.clone(), 100);

        // Messages every 4s never leave a gap > 10s, but only the last 10s count.
        assert_eq!(tracker.record(1), 1); // t=0
        clock.advance(4_000);
        assert_eq!(tracker.record(1), 2); // t=4
        clock.advance(4_000);
        assert_eq!(tracker.record(1), 3); // t=8
        clock.advance(4_000);
        assert_eq!(tracker.record(1), 3); // t=12, t=0 dropped
    }

    #[test]
    fn test_capacity_bounds_memory() {
        let clock = ManualClock::new(0);
        let tracker = SpamTracker::new(clock, 2);
        tracker.record(1);
        tracker.record(2);
        tracker.record(3);
        assert_eq!(tracker.tracked_users(), 2);
        // User 1 was evicted and starts over.
        assert_eq!(tracker.record(1), 1);
    }
}
