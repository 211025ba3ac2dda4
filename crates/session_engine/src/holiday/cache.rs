//! Per-year TTL cache and circuit breaker for the holiday upstream.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::HolidayCalendar;

/// A cached year with metadata.
#[derive(Clone)]
struct CachedYear {
    calendar: HolidayCalendar,
    cached_at: Instant,
    ttl: Duration,
}

/// Thread-safe cache of holiday calendars keyed by year.
///
/// Uses DashMap for concurrent access without external locking.
pub struct YearCache {
    entries: DashMap<i32, CachedYear>,
    default_ttl: Duration,
    /// Per-year locks so overlapping previews fetch a year only once
    year_locks: DashMap<i32, Arc<tokio::sync::Mutex<()>>>,
}

impl YearCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            year_locks: DashMap::new(),
        }
    }

    /// Creates a cache with a 24-hour default TTL.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60))
    }

    /// Gets a cached year if it exists and hasn't expired.
    pub fn get(&self, year: i32) -> Option<HolidayCalendar> {
        self.entries.get(&year).and_then(|entry| {
            if entry.cached_at.elapsed() < entry.ttl {
                Some(entry.calendar.clone())
            } else {
                // Entry expired, remove it
                drop(entry);
                self.entries.remove(&year);
                None
            }
        })
    }

    pub fn insert(&self, year: i32, calendar: HolidayCalendar) {
        self.insert_with_ttl(year, calendar, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, year: i32, calendar: HolidayCalendar, ttl: Duration) {
        self.entries.insert(
            year,
            CachedYear {
                calendar,
                cached_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn invalidate(&self, year: i32) {
        self.entries.remove(&year);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Returns the number of entries in the cache (including expired ones).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes expired entries from the cache.
    pub fn cleanup_expired(&self) {
        self.entries
            .retain(|_, entry| entry.cached_at.elapsed() < entry.ttl);
    }

    pub fn year_lock(&self, year: i32) -> Arc<tokio::sync::Mutex<()>> {
        self.year_locks
            .entry(year)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn stats(&self) -> CacheStats {
        let mut total = 0;
        let mut expired = 0;
        let mut years = Vec::new();

        for entry in self.entries.iter() {
            total += 1;
            if entry.cached_at.elapsed() >= entry.ttl {
                expired += 1;
            } else {
                years.push(*entry.key());
            }
        }
        years.sort_unstable();

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
            cached_years: years,
        }
    }
}

impl Default for YearCache {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub cached_years: Vec<i32>,
}

/// Circuit breaker for protecting against repeated upstream failures.
pub struct CircuitBreaker {
    failure_count: AtomicU32,
    last_failure: Mutex<Option<Instant>>,
    threshold: u32,
    recovery_time: Duration,
}

impl CircuitBreaker {
    /// - `threshold`: Number of failures before the breaker opens
    /// - `recovery_time`: How long to wait before allowing requests again
    pub fn new(threshold: u32, recovery_time: Duration) -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            last_failure: Mutex::new(None),
            threshold,
            recovery_time,
        }
    }

    /// 5 failures, 60s recovery.
    pub fn with_defaults() -> Self {
        Self::new(5, Duration::from_secs(60))
    }

    /// Returns true if the circuit breaker is open (blocking requests).
    pub fn is_open(&self) -> bool {
        if self.failure_count.load(Ordering::Relaxed) < self.threshold {
            return false;
        }

        if let Ok(guard) = self.last_failure.lock() {
            if let Some(last) = *guard {
                if last.elapsed() > self.recovery_time {
                    drop(guard);
                    self.reset();
                    return false;
                }
            }
        }

        true
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_failure.lock() {
            *guard = Some(Instant::now());
        }
    }

    pub fn reset(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_failure.lock() {
            *guard = None;
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_defaults()
    }
}
