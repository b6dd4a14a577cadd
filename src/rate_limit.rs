//! Per-user fixed-window rate limiting.
//!
//! Each user gets `max_requests` requests per window. The window starts with
//! the user's first request and resets lazily on the first request after it
//! expires. Entries are kept in a map behind a single mutex so the
//! check-and-consume step is atomic across threads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Default requests allowed per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 5;

/// Default window length (one minute).
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Default interval between background sweeps of expired entries.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;

// ============================================================================
// Configuration
// ============================================================================

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per user per window.
    pub max_requests: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// How often to evict expired entries (0 disables the sweeper).
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window_ms: DEFAULT_WINDOW_MS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Millisecond time source.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock, milliseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Limiter
// ============================================================================

/// Quota state for a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests counted in the current window.
    pub count: u32,
    /// Instant (ms) after which the window is considered elapsed.
    pub window_reset_at_ms: u64,
}

/// Fixed-window rate limiter keyed by user id.
pub struct FixedWindowRateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl FixedWindowRateLimiter {
    /// Create a limiter driven by the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter with an injected clock.
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RateLimitEntry>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check the quota for `user_id` and consume a slot if one is free.
    ///
    /// Returns `true` when the request is denied. A `false` return means the
    /// request was allowed and has already been counted.
    pub fn check_and_consume(&self, user_id: &str) -> bool {
        self.check_and_consume_at(user_id, self.clock.now_ms())
    }

    /// [`check_and_consume`](Self::check_and_consume) at an explicit instant.
    pub fn check_and_consume_at(&self, user_id: &str, now_ms: u64) -> bool {
        let window = self.config.window_ms;
        let mut entries = self.lock();

        let entry = entries
            .entry(user_id.to_string())
            .or_insert_with(|| RateLimitEntry {
                count: 0,
                window_reset_at_ms: now_ms.saturating_add(window),
            });

        if now_ms > entry.window_reset_at_ms {
            entry.count = 0;
            entry.window_reset_at_ms = now_ms.saturating_add(window);
        }

        if entry.count >= self.config.max_requests {
            debug!(
                user_id = user_id,
                count = entry.count,
                reset_at_ms = entry.window_reset_at_ms,
                "Rate limit exceeded"
            );
            return true;
        }

        entry.count += 1;
        false
    }

    /// Current entry for `user_id`, if the user has been seen.
    pub fn entry(&self, user_id: &str) -> Option<RateLimitEntry> {
        self.lock().get(user_id).copied()
    }

    /// Milliseconds until the user's window resets, or `None` if not limited.
    pub fn retry_after_ms(&self, user_id: &str) -> Option<u64> {
        let now = self.clock.now_ms();
        let entry = self.entry(user_id)?;
        if entry.count >= self.config.max_requests && now <= entry.window_reset_at_ms {
            Some(entry.window_reset_at_ms - now)
        } else {
            None
        }
    }

    /// Evict entries whose window has elapsed. Returns how many were removed.
    ///
    /// An elapsed entry behaves exactly like a missing one on the next
    /// request, so eviction never changes an allow/deny decision.
    pub fn sweep(&self) -> usize {
        self.sweep_at(self.clock.now_ms())
    }

    /// [`sweep`](Self::sweep) at an explicit instant.
    pub fn sweep_at(&self, now_ms: u64) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| now_ms <= e.window_reset_at_ms);
        before - entries.len()
    }

    /// Number of users currently tracked.
    pub fn tracked_users(&self) -> usize {
        self.lock().len()
    }
}

/// Spawn the periodic sweeper. Returns `None` when sweeping is disabled.
///
/// Stops when `shutdown_rx` signals `true` or its sender is dropped.
pub fn spawn_sweeper(
    limiter: Arc<FixedWindowRateLimiter>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let secs = limiter.config().sweep_interval_secs;
    if secs == 0 {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(secs));
        interval.tick().await; // skip first immediate tick

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = limiter.sweep();
                    debug!(
                        removed = removed,
                        tracked = limiter.tracked_users(),
                        "Rate limiter sweep"
                    );
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: u64 = 1_704_067_200_000; // 2024-01-01T00:00:00Z

    fn limiter(max: u32, window_ms: u64) -> (FixedWindowRateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let config = RateLimitConfig {
            max_requests: max,
            window_ms,
            sweep_interval_secs: 0,
        };
        (
            FixedWindowRateLimiter::with_clock(config, clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_allows_up_to_limit_then_denies() {
        let (limiter, _clock) = limiter(5, 60_000);
        for _ in 0..5 {
            assert!(!limiter.check_and_consume("123"));
        }
        assert!(limiter.check_and_consume("123"));
    }

    #[test]
    fn test_denied_request_is_not_counted() {
        let (limiter, _clock) = limiter(2, 60_000);
        assert!(!limiter.check_and_consume("u"));
        assert!(!limiter.check_and_consume("u"));
        for _ in 0..10 {
            assert!(limiter.check_and_consume("u"));
        }
        assert_eq!(limiter.entry("u").unwrap().count, 2);
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let (limiter, clock) = limiter(5, 60_000);
        for _ in 0..5 {
            limiter.check_and_consume("123");
        }
        assert!(limiter.check_and_consume("123"));
        clock.advance(Duration::from_millis(61_000));
        assert!(!limiter.check_and_consume("123"));
        assert_eq!(limiter.entry("123").unwrap().count, 1);
    }

    #[test]
    fn test_reset_boundary_is_exclusive() {
        let (limiter, _clock) = limiter(1, 1_000);
        assert!(!limiter.check_and_consume_at("u", START));
        // exactly at reset time the window is still active
        assert!(limiter.check_and_consume_at("u", START + 1_000));
        assert!(!limiter.check_and_consume_at("u", START + 1_001));
    }

    #[test]
    fn test_window_is_fixed_not_sliding() {
        let (limiter, _clock) = limiter(2, 1_000);
        assert!(!limiter.check_and_consume_at("u", START));
        assert!(!limiter.check_and_consume_at("u", START + 900));
        // second request does not extend the window
        assert!(!limiter.check_and_consume_at("u", START + 1_001));
        assert_eq!(
            limiter.entry("u").unwrap().window_reset_at_ms,
            START + 1_001 + 1_000
        );
    }

    #[test]
    fn test_users_are_independent() {
        let (limiter, _clock) = limiter(5, 60_000);
        for _ in 0..5 {
            limiter.check_and_consume("123");
        }
        assert!(!limiter.check_and_consume("456"));
        assert!(limiter.check_and_consume("123"));
    }

    #[test]
    fn test_first_request_creates_entry() {
        let (limiter, _clock) = limiter(5, 60_000);
        assert!(limiter.entry("new").is_none());
        limiter.check_and_consume("new");
        assert_eq!(
            limiter.entry("new"),
            Some(RateLimitEntry {
                count: 1,
                window_reset_at_ms: START + 60_000,
            })
        );
    }

    #[test]
    fn test_retry_after() {
        let (limiter, clock) = limiter(1, 10_000);
        assert_eq!(limiter.retry_after_ms("u"), None);
        limiter.check_and_consume("u");
        assert_eq!(limiter.retry_after_ms("u"), Some(10_000));
        clock.advance(Duration::from_millis(4_000));
        assert_eq!(limiter.retry_after_ms("u"), Some(6_000));
    }

    #[test]
    fn test_sweep_evicts_only_expired() {
        let (limiter, clock) = limiter(5, 1_000);
        limiter.check_and_consume("old");
        clock.advance(Duration::from_millis(800));
        limiter.check_and_consume("fresh");
        clock.advance(Duration::from_millis(500));

        assert_eq!(limiter.sweep(), 1);
        assert!(limiter.entry("old").is_none());
        assert!(limiter.entry("fresh").is_some());
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[test]
    fn test_sweep_does_not_change_decisions() {
        let (limiter, clock) = limiter(1, 1_000);
        limiter.check_and_consume("u");
        clock.advance(Duration::from_millis(2_000));
        limiter.sweep();
        assert!(!limiter.check_and_consume("u"));
        assert!(limiter.check_and_consume("u"));
    }

    #[test]
    fn test_concurrent_requests_never_exceed_quota() {
        let clock = Arc::new(ManualClock::new(START));
        let limiter = Arc::new(FixedWindowRateLimiter::with_clock(
            RateLimitConfig {
                max_requests: 5,
                window_ms: 60_000,
                sweep_interval_secs: 0,
            },
            clock,
        ));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| !limiter.check_and_consume("shared"))
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 5);
    }

    #[test]
    fn test_system_clock_is_after_2024() {
        assert!(SystemClock.now_ms() > START);
    }

    #[test]
    fn test_config_defaults() {
        let cfg = RateLimitConfig::default();
        assert_eq!(cfg.max_requests, 5);
        assert_eq!(cfg.window_ms, 60_000);
        assert_eq!(cfg.sweep_interval_secs, 600);
    }

    #[tokio::test]
    async fn test_sweeper_disabled_when_interval_zero() {
        let (limiter, _clock) = limiter(5, 1_000);
        let (_tx, rx) = watch::channel(false);
        assert!(spawn_sweeper(Arc::new(limiter), rx).is_none());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let limiter = Arc::new(FixedWindowRateLimiter::new(RateLimitConfig::default()));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(limiter, rx).unwrap();
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_sender_dropped() {
        let limiter = Arc::new(FixedWindowRateLimiter::new(RateLimitConfig::default()));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(limiter, rx).unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
