//! Expiry Policy and Background Sweeper
//!
//! Items expire at an absolute wall-clock timestamp fixed when they are
//! written. They are evicted in three ways:
//!
//! 1. **Lazy**: `get`/`has`/`keys` notice an expired item and delete it
//! 2. **On construction**: a new engine sweeps its prefix once
//! 3. **Active**: an optional [`ExpirySweeper`] task calls `clear_expired`
//!    on an interval
//!
//! ## Adaptive Frequency
//!
//! If many keys are expiring, the sweeper runs more frequently.
//! If few keys are expiring, it backs off to save CPU.

use crate::storage::WebStorage;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_ms(&self) -> i64;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start_ms`.
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Jumps to an absolute time.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Turns a relative duration into an absolute expiry.
///
/// `None` means the item never expires. A zero duration expires at `now_ms`,
/// so the item is live for the current millisecond only.
pub fn to_absolute(duration: Option<Duration>, now_ms: i64) -> Option<i64> {
    duration.map(|d| now_ms.saturating_add(d.as_millis().min(i64::MAX as u128) as i64))
}

/// Checks an absolute expiry against `now_ms`.
///
/// Strict: an item whose expiry equals the current time is still live.
#[inline]
pub fn has_expired(expires: Option<i64>, now_ms: i64) -> bool {
    expires.map(|exp| now_ms > exp).unwrap_or(false)
}

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Base interval between sweeps (default: 1s)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 100ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 30s)
    pub max_interval: Duration,

    /// If this fraction of scanned keys are expired, speed up sweeping
    pub speedup_threshold: f64,

    /// If this fraction of scanned keys are expired, slow down sweeping
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(1),
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(30),
            speedup_threshold: 0.25,  // Speed up if >25% of keys are expired
            slowdown_threshold: 0.01, // Slow down if <1% of keys are expired
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use flashstore::storage::{ExpiryConfig, ExpirySweeper, MemoryBackend, WebStorage};
    /// use flashstore::StorageOptions;
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(WebStorage::new(MemoryBackend::new(), StorageOptions::default()));
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<WebStorage>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let prefix = engine.options().key_prefix.clone();
        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        info!(prefix = %prefix, "Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if self.shutdown_tx.send(true).is_ok() {
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    engine: Arc<WebStorage>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let keys_before = engine.len();
        let expired = engine.clear_expired();

        if keys_before > 0 {
            let expiry_rate = expired as f64 / keys_before as f64;

            if expiry_rate > config.speedup_threshold {
                current_interval = (current_interval / 2).max(config.min_interval);
                debug!(
                    expired = expired,
                    rate = %format!("{:.2}%", expiry_rate * 100.0),
                    new_interval_ms = current_interval.as_millis(),
                    "High expiry rate, speeding up sweeper"
                );
            } else if expiry_rate < config.slowdown_threshold && expired == 0 {
                current_interval = (current_interval * 2).min(config.max_interval);
                trace!(
                    new_interval_ms = current_interval.as_millis(),
                    "Low expiry rate, slowing down sweeper"
                );
            }
        }

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.len(),
                "Expired keys cleaned up"
            );
        }
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(engine: Arc<WebStorage>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SetOptions, StorageOptions};
    use crate::storage::MemoryBackend;

    #[test]
    fn test_to_absolute() {
        assert_eq!(to_absolute(None, 1_000), None);
        assert_eq!(to_absolute(Some(Duration::ZERO), 1_000), Some(1_000));
        assert_eq!(to_absolute(Some(Duration::from_millis(500)), 1_000), Some(1_500));
    }

    #[test]
    fn test_has_expired_is_strict() {
        assert!(!has_expired(None, i64::MAX));
        assert!(!has_expired(Some(1_000), 999));
        assert!(!has_expired(Some(1_000), 1_000));
        assert!(has_expired(Some(1_000), 1_001));
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(10);
        let other = clock.clone();
        clock.advance(Duration::from_millis(5));
        assert_eq!(other.now_ms(), 15);
        other.set(100);
        assert_eq!(clock.now_ms(), 100);
    }

    fn engine_with_clock(clock: &ManualClock) -> Arc<WebStorage> {
        Arc::new(WebStorage::with_clock(
            MemoryBackend::new(),
            StorageOptions::default().with_prefix("sweep:"),
            Arc::new(clock.clone()),
        ))
    }

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let clock = ManualClock::new(1_000);
        let engine = engine_with_clock(&clock);

        for i in 0..10 {
            engine.set(
                &format!("key{}", i),
                "value",
                SetOptions::expires_in(Duration::from_millis(50)),
            );
        }
        engine.set("persistent", "value", SetOptions::default());
        assert_eq!(engine.len(), 11);

        clock.advance(Duration::from_millis(100));

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.len(), 1);
        assert!(engine.has("persistent"));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let clock = ManualClock::new(1_000);
        let engine = engine_with_clock(&clock);

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        engine.set("key", "value", SetOptions::expires_in(Duration::from_millis(10)));
        clock.advance(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Nobody swept, so the raw entry is still there until a lazy read
        assert_eq!(engine.len(), 1);
        assert!(engine.get("key", None).is_none());
        assert_eq!(engine.len(), 0);
    }
}
