//! Upload byte budget per rolling window
//!
//! The window start and the bytes sent inside it live in a durable
//! [`CounterStore`], so the budget holds across process restarts. All
//! read-modify-write sequences run under one in-process mutex.

use crate::storage::store::{CounterStore, StoreError};
use crate::utils::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use std::time::Duration;

const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);
const DEFAULT_MAX_BYTES: u64 = 30 * 1024 * 1024;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Length of one accounting window
    pub window: Duration,

    /// Bytes allowed per window
    pub max_bytes: u64,

    /// Counter key prefix, e.g. `"telemetry"`
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_bytes: DEFAULT_MAX_BYTES,
            key_prefix: "telemetry".to_string(),
        }
    }
}

/// Persisted window state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub window_start_millis: i64,
    pub bytes_sent: u64,
}

/// Rolling-window upload budget
pub struct UploadRateLimiter<S: CounterStore, C: Clock = SystemClock> {
    config: RateLimitConfig,
    store: S,
    clock: C,
    window_start_key: String,
    bytes_used_key: String,
    lock: Mutex<()>,
}

impl<S: CounterStore> UploadRateLimiter<S, SystemClock> {
    pub fn new(config: RateLimitConfig, store: S) -> Self {
        Self::with_clock(config, store, SystemClock)
    }
}

impl<S: CounterStore, C: Clock> UploadRateLimiter<S, C> {
    pub fn with_clock(config: RateLimitConfig, store: S, clock: C) -> Self {
        let window_start_key = format!("{}.windowStart", config.key_prefix);
        let bytes_used_key = format!("{}.bytesUsed", config.key_prefix);
        Self {
            config,
            store,
            clock,
            window_start_key,
            bytes_used_key,
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn window_millis(&self) -> i64 {
        self.config.window.as_millis() as i64
    }

    /// Load the window, initialising an absent start to now
    fn load(&self, now: i64) -> Result<RateWindow, StoreError> {
        let window_start_millis = match self.store.get(&self.window_start_key)? {
            Some(start) => start,
            None => {
                self.store.set(&self.window_start_key, now)?;
                now
            }
        };
        let bytes_sent = self.store.get(&self.bytes_used_key)?.unwrap_or(0).max(0) as u64;

        Ok(RateWindow {
            window_start_millis,
            bytes_sent,
        })
    }

    /// Load the window and roll it over if it has expired
    fn current(&self, now: i64) -> Result<RateWindow, StoreError> {
        let window = self.load(now)?;

        if now >= window.window_start_millis.saturating_add(self.window_millis()) {
            tracing::debug!(
                "Upload window for '{}' expired, resetting ({} bytes were sent)",
                self.config.key_prefix,
                window.bytes_sent
            );
            self.store.set(&self.window_start_key, now)?;
            self.store.set(&self.bytes_used_key, 0)?;
            return Ok(RateWindow {
                window_start_millis: now,
                bytes_sent: 0,
            });
        }

        Ok(window)
    }

    /// Record `bytes` against the current window if they fit.
    ///
    /// Returns `Ok(false)` without touching the counters when the budget
    /// would be exceeded.
    pub fn try_consume(&self, bytes: u64) -> Result<bool, StoreError> {
        let _guard = self.lock.lock();
        let now = self.clock.now_millis();
        let window = self.current(now)?;

        match window.bytes_sent.checked_add(bytes) {
            Some(used) if used <= self.config.max_bytes => {
                self.store.set(&self.bytes_used_key, used as i64)?;
                Ok(true)
            }
            _ => {
                tracing::debug!(
                    "Upload of {} bytes deferred: {} of {} bytes used in window",
                    bytes,
                    window.bytes_sent,
                    self.config.max_bytes
                );
                Ok(false)
            }
        }
    }

    /// Time left until the current window resets
    pub fn time_until_next_window(&self) -> Result<Duration, StoreError> {
        let _guard = self.lock.lock();
        let now = self.clock.now_millis();
        let window = self.load(now)?;

        let remaining = window
            .window_start_millis
            .saturating_add(self.window_millis())
            .saturating_sub(now)
            .max(0);

        Ok(Duration::from_millis(remaining as u64))
    }

    /// Whether `bytes` could ever be sent within one window
    pub fn fits(&self, bytes: u64) -> bool {
        bytes <= self.config.max_bytes
    }

    /// Whether `bytes` fit into what is left of the current window
    pub fn fits_current_window(&self, bytes: u64) -> Result<bool, StoreError> {
        let _guard = self.lock.lock();
        let window = self.current(self.clock.now_millis())?;
        Ok(window
            .bytes_sent
            .checked_add(bytes)
            .map_or(false, |used| used <= self.config.max_bytes))
    }

    /// Snapshot of the persisted window
    pub fn window(&self) -> Result<RateWindow, StoreError> {
        let _guard = self.lock.lock();
        self.load(self.clock.now_millis())
    }
}
