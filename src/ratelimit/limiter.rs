//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::clock::{Clock, SystemClock};
use super::key::WindowKey;
use super::window::{Quota, RateLimitConfig, RateWindow, Verdict};
use crate::error::{CvGuardError, Result};

/// How often the background sweep evicts expired windows by default.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// A fixed-window rate limiter keyed by identifier and resource.
///
/// This struct is thread-safe and meant to be shared behind an `Arc` by every
/// request handler that needs it. Each check runs under the map shard's write
/// lock, so the read, the comparison and the increment cannot interleave with
/// another request for the same key.
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Live windows indexed by key
    windows: DashMap<WindowKey, RateWindow>,
    /// Time source for the convenience entry points
    clock: C,
    /// Handle to the background sweep, if running
    sweep: Mutex<Option<SweepTask>>,
}

struct SweepTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl RateLimiter {
    /// Create a new rate limiter reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a new rate limiter with a custom time source.
    pub fn with_clock(clock: C) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
            sweep: Mutex::new(None),
        }
    }

    /// The limiter's time source.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Check the limit for a key at the clock's current time, consuming one
    /// request when admitted.
    pub fn check_and_consume(
        &self,
        identifier: &str,
        resource: &str,
        config: &RateLimitConfig,
    ) -> Result<Verdict> {
        self.check_and_consume_at(identifier, resource, config, self.clock.now_ms())
    }

    /// Check the limit for a key at `now`, consuming one request when admitted.
    ///
    /// A missing or expired window is replaced by a fresh one ending at
    /// `now + window_ms`. `remaining` is computed after the increment.
    pub fn check_and_consume_at(
        &self,
        identifier: &str,
        resource: &str,
        config: &RateLimitConfig,
        now: u64,
    ) -> Result<Verdict> {
        config.validate()?;
        let key = WindowKey::new(identifier, resource)?;

        trace!(key = %key, now = now, "Checking rate limit");

        let verdict = match self.windows.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    debug!(key = %occupied.key(), "Rate window expired, opening a new one");
                    *occupied.get_mut() = RateWindow::fresh(now, config.window_ms);
                }
                let verdict = admit(occupied.get_mut(), config);
                if !verdict.allowed {
                    debug!(
                        key = %occupied.key(),
                        limit = config.max_requests,
                        reset_at = verdict.reset_at,
                        "Rate limit exceeded"
                    );
                }
                verdict
            }
            Entry::Vacant(vacant) => {
                debug!(
                    key = %vacant.key(),
                    limit = config.max_requests,
                    window_ms = config.window_ms,
                    "Creating new rate window"
                );
                let mut window = RateWindow::fresh(now, config.window_ms);
                let verdict = admit(&mut window, config);
                vacant.insert(window);
                verdict
            }
        };

        Ok(verdict)
    }

    /// Inspect a key's quota at the clock's current time without consuming.
    pub fn peek(&self, identifier: &str, resource: &str, config: &RateLimitConfig) -> Result<Quota> {
        self.peek_at(identifier, resource, config, self.clock.now_ms())
    }

    /// Inspect a key's quota at `now` without consuming.
    ///
    /// When no live window exists this reports full capacity and the reset
    /// time a window opened now would have; no window is created.
    pub fn peek_at(
        &self,
        identifier: &str,
        resource: &str,
        config: &RateLimitConfig,
        now: u64,
    ) -> Result<Quota> {
        config.validate()?;
        let key = WindowKey::new(identifier, resource)?;

        let live = self
            .windows
            .get(&key)
            .map(|window| *window)
            .filter(|window| !window.is_expired(now));

        Ok(match live {
            Some(window) => Quota {
                remaining: window.remaining(config.max_requests),
                reset_at: window.reset_at,
                limit: config.max_requests,
            },
            None => Quota {
                remaining: config.max_requests,
                reset_at: now.saturating_add(config.window_ms),
                limit: config.max_requests,
            },
        })
    }

    /// Forget the window for a key.
    ///
    /// Returns `true` if a window was removed. An unknown key is not an error.
    pub fn reset(&self, identifier: &str, resource: &str) -> bool {
        let key = WindowKey {
            identifier: identifier.to_string(),
            resource: resource.to_string(),
        };
        let removed = self.windows.remove(&key).is_some();
        if removed {
            info!(key = %key, "Rate window reset");
        }
        removed
    }

    /// Drop every tracked window.
    pub fn clear_all(&self) {
        let cleared = self.windows.len();
        self.windows.clear();
        info!(cleared = cleared, "Cleared all rate windows");
    }

    /// Get the stored count for a key, expired or not.
    ///
    /// Returns `None` if no window exists for the key.
    pub fn current_count(&self, identifier: &str, resource: &str) -> Option<u32> {
        let key = WindowKey {
            identifier: identifier.to_string(),
            resource: resource.to_string(),
        };
        self.windows.get(&key).map(|window| window.count)
    }

    /// Get the number of tracked windows.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Evict windows that have expired by the clock's current time.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(self.clock.now_ms())
    }

    /// Evict windows that have expired by `now`, returning how many went.
    pub fn sweep_expired_at(&self, now: u64) -> usize {
        let mut evicted = 0;
        self.windows.retain(|_, window| {
            let keep = !window.is_expired(now);
            if !keep {
                evicted += 1;
            }
            keep
        });

        debug!(
            evicted = evicted,
            remaining = self.windows.len(),
            "Rate window sweep complete"
        );
        evicted
    }

    /// Whether a background sweep is currently running.
    pub fn is_sweeping(&self) -> bool {
        self.sweep
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Stop the background sweep and wait for it to exit.
    ///
    /// Does nothing if no sweep is running.
    pub async fn stop_cleanup_sweep(&self) {
        let task = self.sweep.lock().take();
        let Some(task) = task else {
            return;
        };

        let _ = task.shutdown.send(());
        if let Err(e) = task.handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Cleanup sweep task failed");
            }
        }
        info!("Stopped cleanup sweep");
    }
}

impl<C: Clock + 'static> RateLimiter<C> {
    /// Spawn a background task that sweeps expired windows every `interval`.
    ///
    /// Must be called from within a Tokio runtime. The task only holds a weak
    /// reference and ends on its own once the limiter is dropped. Returns
    /// `Ok(false)` without touching the running task if a sweep is already active.
    pub fn start_cleanup_sweep(self: &Arc<Self>, interval: Duration) -> Result<bool> {
        if interval.is_zero() {
            return Err(CvGuardError::Config(
                "cleanup interval must be non-zero".to_string(),
            ));
        }

        let mut slot = self.sweep.lock();
        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            debug!("Cleanup sweep already running");
            return Ok(false);
        }

        let (shutdown, mut stop) = oneshot::channel::<()>();
        let limiter = Arc::downgrade(self);
        let first_tick = Instant::now() + interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = ticker.tick() => {
                        let Some(limiter) = limiter.upgrade() else {
                            break;
                        };
                        limiter.sweep_expired();
                    }
                }
            }

            debug!("Cleanup sweep task exiting");
        });

        *slot = Some(SweepTask { shutdown, handle });
        info!(interval_ms = interval.as_millis() as u64, "Started cleanup sweep");
        Ok(true)
    }
}

impl<C: Clock> Drop for RateLimiter<C> {
    fn drop(&mut self) {
        if let Some(task) = self.sweep.get_mut().take() {
            task.handle.abort();
        }
    }
}

/// Consume from a live window and report the outcome.
fn admit(window: &mut RateWindow, config: &RateLimitConfig) -> Verdict {
    let allowed = window.try_consume(config.max_requests);
    Verdict {
        allowed,
        remaining: window.remaining(config.max_requests),
        reset_at: window.reset_at,
        limit: config.max_requests,
    }
}
