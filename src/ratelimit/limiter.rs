//! Fixed-window rate limiter.
//!
//! Capacity is a counting semaphore holding at most `request_limit` permits.
//! A background task owned by the limiter restores the semaphore to full
//! capacity once per interval. Admissions consume permits; nothing returns
//! them except the window reset.
//!
//! The window is a fixed-origin tumbling window, not a sliding one. Up to
//! `request_limit` admissions can happen at the very end of one window and
//! another `request_limit` right after the reset, so two full bursts may land
//! back to back around a boundary.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::window::TimeWindow;
use crate::config::RateLimitingConfig;
use crate::error::{CrptError, Result};

/// Admits at most `request_limit` operations per interval.
///
/// Excess callers wait in FIFO order for the next window. Shutting the
/// limiter down stops the window timer and fails every pending and future
/// acquire with [`CrptError::Shutdown`].
///
/// This struct is thread-safe and can be shared across tasks behind an `Arc`.
pub struct RateLimiter {
    /// Permits available in the current window. The reset task is the only
    /// producer, so the count never exceeds `request_limit`.
    permits: Arc<Semaphore>,
    /// Maximum admissions per window
    request_limit: u32,
    /// Window length
    interval: Duration,
    /// Handle of the window reset task; `None` once shut down
    resetter: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Create a limiter admitting `request_limit` operations per `interval`.
    ///
    /// Must be called from within a tokio runtime, which drives the window
    /// timer. The first reset fires one full interval after construction.
    pub fn new(request_limit: u32, interval: Duration) -> Result<Self> {
        if request_limit == 0 {
            return Err(CrptError::InvalidConfiguration(
                "request limit must be positive".to_string(),
            ));
        }
        if interval.is_zero() {
            return Err(CrptError::InvalidConfiguration(
                "interval must be positive".to_string(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CrptError::Runtime(e.to_string()))?;

        let permits = Arc::new(Semaphore::new(request_limit as usize));
        let first_reset = Instant::now().checked_add(interval).ok_or_else(|| {
            CrptError::InvalidConfiguration("interval too large".to_string())
        })?;
        let resetter = runtime.spawn(run_window_resets(
            Arc::clone(&permits),
            request_limit as usize,
            first_reset,
            interval,
        ));

        debug!(
            request_limit = request_limit,
            interval_ms = interval.as_millis() as u64,
            "Rate limiter started"
        );

        Ok(Self {
            permits,
            request_limit,
            interval,
            resetter: Mutex::new(Some(resetter)),
        })
    }

    /// Create a limiter admitting `request_limit` operations per `window`.
    pub fn per(window: TimeWindow, request_limit: u32) -> Result<Self> {
        Self::new(request_limit, window.duration())
    }

    /// Create a limiter from the rate limiting section of the configuration.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        Self::new(config.request_limit, config.interval())
    }

    /// Wait for a permit and consume it.
    ///
    /// Returns immediately while the current window has capacity. Dropping the
    /// returned future before it completes consumes no permit.
    pub async fn acquire(&self) -> Result<()> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CrptError::Shutdown)?;
        permit.forget();

        trace!(
            available = self.permits.available_permits(),
            "Permit acquired"
        );
        Ok(())
    }

    /// Wait for a permit unless `cancel` resolves first.
    ///
    /// Fails with [`CrptError::Cancelled`] when the cancellation signal wins;
    /// in that case no permit was consumed.
    pub async fn acquire_until<F>(&self, cancel: F) -> Result<()>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            result = self.acquire() => result,
            _ = cancel => {
                debug!("Acquire cancelled while waiting for a permit");
                Err(CrptError::Cancelled)
            }
        }
    }

    /// Wait for a permit for at most `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        self.acquire_until(tokio::time::sleep(timeout)).await
    }

    /// Block the current thread until a permit is available.
    ///
    /// Intended for synchronous callers. Calling this from inside an async
    /// task stalls that runtime worker.
    pub fn acquire_blocking(&self) -> Result<()> {
        futures::executor::block_on(self.acquire())
    }

    /// Consume a permit if one is available right now.
    ///
    /// Returns `Ok(false)` when the current window is exhausted.
    pub fn try_acquire(&self) -> Result<bool> {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                Ok(true)
            }
            Err(TryAcquireError::NoPermits) => Ok(false),
            Err(TryAcquireError::Closed) => Err(CrptError::Shutdown),
        }
    }

    /// Stop the window timer and fail all pending and future acquires.
    ///
    /// Calling this more than once has no further effect.
    pub fn shutdown(&self) {
        let Some(resetter) = self.resetter.lock().take() else {
            return;
        };
        resetter.abort();
        self.permits.close();

        info!(
            request_limit = self.request_limit,
            "Rate limiter shut down"
        );
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.permits.is_closed()
    }

    /// Permits left in the current window.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Maximum admissions per window.
    pub fn request_limit(&self) -> u32 {
        self.request_limit
    }

    /// Window length.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(resetter) = self.resetter.get_mut().take() {
            resetter.abort();
        }
    }
}

/// Restore full capacity once per interval until the semaphore is closed.
async fn run_window_resets(
    permits: Arc<Semaphore>,
    request_limit: usize,
    first_reset: Instant,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval_at(first_reset, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if permits.is_closed() {
            break;
        }
        refill(&permits, request_limit);
    }
}

/// Top the semaphore back up to `request_limit`.
///
/// Restored permits go to queued waiters first, so the available count right
/// after a refill is `request_limit` minus the number of waiters woken.
fn refill(permits: &Semaphore, request_limit: usize) -> usize {
    let consumed = request_limit.saturating_sub(permits.available_permits());
    if consumed > 0 {
        permits.add_permits(consumed);
    }

    debug!(
        restored = consumed,
        available = permits.available_permits(),
        "Rate limit window reset"
    );
    consumed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn spawn_acquirers(limiter: &Arc<RateLimiter>, count: usize) -> Arc<AtomicUsize> {
        let admitted = Arc::new(AtomicUsize::new(0));
        for _ in 0..count {
            let limiter = Arc::clone(limiter);
            let admitted = Arc::clone(&admitted);
            tokio::spawn(async move {
                if limiter.acquire().await.is_ok() {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        admitted
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let result = RateLimiter::new(0, Duration::from_secs(1));
        assert!(matches!(result, Err(CrptError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let result = RateLimiter::new(5, Duration::ZERO);
        assert!(matches!(result, Err(CrptError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_unrepresentable_interval_rejected() {
        let result = RateLimiter::new(1, Duration::MAX);
        assert!(matches!(result, Err(CrptError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_largest_configurable_interval_accepted() {
        let limiter = RateLimiter::new(1, Duration::from_millis(u64::MAX)).unwrap();
        assert!(limiter.try_acquire().unwrap());
        limiter.shutdown();
    }

    #[test]
    fn test_construction_requires_runtime() {
        let result = RateLimiter::new(5, Duration::from_secs(1));
        assert!(matches!(result, Err(CrptError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_per_window_constructor() {
        let limiter = RateLimiter::per(TimeWindow::Minute, 10).unwrap();
        assert_eq!(limiter.request_limit(), 10);
        assert_eq!(limiter.interval(), Duration::from_secs(60));
        assert_eq!(limiter.available_permits(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquires_within_limit_do_not_block() {
        let limiter = RateLimiter::new(5, Duration::from_millis(100)).unwrap();

        for _ in 0..5 {
            let result = tokio::time::timeout(Duration::from_millis(1), limiter.acquire()).await;
            assert!(matches!(result, Ok(Ok(()))));
        }

        assert_eq!(limiter.available_permits(), 0);
        assert!(!limiter.try_acquire().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_excess_acquires_wait_for_reset() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_millis(100)).unwrap());

        let admitted = spawn_acquirers(&limiter, 5);

        sleep(Duration::from_millis(10)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 3);
        assert_eq!(limiter.available_permits(), 0);

        // Both waiters are handed permits by the reset at t=100ms.
        sleep(Duration::from_millis(100)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 5);
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_full_capacity() {
        let limiter = RateLimiter::new(4, Duration::from_millis(100)).unwrap();

        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }
        assert_eq!(limiter.available_permits(), 1);

        sleep(Duration::from_millis(101)).await;
        assert_eq!(limiter.available_permits(), 4);

        // Resets are absolute; an idle window does not accumulate capacity.
        sleep(Duration::from_millis(300)).await;
        assert_eq!(limiter.available_permits(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_reset_after_one_interval() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100)).unwrap();
        limiter.acquire().await.unwrap();

        sleep(Duration::from_millis(99)).await;
        assert!(!limiter.try_acquire().unwrap());

        sleep(Duration::from_millis(2)).await;
        assert!(limiter.try_acquire().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_acquire_consumes_no_permit() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100)).unwrap();
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();

        let result = limiter.acquire_timeout(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(CrptError::Cancelled)));

        sleep(Duration::from_millis(60)).await;
        assert_eq!(limiter.available_permits(), 2);
        assert!(limiter.try_acquire().unwrap());
        assert!(limiter.try_acquire().unwrap());
        assert!(!limiter.try_acquire().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_until_external_signal() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)).unwrap());
        limiter.acquire().await.unwrap();

        let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();
        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire_until(cancel_rx).await })
        };

        sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        cancel_tx.send(()).unwrap();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(CrptError::Cancelled)));
        assert_eq!(limiter.available_permits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_waiter_does_not_take_reset_permit() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_millis(100)).unwrap());
        limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await })
        };
        sleep(Duration::from_millis(10)).await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout_succeeds_when_capacity_returns() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100)).unwrap();
        limiter.acquire().await.unwrap();

        let result = limiter.acquire_timeout(Duration::from_millis(150)).await;
        assert!(result.is_ok());
        assert_eq!(limiter.available_permits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_pending_and_future_acquires() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_millis(100)).unwrap());
        limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await })
        };
        sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        limiter.shutdown();
        assert!(limiter.is_shutdown());

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(CrptError::Shutdown)));
        assert!(matches!(limiter.acquire().await, Err(CrptError::Shutdown)));
        assert!(matches!(limiter.try_acquire(), Err(CrptError::Shutdown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100)).unwrap();

        limiter.shutdown();
        limiter.shutdown();
        assert!(limiter.is_shutdown());

        sleep(Duration::from_millis(250)).await;
        assert!(matches!(
            limiter.acquire_timeout(Duration::from_millis(10)).await,
            Err(CrptError::Shutdown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_instances_are_independent() {
        let first = RateLimiter::new(1, Duration::from_millis(100)).unwrap();
        let second = RateLimiter::new(1, Duration::from_millis(100)).unwrap();

        first.acquire().await.unwrap();
        assert!(!first.try_acquire().unwrap());
        assert!(second.try_acquire().unwrap());

        first.shutdown();
        assert!(!second.is_shutdown());
    }

    #[test]
    fn test_blocking_acquire_from_threads() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        let limiter = Arc::new(RateLimiter::new(2, Duration::from_millis(50)).unwrap());

        let started = std::time::Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.acquire_blocking())
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        // Two of the four threads had to wait for the first reset.
        assert!(started.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_randomized_interleavings_respect_window_bound() {
        const LIMIT: u32 = 4;
        const INTERVAL: Duration = Duration::from_millis(20);

        for seed in [7_u64, 42, 1337] {
            let started = std::time::Instant::now();
            let limiter = Arc::new(RateLimiter::new(LIMIT, INTERVAL).unwrap());
            let admitted = Arc::new(AtomicUsize::new(0));

            let mut tasks = Vec::new();
            for worker in 0..16_u64 {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                tasks.push(tokio::spawn(async move {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_mul(31).wrapping_add(worker));
                    for _ in 0..8 {
                        sleep(Duration::from_millis(rng.gen_range(0..6))).await;
                        let timeout = Duration::from_millis(rng.gen_range(1..40));
                        if limiter.acquire_timeout(timeout).await.is_ok() {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                        assert!(limiter.available_permits() <= LIMIT as usize);
                    }
                }));
            }

            let sampler = {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        assert!(limiter.available_permits() <= LIMIT as usize);
                        tokio::task::yield_now().await;
                    }
                })
            };

            for task in tasks {
                task.await.unwrap();
            }
            sampler.await.unwrap();

            // Resets are at least one interval apart, so the admissions seen
            // so far are bounded by one full window per elapsed interval plus
            // the initial window.
            let windows = (started.elapsed().as_millis() / INTERVAL.as_millis()) as usize + 1;
            let admitted = admitted.load(Ordering::SeqCst);
            assert!(admitted >= LIMIT as usize, "seed {seed}: admitted {admitted}");
            assert!(
                admitted <= LIMIT as usize * windows,
                "seed {seed}: admitted {admitted} over {windows} windows"
            );

            limiter.shutdown();
        }
    }

    #[test]
    fn test_refill_tops_up_to_limit() {
        let permits = Semaphore::new(1);
        assert_eq!(refill(&permits, 5), 4);
        assert_eq!(permits.available_permits(), 5);
        assert_eq!(refill(&permits, 5), 0);
        assert_eq!(permits.available_permits(), 5);
    }
}
