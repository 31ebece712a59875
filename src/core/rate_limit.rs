//! Sliding-window rate limiter shared by every outbound request
//!
//! At most `max_starts` operations may start within any rolling `window`.
//! Callers are admitted in arrival order: a fair async mutex acts as a
//! turnstile and is held while a caller waits for room, so later arrivals
//! queue behind it. The timestamp queue has its own short-lived lock that is
//! never held across an await.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Global start-rate limiter
///
/// # Example
///
/// ```rust
/// use harvest::core::rate_limit::RateLimiter;
/// use std::time::Duration;
///
/// # async fn example() {
/// let limiter = RateLimiter::new(10, Duration::from_secs(1));
/// limiter.acquire().await;
/// assert_eq!(limiter.in_window(), 1);
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    max_starts: usize,
    window: Duration,
    turnstile: tokio::sync::Mutex<()>,
    starts: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_starts` starts per `window`
    ///
    /// A zero capacity is treated as one so that `acquire` always terminates.
    pub fn new(max_starts: usize, window: Duration) -> Self {
        let max_starts = max_starts.max(1);
        Self {
            max_starts,
            window,
            turnstile: tokio::sync::Mutex::new(()),
            starts: Mutex::new(VecDeque::with_capacity(max_starts)),
        }
    }

    /// Create a limiter with a one-second window
    pub fn per_second(max_starts: usize) -> Self {
        Self::new(max_starts, Duration::from_secs(1))
    }

    /// Starts allowed per window
    pub fn capacity(&self) -> usize {
        self.max_starts
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a start is permitted, then record it
    ///
    /// Never fails; it only delays.
    pub async fn acquire(&self) {
        let _turn = self.turnstile.lock().await;
        loop {
            let wait = match self.try_record(Instant::now()) {
                None => return,
                Some(wait) => wait,
            };
            tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate limit window full");
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a start if one is permitted right now
    ///
    /// Returns `false` without waiting when the window is full or another
    /// caller is already queued.
    pub fn try_acquire(&self) -> bool {
        match self.turnstile.try_lock() {
            Ok(_turn) => self.try_record(Instant::now()).is_none(),
            Err(_) => false,
        }
    }

    /// Starts recorded within the current window
    pub fn in_window(&self) -> usize {
        let mut starts = self.starts.lock().unwrap_or_else(PoisonError::into_inner);
        evict_expired(&mut starts, Instant::now(), self.window);
        starts.len()
    }

    /// Record a start at `now`, or return how long until the oldest one expires
    fn try_record(&self, now: Instant) -> Option<Duration> {
        let mut starts = self.starts.lock().unwrap_or_else(PoisonError::into_inner);
        evict_expired(&mut starts, now, self.window);

        if starts.len() < self.max_starts {
            starts.push_back(now);
            return None;
        }

        // Queue is at capacity, so it is non-empty
        let oldest = starts.front().copied().unwrap_or(now);
        Some((oldest + self.window).saturating_duration_since(now))
    }
}

fn evict_expired(starts: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = starts.front() {
        if now.saturating_duration_since(oldest) >= window {
            starts.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_up_to_capacity_is_immediate() {
        let limiter = RateLimiter::per_second(5);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_oldest_to_leave_window() {
        let limiter = RateLimiter::per_second(2);
        let start = Instant::now();

        limiter.acquire().await;
        tokio::time::advance(Duration::from_millis(300)).await;
        limiter.acquire().await;

        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_respects_capacity() {
        let limiter = RateLimiter::new(2, Duration::from_millis(500));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(limiter.in_window(), 0);
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_capacity_is_clamped() {
        let limiter = RateLimiter::per_second(0);
        assert_eq!(limiter.capacity(), 1);
        limiter.acquire().await;
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callers_admitted_in_arrival_order() {
        let limiter = Arc::new(RateLimiter::per_second(1));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let limiter = Arc::clone(&limiter);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                order.lock().unwrap().push(i);
            }));
            // Make arrival order deterministic
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }
}
