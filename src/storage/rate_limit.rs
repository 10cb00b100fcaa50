//! Cooperative spacing between calls to one storage backend

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Enforces a minimum interval between consecutive backend calls.
///
/// The last-call timestamp is owned by the limiter, and each backend instance
/// owns its limiter, so two backends never delay each other.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// A limiter that never sleeps
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Sleep until the minimum interval since the previous call has passed, then record this call
    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        // Holding the lock across the sleep queues concurrent callers behind each other.
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_spacing_between_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();

        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(500));

        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        limiter.wait().await;
        sleep(Duration::from_millis(300)).await;

        let before = Instant::now();
        limiter.wait().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_spaced() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(100)));
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.wait().await })
            })
            .collect();
        for task in tasks {
            task.await.expect("limiter task panicked");
        }
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_instances_are_independent() {
        let first = RateLimiter::new(Duration::from_millis(500));
        let second = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();

        first.wait().await;
        second.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_disabled_never_sleeps() {
        let limiter = RateLimiter::disabled();
        let start = std::time::Instant::now();
        for _ in 0..10 {
            limiter.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
