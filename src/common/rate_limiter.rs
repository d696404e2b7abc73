//! Token-bucket rate limiter for exchange requests
//!
//! The bucket holds at most `burst` tokens and regains `requests_per_second`
//! tokens per second. `acquire` waits until a token is available.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub requests_per_second: u32,
    pub burst: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst: 10,
        }
    }
}

impl RateLimiterConfig {
    pub fn with_rate(mut self, requests_per_second: u32) -> Self {
        self.requests_per_second = requests_per_second.max(1);
        self
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst.max(1);
        self
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Cloning shares the bucket
#[derive(Debug, Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
    rate: f64,
    capacity: f64,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let capacity = f64::from(config.burst.max(1));
        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            })),
            rate: f64::from(config.requests_per_second.max(1)),
            capacity,
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.last_refill = now;
    }

    /// Take one token, waiting for the bucket to refill if it is empty
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate)
            };
            tracing::debug!("Rate limited, waiting {}ms", wait.as_millis());
            sleep(wait).await;
        }
    }

    /// Take one token if one is available right now
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub async fn available(&self) -> u32 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        bucket.tokens.floor() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_exhausted() {
        let limiter = RateLimiter::new(RateLimiterConfig::default().with_rate(1).with_burst(2));
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(RateLimiterConfig::default().with_rate(2).with_burst(1));
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_capped_at_burst() {
        let limiter = RateLimiter::new(RateLimiterConfig::default().with_rate(10).with_burst(3));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(limiter.available().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_bucket() {
        let a = RateLimiter::new(RateLimiterConfig::default().with_rate(1).with_burst(1));
        let b = a.clone();
        assert!(a.try_acquire().await);
        assert!(!b.try_acquire().await);
    }
}
