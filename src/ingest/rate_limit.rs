//! In-memory token-bucket rate limiting, adapted from the bridge's
//! Redis-backed limiter down to a single-process limiter — the Ingestor
//! runs as one process against one Telegram session, so there is no
//! cross-instance state to coordinate.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Requests per second allowed across all chats.
    pub global_limit: u32,
    /// Requests per second allowed for any single chat.
    pub per_chat_limit: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { global_limit: 30, per_chat_limit: 2 }
    }
}

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_per_sec: capacity as f64,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    global: Mutex<Bucket>,
    per_chat: Mutex<HashMap<i64, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let global = Bucket::new(config.global_limit);
        Self { config, global: Mutex::new(global), per_chat: Mutex::new(HashMap::new()) }
    }

    /// Blocks until both the global and per-chat buckets have a token.
    pub async fn acquire(&self, chat_id: i64) {
        loop {
            let global_ok = self.global.lock().await.try_take();
            let chat_ok = {
                let mut buckets = self.per_chat.lock().await;
                buckets.entry(chat_id).or_insert_with(|| Bucket::new(self.config.per_chat_limit)).try_take()
            };
            if global_ok && chat_ok {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exhausting_the_per_chat_bucket_does_not_starve_other_chats() {
        let limiter = RateLimiter::new(RateLimiterConfig { global_limit: 100, per_chat_limit: 1 });
        limiter.acquire(1).await;
        // A second chat's bucket is independent and should not block on chat 1's.
        let start = Instant::now();
        limiter.acquire(2).await;
        assert!(start.elapsed() < std::time::Duration::from_millis(200));
    }
}
