// SPDX-License-Identifier: Apache-2.0

//! Leaky bucket throttle consulted once per delivered line.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Rate limit settings for a tail session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Lines that may be delivered back to back before throttling starts
    pub burst: u32,
    /// Sustained lines per second
    pub per_second: f64,
    /// How long to pause delivery once the bucket overflows (in milliseconds)
    pub cooloff_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 1000,
            per_second: 100.0,
            cooloff_ms: 1000,
        }
    }
}

impl RateLimitConfig {
    pub fn cooloff(&self) -> Duration {
        Duration::from_millis(self.cooloff_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.burst == 0 {
            return Err("rate limit burst must be at least 1".to_string());
        }
        if !self.per_second.is_finite() || self.per_second <= 0.0 {
            return Err("rate limit per_second must be a positive number".to_string());
        }
        Ok(())
    }

    pub fn build(&self) -> LeakyBucket {
        LeakyBucket::new(self.burst, self.per_second)
    }
}

/// Leaky bucket rate limiter.
///
/// Each admitted line adds one unit of water; water leaks out continuously at
/// `leak_rate` units per second. A line is refused when it would overflow the
/// bucket.
#[derive(Debug)]
pub struct LeakyBucket {
    capacity: u32,
    leak_rate: f64,
    level: f64,
    last_leak: Instant,
}

impl LeakyBucket {
    /// * `capacity` - burst size
    /// * `leak_rate` - sustained units per second
    pub fn new(capacity: u32, leak_rate: f64) -> Self {
        Self {
            capacity,
            leak_rate,
            level: 0.0,
            last_leak: Instant::now(),
        }
    }

    fn leak(&mut self) {
        let now = Instant::now();
        let leaked = now.duration_since(self.last_leak).as_secs_f64() * self.leak_rate;
        if leaked > 0.0 {
            self.level = (self.level - leaked).max(0.0);
            self.last_leak = now;
        }
    }

    /// Pour one unit. Returns false when the bucket is full.
    pub fn try_acquire(&mut self) -> bool {
        self.leak();

        if self.level + 1.0 <= f64::from(self.capacity) {
            self.level += 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refuse() {
        let mut bucket = LeakyBucket::new(3, 1.0);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaks_over_time() {
        let mut bucket = LeakyBucket::new(2, 2.0);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        // Half a second at two units per second frees exactly one slot
        advance(Duration::from_millis(500)).await;
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        // A long quiet spell drains the bucket, but never below empty
        advance(Duration::from_secs(10)).await;
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_lines_do_not_fill_bucket() {
        let mut bucket = LeakyBucket::new(1, 4.0);
        assert!(bucket.try_acquire());
        for _ in 0..10 {
            assert!(!bucket.try_acquire());
        }

        // Only the admitted unit has to leak away
        advance(Duration::from_millis(250)).await;
        assert!(bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_built_from_config() {
        let config = RateLimitConfig {
            burst: 2,
            per_second: 1.0,
            cooloff_ms: 50,
        };
        let mut bucket = config.build();
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        advance(Duration::from_secs(1)).await;
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_config_validation() {
        assert!(RateLimitConfig::default().validate().is_ok());

        let zero_burst = RateLimitConfig {
            burst: 0,
            ..Default::default()
        };
        assert!(zero_burst.validate().is_err());

        let zero_rate = RateLimitConfig {
            per_second: 0.0,
            ..Default::default()
        };
        assert!(zero_rate.validate().is_err());
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: RateLimitConfig = serde_json::from_str(r#"{"burst": 5}"#).unwrap();
        assert_eq!(config.burst, 5);
        assert_eq!(config.per_second, 100.0);
        assert_eq!(config.cooloff(), Duration::from_secs(1));
    }
}
