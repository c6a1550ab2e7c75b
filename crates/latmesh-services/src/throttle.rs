//! Accept throttling for the ping listener.
//!
//! A token bucket refilled at `rate` tokens/sec up to `burst`. Each accepted
//! connection costs 1 token. Empty bucket = connection closed unanswered.

use std::time::Instant;

#[derive(Debug)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A bucket that starts full. A non-positive `rate` disables limiting.
    pub fn new(rate: f64, burst: f64) -> Self {
        let (capacity, refill_rate) = if rate <= 0.0 {
            (f64::INFINITY, f64::INFINITY)
        } else {
            (burst.max(1.0), rate)
        };
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    /// Returns true if the connection should be served.
    pub fn allow(&mut self) -> bool {
        if self.refill_rate.is_infinite() {
            return true;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens.min(self.capacity)
    }
}
