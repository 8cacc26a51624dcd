//! Token-bucket rate limiter shared by every outbound request.
//! Callers queue on it; a cancelled caller returns its reservation.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cancellation::{sleep_or_cancel, Cancelled};

struct Bucket {
    /// May go negative: each waiter reserves its token up front.
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucket {
    state: Mutex<Bucket>,
    rate_per_sec: f64,
    burst: f64,
}

impl TokenBucket {
    /// `rate_per_sec` sustained, up to `burst` at once. Starts full.
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            state: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
            rate_per_sec: rate_per_sec.max(f64::MIN_POSITIVE),
            burst,
        }
    }

    /// Sized from an hourly quota, e.g. 1000/hour is ~0.278/s.
    pub fn per_hour(requests_per_hour: u32, burst: u32) -> Self {
        Self::new(f64::from(requests_per_hour) / 3600.0, burst)
    }

    /// Wait until a token is available, or until `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let wait = {
            let mut bucket = self.state.lock().await;
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
            bucket.last_refill = now;

            bucket.tokens -= 1.0;
            if bucket.tokens >= 0.0 {
                return Ok(());
            }
            // a vanishing rate means an unbounded wait, not a panic
            Duration::try_from_secs_f64(-bucket.tokens / self.rate_per_sec).unwrap_or(Duration::MAX)
        };

        debug!(wait_ms = wait.as_millis() as u64, "rate limiter wait");
        if let Err(cancelled) = sleep_or_cancel(wait, cancel).await {
            self.state.lock().await.tokens += 1.0;
            return Err(cancelled);
        }
        Ok(())
    }
}
