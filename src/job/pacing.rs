//! Request pacing shared by every worker of a job.
//!
//! Two independent gates sit in front of each model call: a token-bucket
//! [`RateLimiter`] capping requests per minute, and a [`DelayManager`]
//! enforcing a minimum gap between consecutive dispatches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::error::ModelError;
use crate::job::credentials::CredentialCycle;
use crate::models::{ChatModel, ModelReply};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PacingSettings {
    pub requests_per_minute: Option<u32>,
    pub request_delay: Option<Duration>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    updated: Instant,
}

/// Token bucket: holds up to `rpm` tokens, refilled at `rpm / 60` per second.
/// Waiters are woken by polling, so ordering between them is not FIFO.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: parking_lot::Mutex<Bucket>,
}

impl RateLimiter {
    pub fn per_minute(rpm: u32) -> Self {
        let capacity = f64::from(rpm.max(1));
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            bucket: parking_lot::Mutex::new(Bucket {
                tokens: capacity,
                updated: Instant::now(),
            }),
        }
    }

    /// Takes a token, or says how long until one is available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut b = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(b.updated).as_secs_f64();
        b.tokens = (b.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        b.updated = now;
        if b.tokens >= 1.0 {
            b.tokens -= 1.0;
            return Ok(());
        }
        let missing = 1.0 - b.tokens;
        Err(Duration::from_secs_f64(missing / self.refill_per_sec))
    }

    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    trace!(?wait, "rate limit reached");
                    sleep(wait).await;
                }
            }
        }
    }
}

/// Serializes dispatch: the lock is held while sleeping off the remainder of
/// the interval, so concurrent callers go through one at a time.
#[derive(Debug)]
pub struct DelayManager {
    min_interval: Duration,
    last: tokio::sync::Mutex<Option<Instant>>,
}

impl DelayManager {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn wait_before_request(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// The model seen by the pipeline: rotates credentials, then waits on the
/// delay manager, then on the rate limiter.
pub struct PacedModel {
    models: CredentialCycle<Arc<dyn ChatModel>>,
    delay: Option<DelayManager>,
    limiter: Option<RateLimiter>,
}

impl PacedModel {
    pub fn new(models: CredentialCycle<Arc<dyn ChatModel>>, settings: &PacingSettings) -> Self {
        Self {
            models,
            delay: settings.request_delay.map(DelayManager::new),
            limiter: settings.requests_per_minute.map(RateLimiter::per_minute),
        }
    }

    pub fn unpaced(model: Arc<dyn ChatModel>) -> anyhow::Result<Self> {
        Ok(Self::new(CredentialCycle::new(vec![model])?, &PacingSettings::default()))
    }
}

#[async_trait]
impl ChatModel for PacedModel {
    fn name(&self) -> &str {
        "paced"
    }

    async fn invoke(&self, prompt: &str, temperature: f32) -> Result<ModelReply, ModelError> {
        let model = self.models.next();
        if let Some(delay) = &self.delay {
            delay.wait_before_request().await;
        }
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
        model.invoke(prompt, temperature).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bucket_starts_full_then_refills() {
        let limiter = RateLimiter::per_minute(2);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        let wait = limiter.try_acquire().unwrap_err();
        assert!(wait > Duration::from_secs(29) && wait < Duration::from_secs(31), "{wait:?}");

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(29));
    }
}
