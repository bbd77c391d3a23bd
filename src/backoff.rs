//! Backoff policies.
//!
//! A [`Backoff`] is an immutable prototype shared by every call made through a
//! client. Each logical call asks it for a fresh [`BackoffCursor`], so retry
//! counters and elapsed-time budgets never leak between concurrent calls.

use std::fmt;
use std::time::{Duration, Instant};

use rand::Rng;

/// Prototype that produces one cursor per logical call.
pub trait Backoff: fmt::Debug + Send + Sync {
    /// Starts a new cursor with its own counters and clock.
    fn start(&self) -> Box<dyn BackoffCursor>;
}

/// Call-scoped state yielding the wait before each retry.
pub trait BackoffCursor: Send {
    /// Delay before the next attempt, or `None` to stop retrying.
    fn next_delay(&mut self) -> Option<Duration>;
}

/// Exponential backoff with randomized jitter and an elapsed-time ceiling.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    /// Jitter spread; each delay is drawn from `interval * [1 - f, 1 + f]`.
    pub randomization_factor: f64,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Stop once elapsed time plus the next delay would exceed this.
    /// `None` never stops on time.
    pub max_elapsed_time: Option<Duration>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            randomization_factor: 0.5,
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Some(Duration::from_secs(30)),
        }
    }
}

impl ExponentialBackoff {
    /// Replaces the elapsed-time ceiling; `None` retries without a time limit.
    pub fn with_max_elapsed_time(mut self, max_elapsed_time: Option<Duration>) -> Self {
        self.max_elapsed_time = max_elapsed_time;
        self
    }
}

impl Backoff for ExponentialBackoff {
    fn start(&self) -> Box<dyn BackoffCursor> {
        Box::new(ExponentialCursor {
            policy: self.clone(),
            current_interval: self.initial_interval,
            started_at: Instant::now(),
        })
    }
}

struct ExponentialCursor {
    policy: ExponentialBackoff,
    current_interval: Duration,
    started_at: Instant,
}

impl ExponentialCursor {
    fn randomized_interval(&self) -> Duration {
        // NaN survives `clamp` and would make the sample range empty.
        let factor = match self.policy.randomization_factor {
            f if f.is_finite() => f.clamp(0.0, 1.0),
            _ => 0.0,
        };
        let interval = self.current_interval.as_nanos() as f64;
        if factor == 0.0 || interval == 0.0 {
            return self.current_interval;
        }
        let delta = interval * factor;
        let jittered = rand::thread_rng().gen_range((interval - delta)..=(interval + delta));
        Duration::from_nanos(jittered.round() as u64)
    }

    fn grow_interval(&mut self) {
        let max = self.policy.max_interval.as_nanos() as f64;
        let next = self.current_interval.as_nanos() as f64 * self.policy.multiplier;
        self.current_interval = if next.is_finite() && next < max {
            Duration::from_nanos(next.round() as u64)
        } else {
            self.policy.max_interval
        };
    }
}

impl BackoffCursor for ExponentialCursor {
    fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.randomized_interval();
        if let Some(budget) = self.policy.max_elapsed_time {
            if self.started_at.elapsed() + delay > budget {
                return None;
            }
        }
        self.grow_interval();
        Some(delay)
    }
}

/// Same delay before every retry, forever.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantBackoff {
    pub interval: Duration,
}

impl ConstantBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Backoff for ConstantBackoff {
    fn start(&self) -> Box<dyn BackoffCursor> {
        Box::new(ConstantCursor(self.interval))
    }
}

struct ConstantCursor(Duration);

impl BackoffCursor for ConstantCursor {
    fn next_delay(&mut self) -> Option<Duration> {
        Some(self.0)
    }
}

/// Never retries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopBackoff;

impl Backoff for StopBackoff {
    fn start(&self) -> Box<dyn BackoffCursor> {
        Box::new(StopBackoff)
    }
}

impl BackoffCursor for StopBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        None
    }
}

/// Caps another policy at `max_retries` retries.
#[derive(Clone, Debug)]
pub struct WithMaxRetries<B> {
    inner: B,
    max_retries: usize,
}

impl<B: Backoff> WithMaxRetries<B> {
    pub fn new(inner: B, max_retries: usize) -> Self {
        Self { inner, max_retries }
    }
}

impl<B: Backoff> Backoff for WithMaxRetries<B> {
    fn start(&self) -> Box<dyn BackoffCursor> {
        Box::new(MaxRetriesCursor {
            inner: self.inner.start(),
            remaining: self.max_retries,
        })
    }
}

struct MaxRetriesCursor {
    inner: Box<dyn BackoffCursor>,
    remaining: usize,
}

impl BackoffCursor for MaxRetriesCursor {
    fn next_delay(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.inner.next_delay()
    }
}
