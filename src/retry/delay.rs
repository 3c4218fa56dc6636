//! The composed retry delay strategy (component C3): how long to wait before
//! the next reconnect attempt, given the current base delay and optionally
//! the time of the last successful connection.

use std::time::{Duration, Instant};

use crate::retry::backoff::{BackoffParams, BackoffStrategy, ExponentialBackoff};
use crate::retry::jitter::{DefaultJitter, JitterParams, JitterStrategy, NoJitter};

/// Parameters passed to a [`RetryDelayStrategy`] on each retry.
#[derive(Clone, Copy)]
pub struct RetryDelayParams {
    /// The current base delay, in effect either the configured initial delay
    /// or the most recent `retry:` override.
    pub base_delay: Duration,
    pub current_time: Instant,
    pub last_success_time: Option<Instant>,
}

/// A pure function of [`RetryDelayParams`] returning the delay to use and the
/// strategy to use on the *next* retry. The retry count lives inside the
/// returned strategy value, never in a field the client mutates directly.
pub trait RetryDelayStrategy: Send + Sync {
    fn apply(&self, params: RetryDelayParams) -> (Duration, Box<dyn RetryDelayStrategy>);
}

pub struct DefaultRetryDelayStrategy {
    max_delay: Duration,
    reset_interval: Option<Duration>,
    backoff: Box<dyn BackoffStrategy>,
    jitter: Box<dyn JitterStrategy>,
    current_retry_count: u32,
}

impl DefaultRetryDelayStrategy {
    pub fn new(max_delay: Duration, reset_interval: Option<Duration>, backoff: Box<dyn BackoffStrategy>, jitter: Box<dyn JitterStrategy>) -> Self {
        DefaultRetryDelayStrategy {
            max_delay,
            reset_interval,
            backoff,
            jitter,
            current_retry_count: 0,
        }
    }

    /// The default composition: exponential backoff, 50% jitter, clamped to
    /// `max_delay` (30s if unspecified), with no automatic count reset.
    pub fn default_with(max_delay: Duration) -> Self {
        Self::new(max_delay, None, Box::new(ExponentialBackoff), Box::new(DefaultJitter::new(0.5)))
    }
}

impl RetryDelayStrategy for DefaultRetryDelayStrategy {
    fn apply(&self, params: RetryDelayParams) -> (Duration, Box<dyn RetryDelayStrategy>) {
        let mut new_retry_count = self.current_retry_count;
        if let (Some(reset_interval), Some(last_success)) = (self.reset_interval, params.last_success_time) {
            if params.current_time.saturating_duration_since(last_success) >= reset_interval {
                new_retry_count = 0;
            }
        }
        new_retry_count += 1;

        let (backoff_delay, next_backoff) = self.backoff.apply(BackoffParams {
            base_delay: params.base_delay,
            current_retry_count: new_retry_count,
        });
        let (jittered_delay, next_jitter) = self.jitter.apply(JitterParams { delay: backoff_delay });

        let mut delay = jittered_delay;
        if delay > self.max_delay {
            delay = self.max_delay;
            // Guards against overflow in future backoff computations; matches
            // the reference implementation's choice not to keep counting once
            // the clamp has kicked in.
            new_retry_count -= 1;
        }

        let next = DefaultRetryDelayStrategy {
            max_delay: self.max_delay,
            reset_interval: self.reset_interval,
            backoff: next_backoff,
            jitter: next_jitter,
            current_retry_count: new_retry_count,
        };
        (delay, Box::new(next))
    }
}

/// A [`RetryDelayStrategy`] that always returns zero delay; useful for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl RetryDelayStrategy for NoDelay {
    fn apply(&self, _params: RetryDelayParams) -> (Duration, Box<dyn RetryDelayStrategy>) {
        (Duration::ZERO, Box::new(NoDelay))
    }
}

pub fn default_retry_delay_strategy() -> Box<dyn RetryDelayStrategy> {
    Box::new(DefaultRetryDelayStrategy::default_with(Duration::from_secs(30)))
}

pub fn no_delay() -> Box<dyn RetryDelayStrategy> {
    Box::new(NoDelay)
}

/// Default composition with jitter disabled, for deterministic backoff tests.
pub fn default_retry_delay_strategy_no_jitter(max_delay: Duration) -> Box<dyn RetryDelayStrategy> {
    Box::new(DefaultRetryDelayStrategy::new(max_delay, None, Box::new(ExponentialBackoff), Box::new(NoJitter)))
}

pub fn default_retry_delay_strategy_with_reset(max_delay: Duration, reset_interval: Duration) -> Box<dyn RetryDelayStrategy> {
    Box::new(DefaultRetryDelayStrategy::new(max_delay, Some(reset_interval), Box::new(ExponentialBackoff), Box::new(NoJitter)))
}
