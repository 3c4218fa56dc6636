//! Backoff sub-strategy: how the base delay grows with the retry count.

use std::time::Duration;

/// Parameters passed to a [`BackoffStrategy`] on each retry.
#[derive(Debug, Clone, Copy)]
pub struct BackoffParams {
    pub base_delay: Duration,
    pub current_retry_count: u32,
}

/// A pure function from [`BackoffParams`] to a delay plus a replacement
/// strategy, so stateful backoff schemes never need interior mutability: the
/// returned `next` is installed by the caller for the following attempt.
pub trait BackoffStrategy: Send + Sync {
    fn apply(&self, params: BackoffParams) -> (Duration, Box<dyn BackoffStrategy>);
}

/// `base * 2^(count - 1)`, stateless (every call returns a fresh boxed clone
/// of itself as `next`, matching the trait's signature without needing any
/// mutable state of its own).
#[derive(Debug, Default, Clone, Copy)]
pub struct ExponentialBackoff;

impl BackoffStrategy for ExponentialBackoff {
    fn apply(&self, params: BackoffParams) -> (Duration, Box<dyn BackoffStrategy>) {
        let delay = if params.base_delay.is_zero() || params.current_retry_count == 0 {
            Duration::ZERO
        } else {
            params.base_delay.saturating_mul(1u32.checked_shl(params.current_retry_count - 1).unwrap_or(u32::MAX))
        };
        (delay, Box::new(ExponentialBackoff))
    }
}

/// A [`BackoffStrategy`] that never grows the base delay (jitter, if any, may
/// still shrink it).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn apply(&self, _params: BackoffParams) -> (Duration, Box<dyn BackoffStrategy>) {
        (Duration::ZERO, Box::new(NoBackoff))
    }
}

pub fn no_backoff() -> Box<dyn BackoffStrategy> {
    Box::new(NoBackoff)
}
