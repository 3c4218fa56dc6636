//! Retry delay strategy (component C3): backoff, jitter, and their composition.

pub mod backoff;
pub mod delay;
pub mod jitter;

pub use backoff::{no_backoff, BackoffParams, BackoffStrategy, ExponentialBackoff, NoBackoff};
pub use delay::{
    default_retry_delay_strategy, default_retry_delay_strategy_no_jitter, default_retry_delay_strategy_with_reset, no_delay,
    DefaultRetryDelayStrategy, NoDelay, RetryDelayParams, RetryDelayStrategy,
};
pub use jitter::{DefaultJitter, JitterParams, JitterStrategy, NoJitter};
