//! Jitter sub-strategy: pseudo-random shrinkage of a backoff delay.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

/// Parameters passed to a [`JitterStrategy`]: the delay computed by the
/// backoff strategy, available for jitter schemes that want to scale with it.
#[derive(Debug, Clone, Copy)]
pub struct JitterParams {
    pub delay: Duration,
}

pub trait JitterStrategy: Send + Sync {
    fn apply(&self, params: JitterParams) -> (Duration, Box<dyn JitterStrategy>);
}

/// `delay - U * ratio * delay`, `U` drawn from a seedable generator.
///
/// Each call clones the current generator state, advances the clone once,
/// and hands the advanced clone back as the next strategy -- the live
/// generator here is never mutated or shared across calls, so the strategy
/// stays value-like.
pub struct DefaultJitter {
    ratio: f64,
    rng: StdRng,
}

impl DefaultJitter {
    pub fn new(ratio: f64) -> Self {
        DefaultJitter { ratio, rng: StdRng::from_entropy() }
    }

    pub fn with_seed(ratio: f64, seed: u64) -> Self {
        DefaultJitter { ratio, rng: StdRng::seed_from_u64(seed) }
    }
}

impl JitterStrategy for DefaultJitter {
    fn apply(&self, params: JitterParams) -> (Duration, Box<dyn JitterStrategy>) {
        let mut rng = self.rng.clone();
        let u: f64 = rng.gen_range(0.0..1.0);
        let delay_secs = params.delay.as_secs_f64();
        let adjusted = (delay_secs - u * self.ratio * delay_secs).max(0.0);

        let next = DefaultJitter { ratio: self.ratio, rng };
        (Duration::from_secs_f64(adjusted), Box::new(next))
    }
}

/// A [`JitterStrategy`] that always returns the backoff delay unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJitter;

impl JitterStrategy for NoJitter {
    fn apply(&self, params: JitterParams) -> (Duration, Box<dyn JitterStrategy>) {
        (params.delay, Box::new(NoJitter))
    }
}
