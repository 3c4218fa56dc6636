//! Error strategy (component C4): decides whether a fault ends the stream or
//! triggers a reconnect.

use crate::error::SseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Fail,
    Continue,
}

/// A pure function of the fault's error (`None` means orderly EOF) returning
/// the decision and the strategy to use for the *next* fault. Purity permits
/// stateful policies ("continue up to N times") without mutable cells.
pub trait ErrorStrategy: Send + Sync {
    fn apply(&self, error: Option<&SseError>) -> (RetryDecision, Box<dyn ErrorStrategy>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysFail;

impl ErrorStrategy for AlwaysFail {
    fn apply(&self, _error: Option<&SseError>) -> (RetryDecision, Box<dyn ErrorStrategy>) {
        (RetryDecision::Fail, Box::new(AlwaysFail))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysContinue;

impl ErrorStrategy for AlwaysContinue {
    fn apply(&self, _error: Option<&SseError>) -> (RetryDecision, Box<dyn ErrorStrategy>) {
        (RetryDecision::Continue, Box::new(AlwaysContinue))
    }
}

/// Lifts a plain `Fn(Option<&SseError>) -> RetryDecision` into an
/// [`ErrorStrategy`]. Stateless by construction; wrap your own type
/// implementing [`ErrorStrategy`] directly if you need state across faults.
pub struct FromFn<F>(F)
where
    F: Fn(Option<&SseError>) -> RetryDecision + Send + Sync + Clone + 'static;

impl<F> FromFn<F>
where
    F: Fn(Option<&SseError>) -> RetryDecision + Send + Sync + Clone + 'static,
{
    pub fn new(f: F) -> Self {
        FromFn(f)
    }
}

impl<F> ErrorStrategy for FromFn<F>
where
    F: Fn(Option<&SseError>) -> RetryDecision + Send + Sync + Clone + 'static,
{
    fn apply(&self, error: Option<&SseError>) -> (RetryDecision, Box<dyn ErrorStrategy>) {
        (self.0(error), Box::new(FromFn(self.0.clone())))
    }
}

pub fn always_fail() -> Box<dyn ErrorStrategy> {
    Box::new(AlwaysFail)
}

pub fn always_continue() -> Box<dyn ErrorStrategy> {
    Box::new(AlwaysContinue)
}

pub fn from_fn<F>(f: F) -> Box<dyn ErrorStrategy>
where
    F: Fn(Option<&SseError>) -> RetryDecision + Send + Sync + Clone + 'static,
{
    Box::new(FromFn::new(f))
}

/// CONTINUE on an I/O error or orderly EOF, FAIL on an HTTP status or
/// content-type error. Supplements `spec.md`'s bare `always_fail` default,
/// adapted from `ld_eventsource/retry_filter.py`'s `default_retry_filter`;
/// the documented constructor-level default stays `always_fail()`.
pub fn default_error_strategy() -> Box<dyn ErrorStrategy> {
    from_fn(|error| match error {
        Some(e) if e.is_http_error() => RetryDecision::Fail,
        _ => RetryDecision::Continue,
    })
}

/// Retries only while the fault is an HTTP status error with the given code;
/// fails on anything else. Mirrors the test helper `retry_for_status` used
/// throughout `ld_eventsource`'s test suite.
pub fn retry_for_status(status: u16) -> Box<dyn ErrorStrategy> {
    from_fn(move |error| match error {
        Some(SseError::HttpStatus { status: s, .. }) if *s == status => RetryDecision::Continue,
        _ => RetryDecision::Fail,
    })
}
