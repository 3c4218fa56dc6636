//! A long-lived client for Server-Sent Events (`text/event-stream`) endpoints.
//!
//! ```no_run
//! use futures::StreamExt;
//! use sse_client::SSEClient;
//!
//! # async fn run() -> Result<(), sse_client::SseError> {
//! let mut client = SSEClient::builder("https://example.com/stream").build()?;
//! let mut events = client.events();
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event?);
//! }
//! # Ok(())
//! # }
//! ```

mod line_reader;
mod sse_reader;

pub mod client;
pub mod connect;
pub mod error;
pub mod error_strategy;
pub mod event;
pub mod retry;

pub use client::{SSEClient, SSEClientBuilder, SSEClientHandle};
pub use connect::{Closer, Connection, ConnectStrategy, HttpConnectStrategy, RequestParams};
pub use error::SseError;
pub use error_strategy::{always_continue, always_fail, default_error_strategy, from_fn, retry_for_status, ErrorStrategy, RetryDecision};
pub use event::{Comment, Event, Fault, Notification, Start};
pub use retry::{
    default_retry_delay_strategy, default_retry_delay_strategy_no_jitter, default_retry_delay_strategy_with_reset, no_backoff, no_delay,
    BackoffParams, BackoffStrategy, DefaultJitter, DefaultRetryDelayStrategy, ExponentialBackoff, JitterParams, JitterStrategy, NoBackoff,
    NoDelay, NoJitter, RetryDelayParams, RetryDelayStrategy,
};
