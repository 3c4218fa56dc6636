//! Connect strategy (component C5): abstracts the HTTP transport behind a
//! trait so the client never depends on `reqwest` directly.

pub mod http;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures::stream::AbortHandle;
use reqwest::header::HeaderMap;

use crate::error::SseError;

pub use http::HttpConnectStrategy;

/// Tells a [`ConnectStrategy`] how to reach the stream. Also settable as the
/// per-attempt override returned by a custom error strategy, mirroring
/// `ld_eventsource/request_params.py`'s `RequestParams`.
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub url: String,
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
}

impl RequestParams {
    pub fn new(url: impl Into<String>) -> Self {
        RequestParams {
            url: url.into(),
            headers: HeaderMap::new(),
            timeout: None,
        }
    }
}

/// A live connection: a byte-chunk stream, the response headers captured at
/// connect time, and a closer that can interrupt the stream from any context.
pub struct Connection {
    pub headers: HeaderMap,
    pub chunks: Pin<Box<dyn Stream<Item = Result<Bytes, SseError>> + Send>>,
    pub closer: Closer,
}

/// Interrupts the connection's byte stream. Idempotent and callable from any
/// task; a blocked read resolves to an orderly end rather than hanging,
/// because the stream is wrapped in [`futures::stream::Abortable`] rather
/// than reading from a blocking socket.
#[derive(Clone)]
pub struct Closer(pub(crate) AbortHandle);

impl Closer {
    pub fn close(&self) {
        self.0.abort();
    }
}

/// A factory of connections. Each call to `connect` races a fresh HTTP (or
/// other transport) attempt and is expected to honor `last_event_id` by
/// sending it as `Last-Event-ID` when present.
#[async_trait]
pub trait ConnectStrategy: Send + Sync {
    async fn connect(&self, last_event_id: Option<&str>) -> Result<Connection, SseError>;
}
