//! Reference [`ConnectStrategy`] backed by `reqwest`, grounded on
//! `hue/client.rs` (header construction) and `sse/listen.rs` /
//! `sse_listen.rs` (GET + `bytes_stream()`) from the teacher repo.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::{info, instrument, warn};

use crate::connect::{Closer, Connection, ConnectStrategy, RequestParams};
use crate::error::SseError;

const REDIRECT_LIMIT: usize = 3;

/// Connects to an SSE endpoint over HTTP.
pub struct HttpConnectStrategy {
    client: Client,
    params: RequestParams,
}

impl HttpConnectStrategy {
    /// Builds its own `reqwest::Client` with a bounded redirect policy and no
    /// transport-level retry; reconnection is the `SSEClient`'s job, not
    /// `reqwest`'s.
    pub fn new(params: RequestParams) -> Result<Self, SseError> {
        let client = Client::builder().redirect(Policy::limited(REDIRECT_LIMIT)).build()?;
        Ok(HttpConnectStrategy { client, params })
    }

    /// Uses a caller-supplied client (e.g. one borrowed from a connection
    /// pool) instead of creating one. The caller is responsible for its
    /// redirect policy.
    pub fn with_client(client: Client, params: RequestParams) -> Self {
        HttpConnectStrategy { client, params }
    }
}

#[async_trait]
impl ConnectStrategy for HttpConnectStrategy {
    #[instrument(skip(self), fields(url = %self.params.url))]
    async fn connect(&self, last_event_id: Option<&str>) -> Result<Connection, SseError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        for (name, value) in self.params.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(id) = last_event_id {
            if !id.is_empty() {
                headers.insert("Last-Event-ID", HeaderValue::from_str(id)?);
            }
        }

        info!("Connecting to SSE stream {}...", self.params.url);
        let mut request = self.client.get(&self.params.url).headers(headers);
        if let Some(timeout) = self.params.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.as_u16() >= 400 || status.as_u16() == 204 {
            warn!(status = %status, "⚠️ Connecting to SSE stream {}... failed", self.params.url);
            return Err(SseError::HttpStatus {
                status: status.as_u16(),
                headers: Some(response.headers().clone()),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("text/event-stream") {
            return Err(SseError::HttpContentType {
                content_type,
                headers: Some(response.headers().clone()),
            });
        }

        info!(status = %status, "✅ Connecting to SSE stream {}... OK", self.params.url);
        let headers = response.headers().clone();
        let byte_stream = response.bytes_stream().map(|r| r.map_err(SseError::from));
        let (abortable, handle) = futures::stream::abortable(byte_stream);

        Ok(Connection {
            headers,
            chunks: Box::pin(abortable),
            closer: Closer(handle),
        })
    }
}
