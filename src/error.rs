use reqwest::header::HeaderMap;
use thiserror::Error;

/// Errors produced while connecting to or streaming from an SSE endpoint.
///
/// Every variant that can carry response headers exposes them through
/// [`SseError::headers`], so callers never need to downcast.
#[derive(Error, Debug)]
pub enum SseError {
    #[error("HTTP error {status}")]
    HttpStatus {
        status: u16,
        headers: Option<HeaderMap>,
    },

    #[error("invalid content type \"{content_type}\"")]
    HttpContentType {
        content_type: String,
        headers: Option<HeaderMap>,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    /// Raised internally when a read or a reconnect delay is interrupted by
    /// [`crate::client::SSEClient::close`] or
    /// [`crate::client::SSEClient::interrupt`]. Never observed by callers:
    /// the client converts it into an orderly end of stream (or, for
    /// `interrupt`, into a retryable `Fault`).
    #[error("connection closed")]
    Closed,
}

impl SseError {
    /// Response headers captured at the time of the error, if any were available.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            SseError::HttpStatus { headers, .. } => headers.as_ref(),
            SseError::HttpContentType { headers, .. } => headers.as_ref(),
            SseError::Transport(_) | SseError::InvalidHeaderValue(_) | SseError::Closed => None,
        }
    }

    /// True for the two HTTP-response error kinds that the default error
    /// strategy treats as non-retryable.
    pub fn is_http_error(&self) -> bool {
        matches!(self, SseError::HttpStatus { .. } | SseError::HttpContentType { .. })
    }
}
