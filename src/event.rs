use reqwest::header::HeaderMap;

use crate::error::SseError;

/// A single dispatched SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
    pub last_event_id: Option<String>,
}

impl Event {
    pub(crate) fn new(event: Option<String>, data: String, id: Option<String>, last_event_id: Option<String>) -> Self {
        Event {
            event: event.filter(|e| !e.is_empty()).unwrap_or_else(|| "message".to_string()),
            data,
            id,
            last_event_id,
        }
    }
}

/// A comment line (`:text`), with one leading space stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment(pub String);

/// Emitted exactly once per successful connection, before any `Event`/`Comment` from it.
#[derive(Debug, Clone)]
pub struct Start {
    pub headers: Option<HeaderMap>,
}

/// Emitted when a connection ends, either by orderly EOF (`error: None`) or by
/// a transport/HTTP error. `will_retry` reflects the error strategy's verdict
/// for this fault.
#[derive(Debug)]
pub struct Fault {
    pub error: Option<SseError>,
    pub will_retry: bool,
}

impl Fault {
    /// Reads through to the underlying error's headers, if any.
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.error.as_ref().and_then(SseError::headers)
    }
}

/// The unified item type of [`crate::client::SSEClient::all`].
#[derive(Debug)]
pub enum Notification {
    Start(Start),
    Event(Event),
    Comment(Comment),
    Fault(Fault),
}

impl Notification {
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Notification::Event(e) => Some(e),
            _ => None,
        }
    }
}
