//! The top-level SSE client state machine (component C6):
//! IDLE -> CONNECTING -> STREAMING -> FAULTED -> DELAYING -> CONNECTING ...

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_stream::stream;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use crate::connect::{Closer, Connection, ConnectStrategy, HttpConnectStrategy, RequestParams};
use crate::error::SseError;
use crate::error_strategy::{always_fail, ErrorStrategy, RetryDecision};
use crate::event::{Comment, Event, Fault, Notification, Start};
use crate::line_reader::lines;
use crate::retry::delay::{default_retry_delay_strategy, RetryDelayParams, RetryDelayStrategy};
use crate::sse_reader::{SseItem, SseReader};

struct Shared {
    closed: AtomicBool,
    notify: Notify,
    current_closer: Mutex<Option<Closer>>,
    next_retry_delay: Mutex<Option<Duration>>,
}

impl Default for Shared {
    fn default() -> Self {
        Shared {
            closed: AtomicBool::new(false),
            notify: Notify::new(),
            current_closer: Mutex::new(None),
            next_retry_delay: Mutex::new(None),
        }
    }
}

/// A long-lived SSE client. One logical stream per instance: `events`/`all`
/// borrow `&mut self` and are not re-entrant, but `close`/`interrupt`/
/// `next_retry_delay` take `&self` and may be called from any task.
pub struct SSEClient {
    connect: Box<dyn ConnectStrategy>,
    base_error_strategy: Arc<dyn ErrorStrategy>,
    current_error_strategy: Arc<dyn ErrorStrategy>,
    base_delay_strategy: Arc<dyn RetryDelayStrategy>,
    current_delay_strategy: Arc<dyn RetryDelayStrategy>,
    base_delay: Duration,
    retry_delay_reset_threshold: Duration,
    last_event_id: Option<String>,
    connected_time: Option<Instant>,
    last_success_time: Option<Instant>,
    pending_connection: Option<Connection>,
    shared: Arc<Shared>,
}

impl SSEClient {
    pub fn builder(url: impl Into<String>) -> SSEClientBuilder {
        SSEClientBuilder::new(url)
    }

    /// Performs (and retries, per the error strategy) the first connection
    /// attempt. Not required: the first pull on [`Self::events`]/[`Self::all`]
    /// does the same if `start` was never called. Returns an error only when
    /// the error strategy decides FAIL for a connect failure.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<(), SseError> {
        loop {
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(SseError::Closed);
            }

            match self.connect.connect(self.last_event_id.as_deref()).await {
                Ok(conn) => {
                    self.connected_time = Some(Instant::now());
                    self.current_error_strategy = Arc::clone(&self.base_error_strategy);
                    self.pending_connection = Some(conn);
                    return Ok(());
                }
                Err(e) => {
                    warn!("SSE connect failed: {e}");
                    let decision = self.decide(Some(&e));
                    let delay = self.note_fault_delay();
                    if decision == RetryDecision::Fail {
                        return Err(e);
                    }
                    let disconnected_time = Instant::now();
                    if !self.sleep_cancellable(remaining(delay, disconnected_time)).await {
                        return Err(SseError::Closed);
                    }
                }
            }
        }
    }

    /// Idempotent. Closes the current connection (if any), wakes a pending
    /// reconnect delay, and causes the next `events`/`all` pull to end.
    pub fn close(&self) {
        close_shared(&self.shared);
    }

    /// Forces the current connection closed without marking the client
    /// closed; the next `events`/`all` pull reconnects as if the connection
    /// had failed naturally.
    pub fn interrupt(&self) {
        interrupt_shared(&self.shared);
    }

    /// The delay computed for the most recent fault, observable after a
    /// `Fault` has been yielded on [`Self::all`].
    pub fn next_retry_delay(&self) -> Option<Duration> {
        *self.shared.next_retry_delay.lock().unwrap()
    }

    /// A cheap, `Clone`-able, `Send`-able handle that can call
    /// [`SSEClientHandle::close`]/[`SSEClientHandle::interrupt`] from a task
    /// other than the one driving [`Self::events`]/[`Self::all`] -- which,
    /// since those borrow `&mut self`, cannot themselves be called while a
    /// stream from this client is in scope.
    pub fn handle(&self) -> SSEClientHandle {
        SSEClientHandle { shared: Arc::clone(&self.shared) }
    }

    /// A lazy stream of every notification: `Start`, `Event`, `Comment`, and
    /// `Fault`. Not re-entrant; drive one at a time.
    pub fn all(&mut self) -> impl Stream<Item = Notification> + '_ {
        stream! {
            loop {
                if self.shared.closed.load(Ordering::SeqCst) {
                    return;
                }

                let conn = if let Some(conn) = self.pending_connection.take() {
                    conn
                } else {
                    match self.connect.connect(self.last_event_id.as_deref()).await {
                        Ok(conn) => {
                            self.connected_time = Some(Instant::now());
                            self.current_error_strategy = Arc::clone(&self.base_error_strategy);
                            conn
                        }
                        Err(e) => {
                            warn!("SSE connect failed: {e}");
                            if self.shared.closed.load(Ordering::SeqCst) {
                                return;
                            }
                            let will_retry = self.decide(Some(&e)) == RetryDecision::Continue;
                            let delay = self.note_fault_delay();
                            yield Notification::Fault(Fault { error: Some(e), will_retry });
                            if !will_retry {
                                return;
                            }
                            let disconnected_time = Instant::now();
                            if !self.sleep_cancellable(remaining(delay, disconnected_time)).await {
                                return;
                            }
                            continue;
                        }
                    }
                };

                *self.shared.current_closer.lock().unwrap() = Some(conn.closer.clone());
                info!("SSE stream connected");
                yield Notification::Start(Start { headers: Some(conn.headers.clone()) });

                let mut reader = SseReader::new(self.last_event_id.clone());
                let mut line_stream = Box::pin(lines(conn.chunks));
                let stream_error = loop {
                    match line_stream.next().await {
                        Some(Ok(line)) => {
                            let item = reader.process_line(&line);
                            if let Some(ms) = reader.take_pending_retry_ms() {
                                debug!("retry: override, base delay now {ms}ms");
                                self.base_delay = Duration::from_millis(ms);
                            }
                            match item {
                                Some(SseItem::Event(event)) => {
                                    self.last_event_id = event.last_event_id.clone();
                                    yield Notification::Event(event);
                                }
                                Some(SseItem::Comment(comment)) => yield Notification::Comment(comment),
                                None => {}
                            }
                        }
                        Some(Err(e)) => break Some(e),
                        None => break None,
                    }
                };
                self.last_event_id = reader.last_event_id().map(str::to_string).or_else(|| self.last_event_id.take());
                *self.shared.current_closer.lock().unwrap() = None;

                if self.shared.closed.load(Ordering::SeqCst) {
                    return;
                }

                self.last_success_time = self.connected_time;
                match &stream_error {
                    Some(e) => warn!("SSE stream error: {e}"),
                    None => info!("SSE stream ended"),
                }

                let will_retry = self.decide(stream_error.as_ref()) == RetryDecision::Continue;
                let delay = self.note_fault_delay();
                yield Notification::Fault(Fault { error: stream_error, will_retry });
                if !will_retry {
                    return;
                }

                let disconnected_time = Instant::now();
                if !self.sleep_cancellable(remaining(delay, disconnected_time)).await {
                    return;
                }
            }
        }
    }

    /// A lazy stream of [`Event`]s. A non-retryable fault with an error ends
    /// the stream with that error as its final item; a non-retryable fault
    /// without an error (orderly EOF) ends the stream silently.
    pub fn events(&mut self) -> impl Stream<Item = Result<Event, SseError>> + '_ {
        stream! {
            let mut all = Box::pin(self.all());
            while let Some(item) = all.next().await {
                match item {
                    Notification::Event(event) => yield Ok(event),
                    Notification::Fault(Fault { error, will_retry }) => {
                        if !will_retry {
                            if let Some(err) = error {
                                yield Err(err);
                            }
                            return;
                        }
                    }
                    Notification::Start(_) | Notification::Comment(_) => {}
                }
            }
        }
    }

    fn decide(&mut self, error: Option<&SseError>) -> RetryDecision {
        let (decision, next) = self.current_error_strategy.apply(error);
        self.current_error_strategy = Arc::from(next);
        decision
    }

    /// Computes the next reconnect delay, applying the coarse
    /// `retry_delay_reset_threshold` reset (distinct from any `reset_interval`
    /// baked into the delay strategy itself) before delegating.
    fn note_fault_delay(&mut self) -> Duration {
        let now = Instant::now();
        if let Some(connected_time) = self.connected_time {
            if now.saturating_duration_since(connected_time) >= self.retry_delay_reset_threshold {
                self.current_delay_strategy = Arc::clone(&self.base_delay_strategy);
            }
        }

        let (delay, next) = self.current_delay_strategy.apply(RetryDelayParams {
            base_delay: self.base_delay,
            current_time: now,
            last_success_time: self.last_success_time,
        });
        self.current_delay_strategy = Arc::from(next);
        *self.shared.next_retry_delay.lock().unwrap() = Some(delay);
        delay
    }

    async fn sleep_cancellable(&self, duration: Duration) -> bool {
        sleep_cancellable(&self.shared, duration).await
    }
}

fn remaining(delay: Duration, disconnected_time: Instant) -> Duration {
    delay.saturating_sub(disconnected_time.elapsed())
}

fn close_shared(shared: &Shared) {
    shared.closed.store(true, Ordering::SeqCst);
    if let Some(closer) = shared.current_closer.lock().unwrap().take() {
        closer.close();
    }
    shared.notify.notify_waiters();
}

fn interrupt_shared(shared: &Shared) {
    if let Some(closer) = shared.current_closer.lock().unwrap().as_ref() {
        closer.close();
    }
}

/// See [`SSEClient::handle`].
#[derive(Clone)]
pub struct SSEClientHandle {
    shared: Arc<Shared>,
}

impl SSEClientHandle {
    pub fn close(&self) {
        close_shared(&self.shared);
    }

    pub fn interrupt(&self) {
        interrupt_shared(&self.shared);
    }

    pub fn next_retry_delay(&self) -> Option<Duration> {
        *self.shared.next_retry_delay.lock().unwrap()
    }
}

async fn sleep_cancellable(shared: &Shared, duration: Duration) -> bool {
    if shared.closed.load(Ordering::SeqCst) {
        return false;
    }
    let notified = shared.notify.notified();
    tokio::pin!(notified);
    tokio::select! {
        _ = tokio::time::sleep(duration) => !shared.closed.load(Ordering::SeqCst),
        _ = &mut notified => false,
    }
}

/// Builds an [`SSEClient`]. Every constructor parameter from `spec.md` §6.3 is
/// a builder method; the reference HTTP connect strategy is used unless
/// [`SSEClientBuilder::connect_strategy`] overrides it.
pub struct SSEClientBuilder {
    url: String,
    initial_retry_delay: Duration,
    retry_delay_strategy: Option<Box<dyn RetryDelayStrategy>>,
    retry_delay_reset_threshold: Duration,
    error_strategy: Option<Box<dyn ErrorStrategy>>,
    last_event_id: Option<String>,
    connect: Option<Box<dyn ConnectStrategy>>,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl SSEClientBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        SSEClientBuilder {
            url: url.into(),
            initial_retry_delay: Duration::from_secs(1),
            retry_delay_strategy: None,
            retry_delay_reset_threshold: Duration::from_secs(60),
            error_strategy: None,
            last_event_id: None,
            connect: None,
            headers: HeaderMap::new(),
            timeout: None,
        }
    }

    pub fn initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }

    pub fn retry_delay_strategy(mut self, strategy: Box<dyn RetryDelayStrategy>) -> Self {
        self.retry_delay_strategy = Some(strategy);
        self
    }

    pub fn retry_delay_reset_threshold(mut self, threshold: Duration) -> Self {
        self.retry_delay_reset_threshold = threshold;
        self
    }

    pub fn error_strategy(mut self, strategy: Box<dyn ErrorStrategy>) -> Self {
        self.error_strategy = Some(strategy);
        self
    }

    pub fn last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = Some(id.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_strategy(mut self, connect: Box<dyn ConnectStrategy>) -> Self {
        self.connect = Some(connect);
        self
    }

    pub fn build(self) -> Result<SSEClient, SseError> {
        let connect = match self.connect {
            Some(c) => c,
            None => Box::new(HttpConnectStrategy::new(RequestParams {
                url: self.url,
                headers: self.headers,
                timeout: self.timeout,
            })?),
        };

        let error_strategy: Arc<dyn ErrorStrategy> = self.error_strategy.map(Arc::from).unwrap_or_else(|| Arc::from(always_fail()));
        let delay_strategy: Arc<dyn RetryDelayStrategy> =
            self.retry_delay_strategy.map(Arc::from).unwrap_or_else(|| Arc::from(default_retry_delay_strategy()));

        Ok(SSEClient {
            connect,
            base_error_strategy: Arc::clone(&error_strategy),
            current_error_strategy: error_strategy,
            base_delay_strategy: Arc::clone(&delay_strategy),
            current_delay_strategy: delay_strategy,
            base_delay: self.initial_retry_delay,
            retry_delay_reset_threshold: self.retry_delay_reset_threshold,
            last_event_id: self.last_event_id,
            connected_time: None,
            last_success_time: None,
            pending_connection: None,
            shared: Arc::new(Shared::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_strategy::{always_continue, retry_for_status};
    use crate::retry::delay::no_delay;
    use futures::StreamExt as _;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn two_events_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("event: a\ndata: d1\n\nevent: b\ndata: d2\n\n")
            .create_async()
            .await;

        let mut client = SSEClient::builder(server.url()).build().unwrap();
        let events: Vec<Event> = client.events().take(2).map(|r| r.unwrap()).collect().await;

        assert_eq!(events[0].event, "a");
        assert_eq!(events[0].data, "d1");
        assert_eq!(events[1].event, "b");
        assert_eq!(events[1].data, "d2");
    }

    #[tokio::test]
    async fn all_surfaces_start_before_events_and_comments() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("event: event1\ndata: data1\n\n:whatever\nevent: event2\ndata: data2\n\n")
            .create_async()
            .await;

        let mut client = SSEClient::builder(server.url()).build().unwrap();
        let items: Vec<Notification> = client.all().take(4).collect().await;

        assert!(matches!(items[0], Notification::Start(_)));
        assert!(matches!(&items[1], Notification::Event(e) if e.event == "event1" && e.data == "data1"));
        assert!(matches!(&items[2], Notification::Comment(Comment(text)) if text == "whatever"));
        assert!(matches!(&items[3], Notification::Event(e) if e.event == "event2" && e.data == "data2"));
    }

    #[tokio::test]
    async fn http_status_error_on_initial_connect_fails_start() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/").with_status(400).create_async().await;

        let mut client = SSEClient::builder(server.url()).build().unwrap();
        let err = client.start().await.unwrap_err();
        assert!(matches!(err, SseError::HttpStatus { status: 400, .. }));
    }

    /// A connect strategy that returns one canned result per call, in order,
    /// for deterministic multi-attempt tests (real transports can't promise a
    /// mock server answers request N with a different status than request
    /// N+1 in a fixed order).
    struct ScriptedConnect {
        results: Mutex<std::vec::IntoIter<Result<&'static str, SseError>>>,
    }

    impl ScriptedConnect {
        fn new(results: Vec<Result<&'static str, SseError>>) -> Self {
            ScriptedConnect { results: Mutex::new(results.into_iter()) }
        }
    }

    #[async_trait::async_trait]
    impl ConnectStrategy for ScriptedConnect {
        async fn connect(&self, _last_event_id: Option<&str>) -> Result<Connection, SseError> {
            match self.results.lock().unwrap().next().expect("script exhausted") {
                Ok(body) => {
                    let bytes = bytes::Bytes::from_static(body.as_bytes());
                    let (abortable, handle) =
                        futures::stream::abortable(futures::stream::once(async move { Ok::<_, SseError>(bytes) }));
                    Ok(Connection {
                        headers: HeaderMap::new(),
                        chunks: Box::pin(abortable),
                        closer: Closer(handle),
                    })
                }
                Err(e) => Err(e),
            }
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_initial_503() {
        let connect = ScriptedConnect::new(vec![
            Err(SseError::HttpStatus { status: 503, headers: None }),
            Ok("data: data1\n\n"),
        ]);

        let mut client = SSEClient::builder("unused")
            .connect_strategy(Box::new(connect))
            .retry_delay_strategy(no_delay())
            .error_strategy(retry_for_status(503))
            .build()
            .unwrap();

        client.start().await.unwrap();
        let event = client.events().next().await.unwrap().unwrap();
        assert_eq!(event.data, "data1");
    }

    #[tokio::test]
    async fn retry_succeeds_then_fails_with_different_status() {
        let connect = ScriptedConnect::new(vec![
            Err(SseError::HttpStatus { status: 503, headers: None }),
            Err(SseError::HttpStatus { status: 400, headers: None }),
        ]);

        let mut client = SSEClient::builder("unused")
            .connect_strategy(Box::new(connect))
            .retry_delay_strategy(no_delay())
            .error_strategy(retry_for_status(503))
            .build()
            .unwrap();

        let err = client.start().await.unwrap_err();
        assert!(matches!(err, SseError::HttpStatus { status: 400, .. }));
    }

    #[tokio::test]
    async fn non_retryable_failure_ends_events_silently_on_orderly_eof() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("event: event1\ndata: data1\n\n")
            .create_async()
            .await;

        let mut client = SSEClient::builder(server.url()).build().unwrap();
        let events: Vec<Result<Event, SseError>> = client.events().collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[tokio::test]
    async fn non_retryable_failure_yields_a_terminal_fault_on_all() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("event: event1\ndata: data1\n\n")
            .create_async()
            .await;

        let mut client = SSEClient::builder(server.url()).build().unwrap();
        let items: Vec<Notification> = client.all().collect().await;

        assert!(matches!(items[0], Notification::Start(_)));
        assert!(matches!(items[1], Notification::Event(_)));
        match &items[2] {
            Notification::Fault(f) => {
                assert!(f.error.is_none());
                assert!(!f.will_retry);
            }
            other => panic!("expected Fault, got {other:?}"),
        }
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_the_stream() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("event: event1\ndata: data1\n\n")
            .create_async()
            .await;

        let mut client = SSEClient::builder(server.url())
            .error_strategy(always_continue())
            .retry_delay_strategy(no_delay())
            .build()
            .unwrap();

        client.close();
        client.close();
        let items: Vec<Notification> = client.all().collect().await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn interrupt_forces_a_reconnect_without_closing_the_client() {
        #[derive(Default)]
        struct HangsThenSucceeds {
            attempts: std::sync::atomic::AtomicUsize,
        }

        #[async_trait::async_trait]
        impl ConnectStrategy for HangsThenSucceeds {
            async fn connect(&self, _last_event_id: Option<&str>) -> Result<Connection, SseError> {
                if self.attempts.fetch_add(1, Ordering::SeqCst) > 0 {
                    let bytes = bytes::Bytes::from_static(b"data: after-interrupt\n\n");
                    let (abortable, handle) =
                        futures::stream::abortable(futures::stream::once(async move { Ok::<_, SseError>(bytes) }));
                    return Ok(Connection { headers: HeaderMap::new(), chunks: Box::pin(abortable), closer: Closer(handle) });
                }
                let (abortable, handle) = futures::stream::abortable(futures::stream::pending::<Result<bytes::Bytes, SseError>>());
                Ok(Connection { headers: HeaderMap::new(), chunks: Box::pin(abortable), closer: Closer(handle) })
            }
        }

        let mut client = SSEClient::builder("unused")
            .connect_strategy(Box::new(HangsThenSucceeds::default()))
            .error_strategy(always_continue())
            .retry_delay_strategy(no_delay())
            .build()
            .unwrap();
        let handle = client.handle();

        let task = tokio::spawn(async move {
            let events: Vec<Event> = client.events().take(1).map(|r| r.unwrap()).collect().await;
            events
        });

        // give the first (hanging) connection time to be established before interrupting it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.interrupt();

        let events = task.await.unwrap();
        assert_eq!(events[0].data, "after-interrupt");
    }

    #[tokio::test]
    async fn next_retry_delay_is_observable_after_a_fault() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("data: d\n\n")
            .create_async()
            .await;

        let mut client = SSEClient::builder(server.url())
            .error_strategy(always_continue())
            .retry_delay_strategy(no_delay())
            .initial_retry_delay(Duration::from_millis(5))
            .build()
            .unwrap();

        assert_eq!(client.next_retry_delay(), None);
        let mut all = Box::pin(client.all());
        // Start, Event, Fault -- then the stream would reconnect against a now-exhausted mock.
        let _start = all.next().await;
        let _event = all.next().await;
        let _fault = all.next().await;
        drop(all);
        assert_eq!(client.next_retry_delay(), Some(Duration::ZERO));
    }
}
