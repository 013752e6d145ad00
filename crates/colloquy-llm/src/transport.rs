//! Retrying transport. One request walks the state machine
//! `Pending → Sending → {Succeeded | RetryWait → Sending | Failed}`:
//! transport-level failures (connection, DNS, timeout) are retried on a
//! fixed escalating schedule, a response with a non-success status is
//! terminal immediately, and cancellation short-circuits out of any wait
//! or in-flight attempt.
//!
//! The raw exchange and the delay are both injectable so retry and
//! cancellation behavior is testable without sockets or wall-clock waits.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use colloquy_types::{ColloquyError, Result};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// TransportRequest / Exchange
// ---------------------------------------------------------------------------

/// One serialized request ready for delivery.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Backend identifier, for diagnostics and error wrapping.
    pub backend: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

/// What came back from one attempt that reached the server.
#[derive(Debug, Clone)]
pub struct ExchangeReply {
    pub status: u16,
    pub body: Vec<u8>,
}

/// The assumed raw capability: send bytes to a URL with headers, get a
/// status code and body back, or fail with a transport-class cause.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn send(&self, request: &TransportRequest) -> std::result::Result<ExchangeReply, String>;
}

/// Production exchange over reqwest.
pub struct HttpExchange {
    client: reqwest::Client,
}

impl HttpExchange {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exchange for HttpExchange {
    async fn send(&self, request: &TransportRequest) -> std::result::Result<ExchangeReply, String> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(ExchangeReply { status, body })
    }
}

// ---------------------------------------------------------------------------
// RetrySchedule
// ---------------------------------------------------------------------------

/// Fixed escalating delays between attempts. `delays.len()` retries are
/// allowed, so `delays.len() + 1` attempts total.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl RetrySchedule {
    /// Delays must strictly increase; an empty schedule (no retries) is
    /// allowed.
    pub fn new(delays: Vec<Duration>) -> Result<Self> {
        if delays.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ColloquyError::InvalidArgument(
                "retry delays must strictly increase".into(),
            ));
        }
        Ok(Self { delays })
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Delay before the retry that follows `attempt` (0-indexed), or
    /// `None` when `attempt` was the last one allowed.
    pub fn delay_after_attempt(&self, attempt: usize) -> Option<Duration> {
        self.delays.get(attempt).copied()
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// SendState
// ---------------------------------------------------------------------------

/// Observable state of one request's trip through the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Pending,
    Sending,
    RetryWait,
    Succeeded,
    Failed,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Cancellable delay, injectable so tests never sleep for real.
pub type DelayFn =
    Arc<dyn Fn(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct Transport {
    exchange: Box<dyn Exchange>,
    schedule: RetrySchedule,
    delay: DelayFn,
}

impl Transport {
    pub fn new() -> Self {
        Self::with_exchange(Box::new(HttpExchange::new()))
    }

    pub fn with_exchange(exchange: Box<dyn Exchange>) -> Self {
        Self {
            exchange,
            schedule: RetrySchedule::default(),
            delay: Arc::new(|d| Box::pin(tokio::time::sleep(d))),
        }
    }

    pub fn with_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_delay_fn(mut self, delay: DelayFn) -> Self {
        self.delay = delay;
        self
    }

    /// Deliver `request`, retrying transient failures per the schedule.
    /// Returns the raw success body.
    pub async fn send(
        &self,
        request: &TransportRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let mut states = Vec::new();
        self.send_with_states(request, cancel, &mut states).await
    }

    /// Like [`send`](Self::send), recording every state transition into
    /// `states` for observation.
    pub async fn send_with_states(
        &self,
        request: &TransportRequest,
        cancel: &CancellationToken,
        states: &mut Vec<SendState>,
    ) -> Result<Vec<u8>> {
        states.push(SendState::Pending);
        let mut last_cause = String::new();

        for attempt in 0..self.schedule.max_attempts() {
            if cancel.is_cancelled() {
                return Err(ColloquyError::Cancelled);
            }
            states.push(SendState::Sending);
            tracing::debug!(backend = %request.backend, attempt, "sending request");

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(ColloquyError::Cancelled),
                outcome = self.exchange.send(request) => outcome,
            };

            match outcome {
                Ok(reply) if (200..300).contains(&reply.status) => {
                    states.push(SendState::Succeeded);
                    tracing::debug!(backend = %request.backend, attempt, "request succeeded");
                    return Ok(reply.body);
                }
                // Non-success status is terminal, never retried.
                Ok(reply) => {
                    states.push(SendState::Failed);
                    tracing::warn!(
                        backend = %request.backend,
                        status = reply.status,
                        "backend reported failure"
                    );
                    return Err(ColloquyError::Status {
                        backend: request.backend.clone(),
                        status: reply.status,
                        body: String::from_utf8_lossy(&reply.body).into_owned(),
                    });
                }
                Err(cause) => match self.schedule.delay_after_attempt(attempt) {
                    Some(delay) => {
                        states.push(SendState::RetryWait);
                        tracing::warn!(
                            backend = %request.backend,
                            attempt,
                            delay_ms = %delay.as_millis(),
                            %cause,
                            "transient transport failure, retrying"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(ColloquyError::Cancelled),
                            _ = (self.delay)(delay) => {}
                        }
                        last_cause = cause;
                    }
                    None => {
                        states.push(SendState::Failed);
                        return Err(ColloquyError::RetriesExhausted {
                            backend: request.backend.clone(),
                            attempts: self.schedule.max_attempts(),
                            cause,
                        });
                    }
                },
            }
        }

        // The loop always returns on the final attempt.
        states.push(SendState::Failed);
        Err(ColloquyError::RetriesExhausted {
            backend: request.backend.clone(),
            attempts: self.schedule.max_attempts(),
            cause: last_cause,
        })
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn request() -> TransportRequest {
        TransportRequest {
            backend: "test".into(),
            url: "https://api.invalid/v1".into(),
            headers: vec![],
            body: json!({ "k": "v" }),
        }
    }

    fn no_delay() -> DelayFn {
        Arc::new(|_| Box::pin(std::future::ready(())))
    }

    /// Fails with a transport cause for the first `failures` calls, then
    /// answers 200.
    struct FlakyExchange {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Exchange for FlakyExchange {
        async fn send(
            &self,
            _request: &TransportRequest,
        ) -> std::result::Result<ExchangeReply, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(format!("connection reset (attempt {n})"))
            } else {
                Ok(ExchangeReply {
                    status: 200,
                    body: b"ok".to_vec(),
                })
            }
        }
    }

    /// Always answers with a fixed status.
    struct StatusExchange {
        status: u16,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Exchange for StatusExchange {
        async fn send(
            &self,
            _request: &TransportRequest,
        ) -> std::result::Result<ExchangeReply, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExchangeReply {
                status: self.status,
                body: b"{\"error\":\"quota\"}".to_vec(),
            })
        }
    }

    #[test]
    fn schedule_rejects_non_increasing_delays() {
        let err = RetrySchedule::new(vec![
            Duration::from_secs(2),
            Duration::from_secs(2),
        ])
        .unwrap_err();
        assert!(matches!(err, ColloquyError::InvalidArgument(_)));

        let err = RetrySchedule::new(vec![
            Duration::from_secs(3),
            Duration::from_secs(1),
        ])
        .unwrap_err();
        assert!(matches!(err, ColloquyError::InvalidArgument(_)));
    }

    #[test]
    fn default_schedule_escalates() {
        let schedule = RetrySchedule::default();
        assert_eq!(schedule.max_attempts(), 4);
        assert_eq!(
            schedule.delay_after_attempt(0),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            schedule.delay_after_attempt(2),
            Some(Duration::from_secs(4))
        );
        assert_eq!(schedule.delay_after_attempt(3), None);
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Transport::with_exchange(Box::new(FlakyExchange {
            failures: 0,
            calls: calls.clone(),
        }))
        .with_delay_fn(no_delay());

        let mut states = Vec::new();
        let body = transport
            .send_with_states(&request(), &CancellationToken::new(), &mut states)
            .await
            .unwrap();
        assert_eq!(body, b"ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            states,
            vec![SendState::Pending, SendState::Sending, SendState::Succeeded]
        );
    }

    #[tokio::test]
    async fn transient_failures_retry_with_increasing_delays() {
        let calls = Arc::new(AtomicUsize::new(0));
        let observed: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = observed.clone();
        let record_delay: DelayFn = Arc::new(move |d| {
            recorder.lock().unwrap().push(d);
            Box::pin(std::future::ready(()))
        });

        let transport = Transport::with_exchange(Box::new(FlakyExchange {
            failures: 2,
            calls: calls.clone(),
        }))
        .with_delay_fn(record_delay);

        let mut states = Vec::new();
        let body = transport
            .send_with_states(&request(), &CancellationToken::new(), &mut states)
            .await
            .unwrap();
        assert_eq!(body, b"ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            states,
            vec![
                SendState::Pending,
                SendState::Sending,
                SendState::RetryWait,
                SendState::Sending,
                SendState::RetryWait,
                SendState::Sending,
                SendState::Succeeded,
            ]
        );

        let delays = observed.lock().unwrap();
        assert_eq!(delays.len(), 2);
        assert!(delays[0] < delays[1], "delays must strictly increase");
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_cause() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Transport::with_exchange(Box::new(FlakyExchange {
            failures: usize::MAX,
            calls: calls.clone(),
        }))
        .with_delay_fn(no_delay());

        let err = transport
            .send(&request(), &CancellationToken::new())
            .await
            .unwrap_err();
        // Default schedule: 3 retries, 4 attempts.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            ColloquyError::RetriesExhausted {
                backend,
                attempts,
                cause,
            } => {
                assert_eq!(backend, "test");
                assert_eq!(attempts, 4);
                assert!(cause.contains("attempt 3"), "last cause, got: {cause}");
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_status_is_terminal_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Transport::with_exchange(Box::new(StatusExchange {
            status: 429,
            calls: calls.clone(),
        }))
        .with_delay_fn(no_delay());

        let mut states = Vec::new();
        let err = transport
            .send_with_states(&request(), &CancellationToken::new(), &mut states)
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            states,
            vec![SendState::Pending, SendState::Sending, SendState::Failed]
        );
        match err {
            ColloquyError::Status {
                backend,
                status,
                body,
            } => {
                assert_eq!(backend, "test");
                assert_eq!(status, 429);
                assert!(body.contains("quota"));
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_during_backoff_stops_everything() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        // The delay fn trips the token instead of sleeping, simulating a
        // cancellation that lands mid-backoff.
        let trip = cancel.clone();
        let cancelling_delay: DelayFn = Arc::new(move |_| {
            trip.cancel();
            Box::pin(std::future::pending::<()>())
        });

        let transport = Transport::with_exchange(Box::new(FlakyExchange {
            failures: usize::MAX,
            calls: calls.clone(),
        }))
        .with_delay_fn(cancelling_delay);

        let err = transport.send(&request(), &cancel).await.unwrap_err();
        assert!(matches!(err, ColloquyError::Cancelled), "got {err:?}");
        // The first attempt ran, then cancellation; no further attempts.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let transport = Transport::with_exchange(Box::new(FlakyExchange {
            failures: 0,
            calls: calls.clone(),
        }))
        .with_delay_fn(no_delay());

        let err = transport.send(&request(), &cancel).await.unwrap_err();
        assert!(matches!(err, ColloquyError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_schedule_means_single_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Transport::with_exchange(Box::new(FlakyExchange {
            failures: usize::MAX,
            calls: calls.clone(),
        }))
        .with_schedule(RetrySchedule::new(vec![]).unwrap())
        .with_delay_fn(no_delay());

        let err = transport
            .send(&request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ColloquyError::RetriesExhausted { attempts: 1, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
