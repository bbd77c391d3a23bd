use std::{
    collections::VecDeque,
    future::pending,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use backoff_http::{
    BoxError, CancelReason, CancellationToken, ClientOptions, ConstantBackoff, Context,
    DefaultClassifier, HttpClient, HttpError, PreparedRequest, RequestOption, StatusClass,
    StatusCode, StopBackoff, Transport, TransportResponse, WithMaxRetries,
};
use bytes::Bytes;
use serde::Serialize;

#[derive(Clone, Debug)]
enum Step {
    Respond(u16, &'static str),
    ConnectError,
    BodyError(u16),
    HangOnSend,
    HangOnBody(u16),
}

#[derive(Clone)]
struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Step>>>,
    fallback: Step,
    sent: Arc<Mutex<Vec<PreparedRequest>>>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into())),
            fallback: Step::Respond(500, "script exhausted"),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn always(step: Step) -> Self {
        let mut transport = Self::new(Vec::new());
        transport.fallback = step;
        transport
    }

    fn sent(&self) -> Vec<PreparedRequest> {
        self.sent.lock().expect("sent log mutex must not be poisoned").clone()
    }
}

struct ScriptedResponse {
    status: StatusCode,
    body: Step,
}

#[async_trait]
impl TransportResponse for ScriptedResponse {
    fn status(&self) -> StatusCode {
        self.status
    }

    async fn bytes(self: Box<Self>) -> Result<Bytes, BoxError> {
        match self.body {
            Step::Respond(_, body) => Ok(Bytes::from_static(body.as_bytes())),
            Step::BodyError(_) => Err("connection reset while reading body".into()),
            Step::HangOnBody(_) => pending().await,
            Step::ConnectError | Step::HangOnSend => unreachable!("no response for this step"),
        }
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).expect("valid status code")
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: PreparedRequest,
    ) -> Result<Box<dyn TransportResponse>, BoxError> {
        self.sent
            .lock()
            .expect("sent log mutex must not be poisoned")
            .push(request);
        let step = self
            .script
            .lock()
            .expect("script mutex must not be poisoned")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let code = match step {
            Step::ConnectError => return Err("connection refused".into()),
            Step::HangOnSend => return pending().await,
            Step::Respond(code, _) | Step::BodyError(code) | Step::HangOnBody(code) => code,
        };
        Ok(Box::new(ScriptedResponse {
            status: status(code),
            body: step,
        }))
    }
}

fn client_with(transport: &ScriptedTransport) -> HttpClient {
    HttpClient::new("http://scripted.test/api")
        .with_transport(transport.clone())
        .with_backoff(WithMaxRetries::new(
            ConstantBackoff::new(Duration::from_millis(1)),
            5,
        ))
}

async fn cancel_after(token: CancellationToken, delay: Duration) {
    tokio::time::sleep(delay).await;
    token.cancel();
}

#[tokio::test]
async fn transport_errors_are_retried() {
    let transport = ScriptedTransport::new(vec![
        Step::ConnectError,
        Step::ConnectError,
        Step::Respond(200, "ok"),
    ]);
    let client = client_with(&transport);

    let body = client
        .get(&Context::background(), "/items", [])
        .await
        .expect("must succeed on third attempt");

    assert_eq!(&body[..], b"ok");
    assert_eq!(transport.sent().len(), 3);
}

#[tokio::test]
async fn body_read_errors_are_retried() {
    let transport = ScriptedTransport::new(vec![Step::BodyError(200), Step::Respond(200, "ok")]);
    let client = client_with(&transport);

    let body = client
        .get(&Context::background(), "/items", [])
        .await
        .expect("must succeed on second attempt");

    assert_eq!(&body[..], b"ok");
    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test]
async fn exhausted_body_errors_keep_their_variant() {
    let transport = ScriptedTransport::always(Step::BodyError(200));
    let client = client_with(&transport).with_backoff(StopBackoff);

    let err = client
        .get(&Context::background(), "/items", [])
        .await
        .expect_err("must give up");

    match err {
        HttpError::RetryExhausted { attempts, last } => {
            assert_eq!(attempts, 1);
            assert!(matches!(*last, HttpError::ResponseBody(_)));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_before_start_sends_nothing() {
    let transport = ScriptedTransport::new(vec![Step::Respond(200, "ok")]);
    let client = client_with(&transport);
    let token = CancellationToken::new();
    token.cancel();

    let err = client
        .get(&token.context(), "/items", [])
        .await
        .expect_err("canceled context must fail");

    assert!(matches!(err, HttpError::Canceled(CancelReason::Canceled)));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn cancel_aborts_pending_send() {
    let transport = ScriptedTransport::always(Step::HangOnSend);
    let client = client_with(&transport);
    let token = CancellationToken::new();
    tokio::spawn(cancel_after(token.clone(), Duration::from_millis(30)));

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        client.get(&token.context(), "/items", []),
    )
    .await
    .expect("cancel must return promptly")
    .expect_err("canceled send must fail");

    assert!(matches!(err, HttpError::Canceled(CancelReason::Canceled)));
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn cancel_aborts_pending_body_read() {
    let transport = ScriptedTransport::always(Step::HangOnBody(200));
    let client = client_with(&transport);
    let token = CancellationToken::new();
    tokio::spawn(cancel_after(token.clone(), Duration::from_millis(30)));

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        client.get(&token.context(), "/items", []),
    )
    .await
    .expect("cancel must return promptly")
    .expect_err("canceled read must fail");

    assert!(err.is_canceled());
}

#[tokio::test]
async fn cancel_aborts_backoff_wait() {
    let transport = ScriptedTransport::always(Step::Respond(503, "down"));
    let client =
        client_with(&transport).with_backoff(ConstantBackoff::new(Duration::from_secs(60)));
    let token = CancellationToken::new();
    tokio::spawn(cancel_after(token.clone(), Duration::from_millis(30)));

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        client.get(&token.context(), "/items", []),
    )
    .await
    .expect("cancel must interrupt the wait")
    .expect_err("canceled wait must fail");

    assert!(matches!(err, HttpError::Canceled(CancelReason::Canceled)));
    assert_eq!(transport.sent().len(), 1);
}

struct Unencodable;

impl Serialize for Unencodable {
    fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("refusing to encode"))
    }
}

#[tokio::test]
async fn build_failures_make_no_attempt() {
    let transport = ScriptedTransport::new(vec![Step::Respond(200, "ok")]);
    let client = client_with(&transport);

    let err = client
        .post(
            &Context::background(),
            "/items",
            [RequestOption::json(&Unencodable)],
        )
        .await
        .expect_err("encoding must fail");
    assert!(matches!(err, HttpError::Encode(_)));

    let bad_base = HttpClient::new("not a url").with_transport(transport.clone());
    let err = bad_base
        .get(&Context::background(), "/items", [])
        .await
        .expect_err("invalid base must fail");
    assert!(matches!(err, HttpError::InvalidUrl { .. }));

    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn redirects_are_permanent() {
    let transport = ScriptedTransport::new(vec![Step::Respond(302, ""), Step::Respond(200, "ok")]);
    let client = client_with(&transport);

    let err = client
        .get(&Context::background(), "/moved", [])
        .await
        .expect_err("unfollowed redirect must fail");

    assert!(matches!(err, HttpError::Redirect { status: 302, .. }));
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn status_outside_known_ranges_is_retried() {
    let transport = ScriptedTransport::new(vec![Step::Respond(600, ""), Step::Respond(200, "ok")]);
    let client = client_with(&transport);

    let body = client
        .get(&Context::background(), "/odd", [])
        .await
        .expect("must succeed after retry");

    assert_eq!(&body[..], b"ok");
    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test]
async fn custom_classifier_can_retry_rate_limits() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(429, "slow down"),
        Step::Respond(200, "ok"),
    ]);
    let client = client_with(&transport).with_classifier(|status: StatusCode, _body: &[u8]| {
        if status == StatusCode::TOO_MANY_REQUESTS {
            StatusClass::Retryable
        } else {
            DefaultClassifier::classify_code(status.as_u16())
        }
    });

    let body = client
        .get(&Context::background(), "/limited", [])
        .await
        .expect("429 must be retried");

    assert_eq!(&body[..], b"ok");
    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test]
async fn classifier_can_make_server_errors_permanent() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(503, "maintenance"),
        Step::Respond(200, "ok"),
    ]);
    let client = client_with(&transport).with_classifier(|status: StatusCode, _body: &[u8]| {
        if status == StatusCode::SERVICE_UNAVAILABLE {
            StatusClass::Permanent
        } else {
            DefaultClassifier::classify_code(status.as_u16())
        }
    });

    let err = client
        .get(&Context::background(), "/items", [])
        .await
        .expect_err("503 must fail without retry");

    assert!(matches!(
        err,
        HttpError::ServerStatus {
            status: 503,
            permanent: true,
            ..
        }
    ));
    assert!(err.is_permanent());
    assert!(!err.is_exhausted());
    assert!(!err.is_canceled());
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn retried_client_errors_are_not_reported_as_permanent() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(409, "conflict"),
        Step::Respond(200, "ok"),
    ]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    let client = client_with(&transport)
        .with_classifier(|status: StatusCode, _body: &[u8]| {
            if status == StatusCode::CONFLICT {
                StatusClass::Retryable
            } else {
                DefaultClassifier::classify_code(status.as_u16())
            }
        })
        .with_observer(move |err: &HttpError, _: Duration, _: usize| {
            recorded
                .lock()
                .expect("observer log mutex must not be poisoned")
                .push((err.status(), err.is_permanent()));
        });

    client
        .get(&Context::background(), "/items", [])
        .await
        .expect("409 must be retried");

    let seen = seen.lock().expect("observer log mutex must not be poisoned");
    assert_eq!(*seen, vec![(Some(409), false)]);
}

#[tokio::test]
async fn concurrent_calls_have_independent_cursors() {
    let transport = ScriptedTransport::always(Step::Respond(503, "down"));
    let client = client_with(&transport).with_backoff(WithMaxRetries::new(
        ConstantBackoff::new(Duration::from_millis(5)),
        2,
    ));

    let first = client.clone();
    let second = client.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { first.get(&Context::background(), "/a", []).await }),
        tokio::spawn(async move { second.get(&Context::background(), "/b", []).await }),
    );

    for result in [a, b] {
        let err = result.expect("task must not panic").expect_err("must exhaust");
        assert!(matches!(err, HttpError::RetryExhausted { attempts: 3, .. }));
    }
    assert_eq!(transport.sent().len(), 6);
}

#[tokio::test]
async fn panicking_observer_does_not_stop_retries() {
    let transport = ScriptedTransport::new(vec![Step::Respond(500, ""), Step::Respond(200, "ok")]);
    let client = client_with(&transport)
        .with_observer(|_: &HttpError, _: Duration, _: usize| panic!("observer bug"));

    let body = client
        .get(&Context::background(), "/items", [])
        .await
        .expect("observer panic must be contained");

    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn prepared_request_carries_url_and_timeout() {
    let transport =
        ScriptedTransport::new(vec![Step::Respond(200, "ok"), Step::Respond(200, "ok")]);
    let client = client_with(&transport);

    client
        .get(
            &Context::background(),
            "/search",
            [RequestOption::query([("q", "rust"), ("q", "http")])],
        )
        .await
        .expect("get must succeed");
    client
        .clone()
        .with_options(ClientOptions {
            timeout_ms: 0,
            ..ClientOptions::default()
        })
        .get(&Context::background(), "search", [])
        .await
        .expect("get must succeed");

    let sent = transport.sent();
    assert_eq!(
        sent[0].url.as_str(),
        "http://scripted.test/api/search?q=rust&q=http"
    );
    assert_eq!(sent[0].timeout, Some(Duration::from_secs(30)));
    assert_eq!(sent[1].url.as_str(), "http://scripted.test/api/search");
    assert_eq!(sent[1].timeout, None);
}
