use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{header, Method};
use tokio::time::sleep;

use crate::{
    classify::{classify_response, DefaultClassifier, Outcome, StatusClassifier},
    observe::{self, RetryObserver},
    request::build_request,
    Backoff, CancelReason, ClientOptions, Context, ExponentialBackoff, HttpError, PreparedRequest,
    ReqwestTransport, RequestOption, Result, Transport,
};

/// HTTP client that retries transient failures with backoff.
///
/// Cloning is cheap: clones share the transport, backoff prototype,
/// classifier and observer. Every call starts its own backoff cursor, so
/// concurrent calls never share retry counters.
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    headers: BTreeMap<String, String>,
    transport: Arc<dyn Transport>,
    backoff: Arc<dyn Backoff>,
    classifier: Arc<dyn StatusClassifier>,
    observer: Option<Arc<dyn RetryObserver>>,
    options: ClientOptions,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(name, value)| {
                let shown = if is_sensitive_header(name) {
                    "<redacted>"
                } else {
                    value.as_str()
                };
                (name.as_str(), shown)
            })
            .collect();

        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("headers", &headers)
            .field("backoff", &self.backoff)
            .field("observer", &self.observer.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl HttpClient {
    /// Creates a client for `base_url` with the default transport, an
    /// exponential backoff capped at 30 seconds of elapsed time, and the
    /// default status classification.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            transport: Arc::new(ReqwestTransport::new()),
            backoff: Arc::new(ExponentialBackoff::default()),
            classifier: Arc::new(DefaultClassifier),
            observer: None,
            options: ClientOptions::default(),
        }
    }

    /// Applies client options such as the per-attempt timeout.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Replaces the default headers sent with every request.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = headers
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        self
    }

    /// Adds or replaces one default header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replaces the backoff prototype.
    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Replaces the transport. Useful for custom `reqwest` setups and tests.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Shares an existing transport handle between several clients.
    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replaces the status classification table.
    pub fn with_classifier(mut self, classifier: impl StatusClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Registers a hook called before every backoff wait.
    pub fn with_observer(mut self, observer: impl RetryObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Base URL every request path is joined onto.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a `GET` to `path` under the base URL and returns the response
    /// body. See [`HttpClient::execute`] for retry and cancellation rules.
    pub async fn get<O>(&self, ctx: &Context, path: &str, options: O) -> Result<Bytes>
    where
        O: IntoIterator<Item = RequestOption>,
    {
        self.execute(ctx, Method::GET, path, options).await
    }

    /// Sends a `POST`. Attach a body with [`RequestOption::json`].
    pub async fn post<O>(&self, ctx: &Context, path: &str, options: O) -> Result<Bytes>
    where
        O: IntoIterator<Item = RequestOption>,
    {
        self.execute(ctx, Method::POST, path, options).await
    }

    /// Sends a `PUT`.
    pub async fn put<O>(&self, ctx: &Context, path: &str, options: O) -> Result<Bytes>
    where
        O: IntoIterator<Item = RequestOption>,
    {
        self.execute(ctx, Method::PUT, path, options).await
    }

    /// Sends a `PATCH`.
    pub async fn patch<O>(&self, ctx: &Context, path: &str, options: O) -> Result<Bytes>
    where
        O: IntoIterator<Item = RequestOption>,
    {
        self.execute(ctx, Method::PATCH, path, options).await
    }

    /// Sends a `DELETE`.
    pub async fn delete<O>(&self, ctx: &Context, path: &str, options: O) -> Result<Bytes>
    where
        O: IntoIterator<Item = RequestOption>,
    {
        self.execute(ctx, Method::DELETE, path, options).await
    }

    /// Runs one logical call and returns the body of the first successful
    /// attempt.
    ///
    /// Build failures and permanent statuses return immediately. Transport
    /// errors, body read errors and retryable statuses are retried until the
    /// backoff cursor gives up ([`HttpError::RetryExhausted`]) or `ctx` fires
    /// ([`HttpError::Canceled`]).
    pub async fn execute<O>(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        options: O,
    ) -> Result<Bytes>
    where
        O: IntoIterator<Item = RequestOption>,
    {
        let mut request = build_request(
            &self.base_url,
            method,
            path,
            self.default_headers(),
            options,
        )?;
        request.timeout = (self.options.timeout_ms > 0)
            .then(|| Duration::from_millis(self.options.timeout_ms));

        let mut cursor = self.backoff.start();
        let mut attempt = 0usize;
        loop {
            if let Some(reason) = ctx.err() {
                return Err(HttpError::Canceled(reason));
            }
            attempt += 1;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                method = %request.method,
                url = %request.url,
                attempt,
                "sending request"
            );

            let outcome = self
                .attempt(ctx, request.clone())
                .await
                .map_err(HttpError::Canceled)?;
            let error = match outcome {
                Outcome::Success(body) => return Ok(body),
                Outcome::Permanent(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, error = %error, "request failed permanently");
                    return Err(error);
                }
                Outcome::Retryable(error) => error,
            };

            if let Some(reason) = ctx.err() {
                return Err(HttpError::Canceled(reason));
            }
            let Some(delay) = cursor.next_delay() else {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempts = attempt, error = %error, "retry budget exhausted");
                return Err(HttpError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt,
                error = %error,
                "retrying request after {} ms",
                delay.as_millis()
            );
            if let Some(observer) = &self.observer {
                observe::notify(observer.as_ref(), &error, delay, attempt);
            }

            tokio::select! {
                biased;
                reason = ctx.done() => return Err(HttpError::Canceled(reason)),
                _ = sleep(delay) => {}
            }
        }
    }

    /// One physical attempt: send, read the body, classify. Returns the
    /// cancel reason if `ctx` fires while waiting on the transport.
    async fn attempt(
        &self,
        ctx: &Context,
        request: PreparedRequest,
    ) -> std::result::Result<Outcome, CancelReason> {
        let sent = tokio::select! {
            biased;
            reason = ctx.done() => return Err(reason),
            sent = self.transport.send(request) => sent,
        };
        let response = match sent {
            Ok(response) => response,
            Err(err) => return Ok(Outcome::Retryable(HttpError::Transport(err))),
        };

        let status = response.status();
        let body = tokio::select! {
            biased;
            reason = ctx.done() => return Err(reason),
            body = response.bytes() => body,
        };
        Ok(match body {
            Ok(body) => classify_response(self.classifier.as_ref(), status, body),
            Err(err) => Outcome::Retryable(HttpError::ResponseBody(err)),
        })
    }

    fn default_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        let user_agent = self
            .options
            .user_agent
            .as_deref()
            .map(|agent| ("user-agent", agent));
        user_agent.into_iter().chain(
            self.headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
        )
    }
}

fn is_sensitive_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(header::AUTHORIZATION.as_str())
        || name.eq_ignore_ascii_case(header::PROXY_AUTHORIZATION.as_str())
        || name.eq_ignore_ascii_case(header::COOKIE.as_str())
}
