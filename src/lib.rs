//! `backoff-http` is an async HTTP client that retries transient failures.
//!
//! Every verb method turns one logical request into exactly one outcome:
//! - [`HttpClient::get`], [`HttpClient::post`], [`HttpClient::put`],
//!   [`HttpClient::patch`], [`HttpClient::delete`]
//!
//! Each call builds the request from the client's base URL, default headers
//! and an ordered list of [`RequestOption`]s, then sends it through the
//! client's [`Transport`]. 2xx responses return the body bytes unchanged.
//! 3xx and 4xx responses fail at once. Transport errors, body read errors and
//! other statuses are retried under the client's [`Backoff`] policy until it
//! gives up or the call's [`Context`] is canceled.
//!
//! ```no_run
//! use backoff_http::{Context, HttpClient, RequestOption};
//!
//! # async fn run() -> backoff_http::Result<()> {
//! let client = HttpClient::new("https://api.example.com")
//!     .with_header("accept", "application/json");
//! let ctx = Context::background().with_timeout(std::time::Duration::from_secs(10));
//!
//! let body = client
//!     .get(&ctx, "/users", [RequestOption::query([("page", "1")])])
//!     .await?;
//! println!("{}", String::from_utf8_lossy(&body));
//! # Ok(())
//! # }
//! ```

mod backoff;
mod classify;
mod client;
mod context;
mod error;
mod observe;
mod options;
mod request;
mod transport;

pub use backoff::{
    Backoff, BackoffCursor, ConstantBackoff, ExponentialBackoff, StopBackoff, WithMaxRetries,
};
pub use classify::{classify_response, DefaultClassifier, Outcome, StatusClass, StatusClassifier};
pub use client::HttpClient;
pub use context::{CancellationToken, Context};
pub use error::{BoxError, CancelReason, HttpError};
pub use observe::RetryObserver;
pub use options::ClientOptions;
pub use request::{build_request, join_url, PreparedRequest, RequestOption};
pub use reqwest::{header, Method, StatusCode};
pub use transport::{ReqwestTransport, Transport, TransportResponse};

pub type Result<T> = std::result::Result<T, HttpError>;
