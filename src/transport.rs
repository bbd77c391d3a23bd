//! The capability the executor sends requests through.
//!
//! [`ReqwestTransport`] is the production implementation. Anything else that
//! can turn a [`PreparedRequest`] into a status and a body (a test double, a
//! middleware stack) implements [`Transport`] the same way.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use crate::{BoxError, PreparedRequest};

/// Sends one physical request.
///
/// Implementations are shared by every call made through a client and must
/// be safe for concurrent use.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: PreparedRequest,
    ) -> Result<Box<dyn TransportResponse>, BoxError>;
}

/// A response whose body has not been read yet.
#[async_trait]
pub trait TransportResponse: Send {
    fn status(&self) -> StatusCode;

    /// Reads the whole body.
    async fn bytes(self: Box<Self>) -> Result<Bytes, BoxError>;
}

/// [`Transport`] backed by a shared `reqwest::Client` connection pool.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already configured client (proxies, TLS roots, redirect
    /// policy, ...).
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: PreparedRequest,
    ) -> Result<Box<dyn TransportResponse>, BoxError> {
        let PreparedRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        Ok(Box::new(response))
    }
}

#[async_trait]
impl TransportResponse for reqwest::Response {
    fn status(&self) -> StatusCode {
        reqwest::Response::status(self)
    }

    async fn bytes(self: Box<Self>) -> Result<Bytes, BoxError> {
        Ok(reqwest::Response::bytes(*self).await?)
    }
}
