use std::fmt;

/// Boxed error produced by a [`Transport`](crate::Transport) implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a call stopped before reaching an outcome of its own.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancelReason {
    /// The [`CancellationToken`](crate::CancellationToken) was fired.
    Canceled,
    /// The context deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canceled => f.write_str("context canceled"),
            Self::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Base address and path could not be joined into a valid URL.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// JSON request body could not be encoded.
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    /// Header name or value rejected while building the request.
    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },
    /// Network or request execution error reported by the transport.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    /// The response arrived but its body could not be read.
    #[error("failed to read response body: {0}")]
    ResponseBody(#[source] BoxError),
    /// Unfollowed 3xx response with raw response body.
    #[error("request failed with redirect status {status}: {body}")]
    Redirect {
        status: u16,
        body: String,
        /// Whether the classifier ruled out a retry.
        permanent: bool,
    },
    /// 4xx response with raw response body.
    #[error("request failed with status {status}: {body}")]
    ClientStatus {
        status: u16,
        body: String,
        permanent: bool,
    },
    /// 5xx (or otherwise unexpected) response with raw response body.
    #[error("request failed with status {status}: {body}")]
    ServerStatus {
        status: u16,
        body: String,
        permanent: bool,
    },
    /// The backoff policy gave up; `last` is the final retryable error.
    #[error("giving up after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Number of physical attempts made.
        attempts: usize,
        /// Error from the last attempt.
        #[source]
        last: Box<HttpError>,
    },
    /// The call's context was canceled or its deadline passed.
    #[error("request canceled: {0}")]
    Canceled(CancelReason),
}

impl HttpError {
    /// Builds the error for a non-success status. The variant follows the
    /// status range; `permanent` records the classifier's decision.
    pub(crate) fn from_status(status: u16, body: &[u8], permanent: bool) -> Self {
        let body = String::from_utf8_lossy(body).into_owned();
        match status {
            300..=399 => Self::Redirect {
                status,
                body,
                permanent,
            },
            400..=499 => Self::ClientStatus {
                status,
                body,
                permanent,
            },
            _ => Self::ServerStatus {
                status,
                body,
                permanent,
            },
        }
    }

    /// HTTP status code carried by this error, looking through
    /// [`HttpError::RetryExhausted`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Redirect { status, .. }
            | Self::ClientStatus { status, .. }
            | Self::ServerStatus { status, .. } => Some(*status),
            Self::RetryExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Response body carried by an HTTP status error.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Redirect { body, .. }
            | Self::ClientStatus { body, .. }
            | Self::ServerStatus { body, .. } => Some(body),
            Self::RetryExhausted { last, .. } => last.body(),
            _ => None,
        }
    }

    /// True when the call's context was canceled or its deadline passed.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// True when the backoff policy stopped a call that kept failing.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// True for errors that end a call without a retry: request build
    /// failures and statuses the classifier marked permanent.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::InvalidUrl { .. } | Self::Encode(_) | Self::InvalidHeader { .. } => true,
            Self::Redirect { permanent, .. }
            | Self::ClientStatus { permanent, .. }
            | Self::ServerStatus { permanent, .. } => *permanent,
            _ => false,
        }
    }
}
