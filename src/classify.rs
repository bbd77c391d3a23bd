//! Turning one physical attempt into a retry decision.

use bytes::Bytes;
use reqwest::StatusCode;

use crate::HttpError;

/// Class assigned to a response status.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusClass {
    Success,
    Retryable,
    Permanent,
}

/// Decides which statuses succeed, retry, or fail outright.
///
/// Implemented for closures, so a client can swap the table without a new
/// type:
///
/// ```
/// use backoff_http::{DefaultClassifier, HttpClient, StatusClass, StatusCode};
///
/// // Also retry 429 Too Many Requests.
/// let client = HttpClient::new("https://api.example.com").with_classifier(
///     |status: StatusCode, _body: &[u8]| match status.as_u16() {
///         429 => StatusClass::Retryable,
///         code => DefaultClassifier::classify_code(code),
///     },
/// );
/// # let _ = client;
/// ```
pub trait StatusClassifier: Send + Sync {
    fn classify(&self, status: StatusCode, body: &[u8]) -> StatusClass;
}

impl<F> StatusClassifier for F
where
    F: Fn(StatusCode, &[u8]) -> StatusClass + Send + Sync,
{
    fn classify(&self, status: StatusCode, body: &[u8]) -> StatusClass {
        self(status, body)
    }
}

/// 2xx succeeds; 3xx and 4xx are permanent; everything else is retried.
///
/// A 3xx only reaches the classifier when the transport declined to follow
/// it, and resending the same request will get the same answer.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultClassifier;

impl DefaultClassifier {
    /// The default table, usable as a fallback from custom classifiers.
    pub fn classify_code(code: u16) -> StatusClass {
        match code {
            200..=299 => StatusClass::Success,
            300..=499 => StatusClass::Permanent,
            _ => StatusClass::Retryable,
        }
    }
}

impl StatusClassifier for DefaultClassifier {
    fn classify(&self, status: StatusCode, _body: &[u8]) -> StatusClass {
        Self::classify_code(status.as_u16())
    }
}

/// Result of one physical attempt.
#[derive(Debug)]
pub enum Outcome {
    Success(Bytes),
    Retryable(HttpError),
    Permanent(HttpError),
}

/// Classifies a fully read response.
pub fn classify_response(
    classifier: &dyn StatusClassifier,
    status: StatusCode,
    body: Bytes,
) -> Outcome {
    match classifier.classify(status, &body) {
        StatusClass::Success => Outcome::Success(body),
        StatusClass::Retryable => {
            Outcome::Retryable(HttpError::from_status(status.as_u16(), &body, false))
        }
        StatusClass::Permanent => {
            Outcome::Permanent(HttpError::from_status(status.as_u16(), &body, true))
        }
    }
}
