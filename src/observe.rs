use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::HttpError;

/// Hook told about every retry the executor schedules.
///
/// Intermediate errors are only ever reported here; the caller of a verb
/// method sees the terminal outcome alone.
pub trait RetryObserver: Send + Sync {
    /// `attempt` is the 1-based number of the attempt that just failed.
    fn on_retry(&self, error: &HttpError, delay: Duration, attempt: usize);
}

impl<F> RetryObserver for F
where
    F: Fn(&HttpError, Duration, usize) + Send + Sync,
{
    fn on_retry(&self, error: &HttpError, delay: Duration, attempt: usize) {
        self(error, delay, attempt)
    }
}

/// Runs the observer, discarding any panic so it cannot alter the retry loop.
pub(crate) fn notify(
    observer: &dyn RetryObserver,
    error: &HttpError,
    delay: Duration,
    attempt: usize,
) {
    let result = catch_unwind(AssertUnwindSafe(|| observer.on_retry(error, delay, attempt)));
    #[cfg(feature = "tracing")]
    if result.is_err() {
        tracing::warn!("retry observer panicked; continuing");
    }
    #[cfg(not(feature = "tracing"))]
    let _ = result;
}
