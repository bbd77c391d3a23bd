//! Per-call cancellation and deadlines.
//!
//! A [`Context`] is handed to every verb method. The executor races its
//! [`Context::done`] future against the transport and against backoff waits,
//! so firing a [`CancellationToken`] or passing the deadline stops the call at
//! the next suspension point.

use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use crate::CancelReason;

/// Fires cancellation for every [`Context`] created from it.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Creates a token that has not fired.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(tx),
        }
    }

    /// Fires the token. Calls waiting on a context built from it stop at
    /// once; later calls are rejected before sending. Repeated calls are
    /// no-ops.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.send_replace(true);
    }

    /// Whether [`CancellationToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Creates a context that observes this token.
    pub fn context(&self) -> Context {
        Context::background().with_cancellation(self)
    }

    async fn cancelled(&self) {
        let mut rx = self.notify.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // Every sender is gone, so cancellation can no longer happen.
                pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation signal and deadline for one logical call.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never canceled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Attaches a cancellation token.
    pub fn with_cancellation(mut self, token: &CancellationToken) -> Self {
        self.token = Some(token.clone());
        self
    }

    /// Sets the deadline, keeping an earlier one if already present.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Sets the deadline to `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Deadline after which calls fail with
    /// [`CancelReason::DeadlineExceeded`].
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason if the context is already done.
    pub fn err(&self) -> Option<CancelReason> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Some(CancelReason::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is canceled or its deadline passes.
    /// Never resolves for a background context.
    pub async fn done(&self) -> CancelReason {
        let cancelled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => CancelReason::Canceled,
            _ = expired => CancelReason::DeadlineExceeded,
        }
    }
}
