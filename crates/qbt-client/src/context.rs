//! Per-request context: cooperative cancellation and deadlines.
//!
//! Every public client operation takes a [`RequestContext`]. Cancellation
//! is cooperative and honored at the point a request is issued: a context
//! cancelled before the send leaves no observable side effect on the
//! server, and a context cancelled mid-flight abandons the round-trip.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{Error, Result};

/// Hand-rolled cancellation flag, cloneable across tasks.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels all contexts carrying this token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            // Re-check after registering: cancel() may have raced ahead.
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Cancellation signal and optional deadline for one logical operation.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    deadline: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl RequestContext {
    /// A context that never cancels and never times out.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Drives `fut` to completion unless the context cancels or the
    /// deadline passes first.
    pub(crate) async fn run<T>(&self, fut: impl Future<Output = T>) -> Result<T> {
        tokio::pin!(fut);
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            value = &mut fut => Ok(value),
            () = cancelled => Err(Error::Cancelled),
            () = deadline => Err(Error::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_completes_without_signals() {
        let ctx = RequestContext::background();
        let value = ctx.run(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn pre_cancelled_token_is_observable() {
        let token = CancelToken::new();
        token.cancel();
        let ctx = RequestContext::background().with_cancel(token);
        assert!(ctx.is_cancelled());
        let result = ctx.run(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn cancel_interrupts_a_pending_future() {
        let token = CancelToken::new();
        let ctx = RequestContext::background().with_cancel(token.clone());
        let handle = tokio::spawn(async move { ctx.run(std::future::pending::<()>()).await });
        tokio::task::yield_now().await;
        token.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_maps_to_timeout() {
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(50));
        let result = ctx.run(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
