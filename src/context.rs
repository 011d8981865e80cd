//! Request Context
//!
//! Every expansion runs under a [`RequestContext`]: a cancellation token the
//! caller can trigger when the user navigates away, plus a timeout.

use crate::apiset::ApiSetError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RequestContext {
    cancel: CancellationToken,
    timeout: Duration,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl RequestContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            timeout,
        }
    }

    /// Context cancelled together with this one, but which can also be cancelled alone
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            timeout: self.timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` until it completes, the context is cancelled, or the timeout elapses.
    /// The future is dropped on cancellation or timeout.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, ApiSetError>
    where
        F: Future<Output = Result<T, ApiSetError>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ApiSetError::Cancelled),
            result = tokio::time::timeout(self.timeout, fut) => match result {
                Ok(result) => result,
                Err(_) => Err(ApiSetError::Timeout(self.timeout)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_result() {
        let ctx = RequestContext::default();
        let value = ctx.run(async { Ok::<_, ApiSetError>(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let ctx = RequestContext::new(Duration::from_millis(10));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ApiSetError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiSetError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_cancelled_parent_cancels_child() {
        let ctx = RequestContext::default();
        let child = ctx.child();
        ctx.cancel();
        assert!(child.is_cancelled());

        let err = child
            .run(std::future::pending::<Result<(), ApiSetError>>())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiSetError::Cancelled));
    }
}
