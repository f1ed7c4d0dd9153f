//! Unbounded retry with backoff for remote calls.
//!
//! Every send, thread-create, and attach call in the posting path is
//! wrapped by a [`RetryPolicy`]. On failure the policy classifies the
//! error: rate-limited responses wait exactly as long as the server asked,
//! anything else walks a short/medium/long backoff schedule, capped at the
//! longest step. Then the identical call is retried. There is no retry
//! ceiling; differentiating retryable from hopeless failures is harder
//! than letting the operator press Ctrl-C, which is the single path out
//! of the loop and is observed only during the wait.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::gateway::GatewayError;
use crate::error::{Result, SlackportError};

/// Seconds to wait on subsequent retries; the last step repeats forever.
/// Not used in the rate-limiting case, where the wait is server-supplied.
pub const DEFAULT_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(30),
];

/// Retries a remote call until it succeeds or the operator cancels.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    backoff: Vec<Duration>,
    cancel: CancellationToken,
}

impl RetryPolicy {
    /// Creates a policy with the default backoff schedule.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            backoff: DEFAULT_BACKOFF.to_vec(),
            cancel,
        }
    }

    /// Overrides the backoff schedule. The slice must not be empty.
    #[must_use]
    pub fn with_backoff(mut self, backoff: &[Duration]) -> Self {
        assert!(!backoff.is_empty(), "backoff schedule must not be empty");
        self.backoff = backoff.to_vec();
        self
    }

    /// Runs `call`, retrying on any [`GatewayError`] until it succeeds.
    ///
    /// The only error this can return is [`SlackportError::Cancelled`],
    /// when the operator interrupts during a retry wait.
    pub async fn run<T, F, Fut>(&self, desc: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, GatewayError>>,
    {
        let mut retry_count: usize = 0;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    retry_count += 1;
                    let wait = match err.retry_after() {
                        Some(wait) => {
                            warn!(operation = desc, error = %err, "we have been rate limited");
                            wait
                        }
                        None => {
                            warn!(operation = desc, error = %err, "caught failure");
                            let idx = (retry_count - 1).min(self.backoff.len() - 1);
                            self.backoff[idx]
                        }
                    };

                    info!(
                        retry = retry_count,
                        wait_secs = wait.as_secs_f64(),
                        "will retry after wait, press Ctrl-C to abort"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            warn!(operation = desc, "cancelled during retry wait");
                            return Err(SlackportError::Cancelled);
                        }
                        () = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
