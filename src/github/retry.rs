//! Retry with exponential backoff
//!
//! - HTTP 429 / 5xx and network errors: retry, waiting 1s, 2s, 4s, ...
//!   (capped at `max_delay`)
//! - Rate limits that name a reset time: wait for it (also capped)
//! - Anything else: fail immediately

use std::time::Duration;
use tracing::warn;

use super::{GitHubError, GitHubResult};
use crate::cancel::CancellationToken;

/// Backoff parameters, owned by the API client.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// Sleeping between attempts is cancellable; cancellation surfaces as
    /// [`GitHubError::Cancelled`].
    pub fn run<T>(
        &self,
        cancel: &CancellationToken,
        what: &str,
        mut op: impl FnMut() -> GitHubResult<T>,
    ) -> GitHubResult<T> {
        let mut retries = 0u32;
        loop {
            cancel.check()?;
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            retries += 1;
            if retries > self.max_retries {
                return Err(GitHubError::RetriesExhausted {
                    attempts: retries,
                    last: Box::new(err),
                });
            }

            let delay = match &err {
                GitHubError::RateLimited {
                    retry_after: Some(wait),
                } => (*wait).min(self.max_delay),
                _ => self.delay_for(retries),
            };
            warn!(
                "{} failed ({}), retrying in {:?} ({}/{})",
                what, err, delay, retries, self.max_retries
            );
            cancel.sleep(delay)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(30), Duration::from_secs(60));
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = fast().run(&CancellationToken::new(), "test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(GitHubError::Http {
                    status: 503,
                    message: "unavailable".into(),
                })
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.ok(), Some(42));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_client_error_fails_fast() {
        let calls = Cell::new(0);
        let result: GitHubResult<()> = fast().run(&CancellationToken::new(), "test", || {
            calls.set(calls.get() + 1);
            Err(GitHubError::Http {
                status: 404,
                message: "missing".into(),
            })
        });
        assert!(matches!(result, Err(GitHubError::Http { status: 404, .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_exhaustion_is_terminal() {
        let calls = Cell::new(0);
        let result: GitHubResult<()> = fast().run(&CancellationToken::new(), "test", || {
            calls.set(calls.get() + 1);
            Err(GitHubError::Transport("connection reset".into()))
        });
        assert!(matches!(
            result,
            Err(GitHubError::RetriesExhausted { attempts: 4, .. })
        ));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: GitHubResult<()> = fast().run(&cancel, "test", || Ok(()));
        assert!(result.is_err_and(|e| e.is_cancelled()));
    }
}
