//! Exponential-backoff execution of remote calls.

use crate::client::CrmClient;
use crate::error::SyncError;
use crate::session::AccountSession;
use chrono::Utc;
use hubsync::config::BackoffConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Retry policy: up to `max_retries` retries, retry `n` waiting `base_delay * 2^n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Backoff {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// No delay between retries.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

enum RetryState<T> {
    Pending,
    Retrying { attempt: u32, last_error: anyhow::Error },
    Succeeded(T),
    Failed { attempts: u32, last_error: anyhow::Error },
}

impl<T> RetryState<T> {
    /// State after call number `calls` returned `result`.
    fn after_call(result: anyhow::Result<T>, calls: u32) -> Self {
        match result {
            Ok(value) => RetryState::Succeeded(value),
            Err(last_error) => RetryState::Retrying {
                attempt: calls,
                last_error,
            },
        }
    }
}

impl AccountSession {
    /// Runs `call` against the shared client, retrying failures with
    /// exponential backoff.
    ///
    /// Before each retry, expired credentials are refreshed first; a refresh
    /// failure ends the call immediately. After the last retry fails the
    /// result is [`SyncError::RemoteCallFailed`].
    pub async fn execute<T, F, Fut>(&mut self, operation: &str, mut call: F) -> Result<T, SyncError>
    where
        F: FnMut(Arc<dyn CrmClient>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let backoff = self.backoff();
        let mut state = RetryState::Pending;

        loop {
            state = match state {
                RetryState::Pending => RetryState::after_call(call(self.client()).await, 1),
                RetryState::Retrying {
                    attempt,
                    last_error,
                } if attempt > backoff.max_retries => RetryState::Failed {
                    attempts: attempt,
                    last_error,
                },
                RetryState::Retrying {
                    attempt,
                    last_error,
                } => {
                    warn!(
                        hub_id = %self.account.hub_id,
                        operation,
                        attempt,
                        max_retries = backoff.max_retries,
                        error = %last_error,
                        "Remote call failed, will retry"
                    );

                    if self.account.credentials.is_expired_at(Utc::now()) {
                        self.refresh_credentials().await?;
                    }

                    let delay = backoff.delay(attempt);
                    debug!(
                        hub_id = %self.account.hub_id,
                        operation,
                        delay_ms = delay.as_millis() as u64,
                        "Backing off before retry"
                    );
                    tokio::time::sleep(delay).await;

                    RetryState::after_call(call(self.client()).await, attempt + 1)
                }
                RetryState::Succeeded(value) => return Ok(value),
                RetryState::Failed {
                    attempts,
                    last_error,
                } => {
                    error!(
                        domain_id = %self.account.domain_id,
                        hub_id = %self.account.hub_id,
                        operation,
                        attempts,
                        error = %last_error,
                        "Remote call failed after retries"
                    );
                    return Err(SyncError::RemoteCallFailed {
                        operation: operation.to_string(),
                        attempts,
                        cause: last_error,
                    });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::models::TokenResponse;
    use crate::refresh::OAuthApp;
    use crate::test_support::{test_account, MockCrmClient};
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn session(client: &Arc<MockCrmClient>, expired: bool) -> AccountSession {
        let mut account = test_account();
        account.credentials.refresh_token = Some("refresh-1".to_string());
        account.credentials.expires_at = Some(if expired {
            Utc::now() - chrono::Duration::minutes(5)
        } else {
            Utc::now() + chrono::Duration::hours(1)
        });
        AccountSession::new(
            account,
            client.clone(),
            Arc::new(OAuthApp::new("cid", "secret")),
            Backoff::immediate(4),
        )
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let backoff = Backoff::default();
        assert_eq!(backoff.max_retries, 4);
        assert_eq!(backoff.delay(1), Duration::from_millis(10_000));
        assert_eq!(backoff.delay(2), Duration::from_millis(20_000));
        assert_eq!(backoff.delay(4), Duration::from_millis(80_000));
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let client = Arc::new(MockCrmClient::new());
        let mut session = session(&client, false);
        let calls = AtomicU32::new(0);

        let result = session
            .execute("flaky", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(anyhow!("transient {}", n))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(client.refresh_calls().is_empty());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let client = Arc::new(MockCrmClient::new());
        let mut session = session(&client, false);
        let calls = AtomicU32::new(0);

        let err = session
            .execute("always failing", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(anyhow!("boom")) }
            })
            .await
            .unwrap_err();

        // One initial call plus four retries
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match err {
            SyncError::RemoteCallFailed {
                operation,
                attempts,
                ..
            } => {
                assert_eq!(operation, "always failing");
                assert_eq!(attempts, 5);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_refreshes_expired_credentials_before_retry() {
        let client = Arc::new(MockCrmClient::new());
        client.push_token(Ok(TokenResponse {
            access_token: "fresh".to_string(),
            refresh_token: None,
            expires_in: Some(1800),
        }));
        let mut session = session(&client, true);
        let calls = AtomicU32::new(0);

        session
            .execute("search", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(anyhow!("401"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.refresh_calls().len(), 1);
        assert_eq!(session.account.credentials.access_token, "fresh");
        assert_eq!(client.current_token(), "fresh");
    }

    #[tokio::test]
    async fn test_refresh_failure_is_not_retried() {
        let client = Arc::new(MockCrmClient::new());
        client.push_token(Err(anyhow!("invalid_grant")));
        let mut session = session(&client, true);
        let calls = AtomicU32::new(0);

        let err = session
            .execute("search", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(anyhow!("401")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::CredentialRefreshFailed { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.refresh_calls().len(), 1);
    }
}
