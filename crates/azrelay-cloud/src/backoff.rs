//! Bounded exponential backoff for provider operations.

use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Exponential backoff schedule with a delay ceiling.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Maximum number of attempts before giving up
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Growth factor applied per attempt
    pub multiplier: f64,

    /// Ceiling for any single delay
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Schedule used while waiting for a storage account to provision:
    /// 3s, 6s, 12s, ... capped at 60s, at most 30 attempts.
    pub fn storage_provisioning() -> Self {
        Self {
            max_attempts: 30,
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }

    /// Delay to wait after the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Run `f` until it succeeds, retrying transient errors on this schedule.
    ///
    /// Non-transient errors abort immediately; an exhausted budget surfaces
    /// as [`CloudError::RetriesExhausted`].
    pub async fn retry<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 0..self.max_attempts {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient error, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) if e.is_transient() => break,
                Err(e) => return Err(e),
            }
        }

        Err(CloudError::RetriesExhausted {
            operation: operation.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Run `predicate` until it reports readiness, sleeping on this schedule
    /// between polls. Used for eventual-consistency waits where the call
    /// itself succeeds but the resource is not yet usable.
    pub async fn wait_until<F, Fut>(&self, operation: &str, mut predicate: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        for attempt in 0..self.max_attempts {
            if predicate().await? {
                return Ok(());
            }
            if attempt + 1 < self.max_attempts {
                sleep(self.delay_for(attempt)).await;
            }
        }

        Err(CloudError::RetriesExhausted {
            operation: operation.to_string(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_and_caps() {
        let policy = BackoffPolicy {
            max_attempts: 6,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(10_000)); // capped
        assert_eq!(policy.delay_for(5), Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_budget() {
        let policy = BackoffPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
        };
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .retry("always-busy", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(CloudError::Api {
                        status: 503,
                        message: "busy".into(),
                    })
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(CloudError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_on_fatal_error() {
        let policy = BackoffPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .retry("fatal", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CloudError::Auth("bad credentials".into())) }
            })
            .await;

        assert!(matches!(result, Err(CloudError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_polls_to_readiness() {
        let policy = BackoffPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
        };
        let calls = AtomicU32::new(0);

        policy
            .wait_until("slow-resource", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n >= 2) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
