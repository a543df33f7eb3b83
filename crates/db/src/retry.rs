use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::repositories::RepositoryError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(20);

/// Errors that can tell a lost optimistic-concurrency race apart from a
/// real failure.
pub trait ConflictAware {
    fn is_conflict(&self) -> bool;
}

impl ConflictAware for RepositoryError {
    fn is_conflict(&self) -> bool {
        RepositoryError::is_conflict(self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("still conflicting after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error(transparent)]
    Operation(E),
}

/// Re-runs a whole read-modify-write operation while it keeps losing
/// version races, sleeping `base_delay * attempt` between tries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConflictRetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, base_delay: DEFAULT_BASE_DELAY }
    }
}

impl ConflictRetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        E: ConflictAware,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_conflict() => {
                    if attempt == max_attempts {
                        break;
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(
                        event_name = "store.retry.conflict",
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "write conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(RetryError::Operation(error)),
            }
        }

        tracing::warn!(
            event_name = "store.retry.exhausted",
            max_attempts,
            "giving up after repeated write conflicts"
        );
        Err(RetryError::Exhausted { attempts: max_attempts })
    }
}
