use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::errors::PollError;

/// Per-command request state: a correlation id for logs plus the
/// cancellation signal and optional deadline checked before store calls.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub correlation_id: String,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new("unknown-correlation-id")
    }
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.cancellation.is_cancelled()
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn ensure_active(&self) -> Result<(), PollError> {
        if self.is_expired() {
            Err(PollError::Cancelled)
        } else {
            Ok(())
        }
    }
}
