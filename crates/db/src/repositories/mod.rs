use async_trait::async_trait;
use thiserror::Error;

use pollbot_core::domain::poll::{Poll, PollId};

pub mod memory;
pub mod poll;

pub use memory::InMemoryPollRepository;
pub use poll::SqlPollRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("poll not found")]
    NotFound,
    #[error("poll was modified concurrently")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

/// Persistence contract for polls. Implementations must be safe to share
/// across tasks; `add_vote_atomic` is the only conditional write.
#[async_trait]
pub trait PollRepository: Send + Sync {
    async fn save_poll(&self, poll: Poll) -> Result<(), RepositoryError>;

    async fn get_poll(&self, id: &PollId) -> Result<Poll, RepositoryError>;

    /// Writes the voters and option counts of `poll` only if the stored
    /// version still equals `poll.version`. Returns the new version.
    async fn add_vote_atomic(&self, poll: &Poll) -> Result<u64, RepositoryError>;

    async fn close_poll(&self, id: &PollId) -> Result<(), RepositoryError>;

    async fn delete_poll(&self, id: &PollId) -> Result<(), RepositoryError>;

    /// Cheap reachability probe for health reporting.
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
