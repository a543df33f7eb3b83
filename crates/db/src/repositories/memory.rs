use std::collections::HashMap;

use tokio::sync::RwLock;

use pollbot_core::domain::poll::{Poll, PollId};

use super::{PollRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryPollRepository {
    polls: RwLock<HashMap<String, Poll>>,
}

impl InMemoryPollRepository {
    pub async fn len(&self) -> usize {
        self.polls.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.polls.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl PollRepository for InMemoryPollRepository {
    async fn save_poll(&self, poll: Poll) -> Result<(), RepositoryError> {
        let mut polls = self.polls.write().await;
        polls.insert(poll.id.0.clone(), poll);
        Ok(())
    }

    async fn get_poll(&self, id: &PollId) -> Result<Poll, RepositoryError> {
        let polls = self.polls.read().await;
        polls.get(&id.0).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn add_vote_atomic(&self, poll: &Poll) -> Result<u64, RepositoryError> {
        let mut polls = self.polls.write().await;
        let stored = polls.get_mut(&poll.id.0).ok_or(RepositoryError::NotFound)?;

        if stored.version != poll.version {
            return Err(RepositoryError::Conflict);
        }

        stored.voters = poll.voters.clone();
        stored.options = poll.options.clone();
        stored.version += 1;
        Ok(stored.version)
    }

    async fn close_poll(&self, id: &PollId) -> Result<(), RepositoryError> {
        let mut polls = self.polls.write().await;
        let stored = polls.get_mut(&id.0).ok_or(RepositoryError::NotFound)?;
        stored.close();
        stored.version += 1;
        Ok(())
    }

    async fn delete_poll(&self, id: &PollId) -> Result<(), RepositoryError> {
        let mut polls = self.polls.write().await;
        polls.remove(&id.0).map(|_| ()).ok_or(RepositoryError::NotFound)
    }
}
