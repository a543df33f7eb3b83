pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod retry;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use repositories::{
    InMemoryPollRepository, PollRepository, RepositoryError, SqlPollRepository,
};
pub use retry::{ConflictAware, ConflictRetryPolicy, RetryError};
