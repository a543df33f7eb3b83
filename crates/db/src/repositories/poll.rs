use std::collections::{BTreeMap, BTreeSet};

use sqlx::Row;

use pollbot_core::domain::poll::{Poll, PollId, PollOption};

use super::{PollRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPollRepository {
    pool: DbPool,
}

impl SqlPollRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Voters are stored as a JSON object `{"identity": true}`.
fn encode_voters(voters: &BTreeSet<String>) -> Result<String, RepositoryError> {
    let map: BTreeMap<&str, bool> = voters.iter().map(|voter| (voter.as_str(), true)).collect();
    serde_json::to_string(&map).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn decode_voters(raw: &str) -> Result<BTreeSet<String>, RepositoryError> {
    let map: BTreeMap<String, bool> = serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("voters: {e}")))?;
    Ok(map.into_iter().filter_map(|(voter, voted)| voted.then_some(voter)).collect())
}

/// Options are stored as a JSON array of `[label, count]` pairs so that
/// creation order survives the round trip.
fn encode_options(options: &[PollOption]) -> Result<String, RepositoryError> {
    let pairs: Vec<(&str, u32)> =
        options.iter().map(|option| (option.label.as_str(), option.votes)).collect();
    serde_json::to_string(&pairs).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn decode_options(raw: &str) -> Result<Vec<PollOption>, RepositoryError> {
    let pairs: Vec<(String, u32)> = serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("options: {e}")))?;
    Ok(pairs.into_iter().map(|(label, votes)| PollOption { label, votes }).collect())
}

fn row_to_poll(row: &sqlx::sqlite::SqliteRow) -> Result<Poll, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let creator: String =
        row.try_get("creator").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let question: String =
        row.try_get("question").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let voters: String =
        row.try_get("voters").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let options: String =
        row.try_get("options").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let closed: bool = row.try_get("closed").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let version = u64::try_from(version)
        .map_err(|_| RepositoryError::Decode(format!("negative version {version}")))?;

    Ok(Poll {
        id: PollId(id),
        creator,
        question,
        options: decode_options(&options)?,
        voters: decode_voters(&voters)?,
        closed,
        version,
    })
}

fn version_param(version: u64) -> Result<i64, RepositoryError> {
    i64::try_from(version)
        .map_err(|_| RepositoryError::Decode(format!("version {version} overflows")))
}

impl SqlPollRepository {
    async fn exists(&self, id: &PollId) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM poll WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait::async_trait]
impl PollRepository for SqlPollRepository {
    async fn save_poll(&self, poll: Poll) -> Result<(), RepositoryError> {
        let voters = encode_voters(&poll.voters)?;
        let options = encode_options(&poll.options)?;

        sqlx::query(
            "INSERT INTO poll (id, creator, question, voters, options, closed, version)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 creator = excluded.creator,
                 question = excluded.question,
                 voters = excluded.voters,
                 options = excluded.options,
                 closed = excluded.closed,
                 version = excluded.version",
        )
        .bind(&poll.id.0)
        .bind(&poll.creator)
        .bind(&poll.question)
        .bind(&voters)
        .bind(&options)
        .bind(poll.closed)
        .bind(version_param(poll.version)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_poll(&self, id: &PollId) -> Result<Poll, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, creator, question, voters, options, closed, version
             FROM poll WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => row_to_poll(r),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn add_vote_atomic(&self, poll: &Poll) -> Result<u64, RepositoryError> {
        let voters = encode_voters(&poll.voters)?;
        let options = encode_options(&poll.options)?;

        let result = sqlx::query(
            "UPDATE poll SET voters = ?, options = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(&voters)
        .bind(&options)
        .bind(&poll.id.0)
        .bind(version_param(poll.version)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(poll.version + 1);
        }

        if self.exists(&poll.id).await? {
            tracing::debug!(
                event_name = "store.poll.version_conflict",
                poll_id = %poll.id,
                expected_version = poll.version,
                "conditional vote write lost the race"
            );
            Err(RepositoryError::Conflict)
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn close_poll(&self, id: &PollId) -> Result<(), RepositoryError> {
        // Bumping the version makes any vote read before the close conflict.
        let result =
            sqlx::query("UPDATE poll SET closed = 1, version = version + 1 WHERE id = ?")
                .bind(&id.0)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_poll(&self, id: &PollId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM poll WHERE id = ?").bind(&id.0).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        crate::connection::ping(&self.pool).await.map_err(RepositoryError::from)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sqlx::Row;

    use pollbot_core::domain::poll::{Poll, PollId, PollLimits};

    use super::SqlPollRepository;
    use crate::repositories::{PollRepository, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_poll(labels: &[&str]) -> Poll {
        let labels: Vec<String> = labels.iter().map(|label| label.to_string()).collect();
        Poll::create(PollId::generate(), "U-creator", "Lunch?", &labels, &PollLimits::default())
            .expect("valid poll")
    }

    #[tokio::test]
    async fn save_and_get_round_trip_preserves_option_order() {
        let repo = SqlPollRepository::new(setup_pool().await);
        let poll = sample_poll(&["Sushi", "Pizza", "Abc"]);

        repo.save_poll(poll.clone()).await.expect("save");
        let loaded = repo.get_poll(&poll.id).await.expect("load");

        assert_eq!(loaded, poll);
        let labels: Vec<&str> = loaded.options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, ["Sushi", "Pizza", "Abc"]);
    }

    #[tokio::test]
    async fn stored_layout_uses_json_voter_map_and_pair_array() {
        let pool = setup_pool().await;
        let repo = SqlPollRepository::new(pool.clone());
        let mut poll = sample_poll(&["A", "B"]);
        repo.save_poll(poll.clone()).await.expect("save");

        poll.record_vote("U1", "B").expect("vote");
        repo.add_vote_atomic(&poll).await.expect("persist vote");

        let row = sqlx::query("SELECT voters, options, version FROM poll WHERE id = ?")
            .bind(&poll.id.0)
            .fetch_one(&pool)
            .await
            .expect("raw row");
        assert_eq!(row.get::<String, _>("voters"), r#"{"U1":true}"#);
        assert_eq!(row.get::<String, _>("options"), r#"[["A",0],["B",1]]"#);
        assert_eq!(row.get::<i64, _>("version"), 2);
    }

    #[tokio::test]
    async fn missing_rows_report_not_found() {
        let repo = SqlPollRepository::new(setup_pool().await);
        let poll = sample_poll(&["A"]);

        assert!(matches!(repo.get_poll(&poll.id).await, Err(RepositoryError::NotFound)));
        assert!(matches!(repo.add_vote_atomic(&poll).await, Err(RepositoryError::NotFound)));
        assert!(matches!(repo.close_poll(&poll.id).await, Err(RepositoryError::NotFound)));
        assert!(matches!(repo.delete_poll(&poll.id).await, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let repo = SqlPollRepository::new(setup_pool().await);
        let poll = sample_poll(&["A", "B"]);
        repo.save_poll(poll.clone()).await.expect("save");

        let mut winner = poll.clone();
        winner.record_vote("U1", "A").expect("vote");
        let mut loser = poll.clone();
        loser.record_vote("U2", "B").expect("vote");

        assert_eq!(repo.add_vote_atomic(&winner).await.expect("first write"), 2);
        assert!(matches!(repo.add_vote_atomic(&loser).await, Err(RepositoryError::Conflict)));

        let stored = repo.get_poll(&poll.id).await.expect("load");
        assert_eq!(stored.total_votes(), 1);
        assert_eq!(stored.voters.len(), 1);
    }

    #[tokio::test]
    async fn close_keeps_votes_and_delete_removes_row() {
        let repo = SqlPollRepository::new(setup_pool().await);
        let mut poll = sample_poll(&["A", "B"]);
        repo.save_poll(poll.clone()).await.expect("save");
        poll.record_vote("U1", "A").expect("vote");
        repo.add_vote_atomic(&poll).await.expect("persist vote");

        repo.close_poll(&poll.id).await.expect("close");
        let closed = repo.get_poll(&poll.id).await.expect("load");
        assert!(closed.closed);
        assert_eq!(closed.options[0].votes, 1);

        repo.delete_poll(&poll.id).await.expect("delete");
        assert!(matches!(repo.get_poll(&poll.id).await, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn vote_read_before_close_conflicts() {
        let repo = SqlPollRepository::new(setup_pool().await);
        let poll = sample_poll(&["A", "B"]);
        repo.save_poll(poll.clone()).await.expect("save");

        let mut snapshot = repo.get_poll(&poll.id).await.expect("read");
        snapshot.record_vote("U1", "A").expect("vote on open snapshot");
        repo.close_poll(&poll.id).await.expect("close");

        assert!(matches!(repo.add_vote_atomic(&snapshot).await, Err(RepositoryError::Conflict)));

        let stored = repo.get_poll(&poll.id).await.expect("load");
        assert!(stored.closed);
        assert_eq!(stored.version, 2);
        assert_eq!(stored.total_votes(), 0);
        assert!(stored.voters.is_empty());
    }

    #[tokio::test]
    async fn concurrent_writers_on_one_version_only_one_lands() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("polls.db").display());
        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = Arc::new(SqlPollRepository::new(pool));

        let poll = sample_poll(&["A", "B"]);
        repo.save_poll(poll.clone()).await.expect("save");

        let mut handles = Vec::new();
        for voter in ["U1", "U2", "U3", "U4"] {
            let repo = Arc::clone(&repo);
            let mut snapshot = poll.clone();
            handles.push(tokio::spawn(async move {
                snapshot.record_vote(voter, "A").expect("vote");
                repo.add_vote_atomic(&snapshot).await
            }));
        }

        let mut landed = 0;
        for handle in handles {
            match handle.await.expect("join") {
                Ok(_) => landed += 1,
                Err(RepositoryError::Conflict) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(landed, 1);
        let stored = repo.get_poll(&poll.id).await.expect("load");
        assert_eq!(stored.version, 2);
        assert_eq!(stored.total_votes() as usize, stored.voters.len());
    }
}
