use std::sync::Arc;

use tracing::{debug, info};

use pollbot_core::context::RequestContext;
use pollbot_core::domain::poll::{Poll, PollId, PollLimits};
use pollbot_core::errors::{PollError, ValidationFailure};
use pollbot_core::messages::MessageCatalog;
use pollbot_db::retry::{ConflictAware, ConflictRetryPolicy, RetryError};
use pollbot_db::{PollRepository, RepositoryError};

/// Poll lifecycle rules on top of a [`PollRepository`]. Every operation
/// returns the reply text for the chat user.
pub struct PollService {
    repository: Arc<dyn PollRepository>,
    messages: Arc<MessageCatalog>,
    limits: PollLimits,
    retry_policy: ConflictRetryPolicy,
}

#[derive(Debug)]
enum VoteAttemptError {
    Rejected(PollError),
    Store(RepositoryError),
}

impl ConflictAware for VoteAttemptError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(error) if error.is_conflict())
    }
}

fn storage_error(action: &str, error: RepositoryError) -> PollError {
    match error {
        RepositoryError::NotFound => PollError::NotFound,
        other => PollError::Storage(format!("{action}: {other}")),
    }
}

impl PollService {
    pub fn new(repository: Arc<dyn PollRepository>, messages: Arc<MessageCatalog>) -> Self {
        Self {
            repository,
            messages,
            limits: PollLimits::default(),
            retry_policy: ConflictRetryPolicy::default(),
        }
    }

    pub fn with_limits(mut self, limits: PollLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: ConflictRetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn messages(&self) -> &MessageCatalog {
        &self.messages
    }

    pub async fn create_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        question: &str,
        options: &[String],
    ) -> Result<String, PollError> {
        let poll = Poll::create(PollId::generate(), caller, question, options, &self.limits)?;

        ctx.ensure_active()?;
        self.repository
            .save_poll(poll.clone())
            .await
            .map_err(|error| PollError::Storage(format!("failed to save poll: {error}")))?;

        info!(
            event_name = "poll.created",
            correlation_id = %ctx.correlation_id,
            poll_id = %poll.id,
            creator = %poll.creator,
            option_count = poll.options.len(),
            "poll created"
        );
        Ok(self.messages.poll_created(&poll))
    }

    /// Records one vote. The read, eligibility checks and conditional write
    /// are repeated as a unit whenever another writer bumped the version
    /// first, so a retry re-validates against the fresh state.
    pub async fn add_vote(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
        choice: &str,
    ) -> Result<String, PollError> {
        let id = PollId::parse(poll_id)
            .ok_or_else(|| ValidationFailure::InvalidPollId(poll_id.to_owned()))?;

        let repository = self.repository.as_ref();
        let id_ref = &id;
        let outcome = self
            .retry_policy
            .run(|attempt| async move {
                ctx.ensure_active().map_err(VoteAttemptError::Rejected)?;
                let mut poll =
                    repository.get_poll(id_ref).await.map_err(VoteAttemptError::Store)?;
                poll.record_vote(caller, choice).map_err(VoteAttemptError::Rejected)?;

                ctx.ensure_active().map_err(VoteAttemptError::Rejected)?;
                let version =
                    repository.add_vote_atomic(&poll).await.map_err(VoteAttemptError::Store)?;
                debug!(
                    event_name = "poll.vote.persisted",
                    correlation_id = %ctx.correlation_id,
                    poll_id = %id_ref,
                    attempt,
                    version,
                    "vote written"
                );
                Ok(())
            })
            .await;

        match outcome {
            Ok(()) => {
                info!(
                    event_name = "poll.vote.recorded",
                    correlation_id = %ctx.correlation_id,
                    poll_id = %id,
                    voter = %caller,
                    "vote recorded"
                );
                Ok(self.messages.vote_recorded(&id, choice))
            }
            Err(RetryError::Exhausted { attempts }) => {
                Err(PollError::Storage(format!("failed to persist vote after {attempts} attempts")))
            }
            Err(RetryError::Operation(VoteAttemptError::Rejected(error))) => Err(error),
            Err(RetryError::Operation(VoteAttemptError::Store(error))) => {
                Err(storage_error("failed to persist vote", error))
            }
        }
    }

    pub async fn get_results(
        &self,
        ctx: &RequestContext,
        _caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError> {
        let poll = self.load(ctx, poll_id).await?;
        Ok(self.messages.results(&poll))
    }

    /// Closes the poll. Ending an already closed poll succeeds without a
    /// second write.
    pub async fn end_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError> {
        let poll = self.load(ctx, poll_id).await?;
        if !poll.is_creator(caller) {
            return Err(PollError::Unauthorized);
        }

        if !poll.closed {
            ctx.ensure_active()?;
            self.repository
                .close_poll(&poll.id)
                .await
                .map_err(|error| storage_error("failed to close poll", error))?;
            info!(
                event_name = "poll.closed",
                correlation_id = %ctx.correlation_id,
                poll_id = %poll.id,
                "poll closed"
            );
        }

        Ok(self.messages.poll_ended(&poll.id))
    }

    pub async fn delete_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError> {
        let poll = self.load(ctx, poll_id).await?;
        if !poll.is_creator(caller) {
            return Err(PollError::Unauthorized);
        }

        ctx.ensure_active()?;
        self.repository
            .delete_poll(&poll.id)
            .await
            .map_err(|error| storage_error("failed to delete poll", error))?;

        info!(
            event_name = "poll.deleted",
            correlation_id = %ctx.correlation_id,
            poll_id = %poll.id,
            "poll deleted"
        );
        Ok(self.messages.poll_deleted(&poll.id))
    }

    pub async fn store_ready(&self) -> bool {
        self.repository.ping().await.is_ok()
    }

    async fn load(&self, ctx: &RequestContext, poll_id: &str) -> Result<Poll, PollError> {
        ctx.ensure_active()?;
        self.repository
            .get_poll(&PollId(poll_id.to_owned()))
            .await
            .map_err(|error| storage_error("failed to load poll", error))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use pollbot_core::context::RequestContext;
    use pollbot_core::domain::poll::{Poll, PollId, PollLimits};
    use pollbot_core::errors::{PollError, ValidationFailure};
    use pollbot_core::messages::{Locale, MessageCatalog};
    use pollbot_db::retry::ConflictRetryPolicy;
    use pollbot_db::{
        connect_with_settings, migrations, InMemoryPollRepository, PollRepository,
        RepositoryError, SqlPollRepository,
    };

    use super::PollService;

    fn catalog() -> Arc<MessageCatalog> {
        Arc::new(MessageCatalog::new(Locale::En, "!poll").expect("catalog"))
    }

    fn fast_retry() -> ConflictRetryPolicy {
        ConflictRetryPolicy::new(5, Duration::from_millis(1))
    }

    fn memory_service() -> (PollService, Arc<InMemoryPollRepository>) {
        let repository = Arc::new(InMemoryPollRepository::default());
        let service =
            PollService::new(repository.clone(), catalog()).with_retry_policy(fast_retry());
        (service, repository)
    }

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn ctx() -> RequestContext {
        RequestContext::new("req-test")
    }

    async fn seeded_poll(repository: &InMemoryPollRepository) -> Poll {
        let poll = Poll::create(
            PollId::generate(),
            "U-creator",
            "Lunch?",
            &labels(&["Pizza", "Sushi"]),
            &PollLimits::default(),
        )
        .expect("valid poll");
        repository.save_poll(poll.clone()).await.expect("seed poll");
        poll
    }

    /// Delegates to an in-memory store but reports the first `conflicts`
    /// conditional writes as lost races.
    struct ConflictingRepository {
        inner: InMemoryPollRepository,
        conflicts: u32,
        writes: AtomicU32,
    }

    impl ConflictingRepository {
        fn new(conflicts: u32) -> Self {
            Self { inner: InMemoryPollRepository::default(), conflicts, writes: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl PollRepository for ConflictingRepository {
        async fn save_poll(&self, poll: Poll) -> Result<(), RepositoryError> {
            self.inner.save_poll(poll).await
        }

        async fn get_poll(&self, id: &PollId) -> Result<Poll, RepositoryError> {
            self.inner.get_poll(id).await
        }

        async fn add_vote_atomic(&self, poll: &Poll) -> Result<u64, RepositoryError> {
            let write = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            if write <= self.conflicts {
                return Err(RepositoryError::Conflict);
            }
            self.inner.add_vote_atomic(poll).await
        }

        async fn close_poll(&self, id: &PollId) -> Result<(), RepositoryError> {
            self.inner.close_poll(id).await
        }

        async fn delete_poll(&self, id: &PollId) -> Result<(), RepositoryError> {
            self.inner.delete_poll(id).await
        }
    }

    /// Closes the poll right before the first conditional write, as if the
    /// creator ended it while a vote was in flight.
    struct EndedMidVoteRepository {
        inner: InMemoryPollRepository,
        closed: AtomicU32,
    }

    #[async_trait]
    impl PollRepository for EndedMidVoteRepository {
        async fn save_poll(&self, poll: Poll) -> Result<(), RepositoryError> {
            self.inner.save_poll(poll).await
        }

        async fn get_poll(&self, id: &PollId) -> Result<Poll, RepositoryError> {
            self.inner.get_poll(id).await
        }

        async fn add_vote_atomic(&self, poll: &Poll) -> Result<u64, RepositoryError> {
            if self.closed.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.close_poll(&poll.id).await?;
            }
            self.inner.add_vote_atomic(poll).await
        }

        async fn close_poll(&self, id: &PollId) -> Result<(), RepositoryError> {
            self.inner.close_poll(id).await
        }

        async fn delete_poll(&self, id: &PollId) -> Result<(), RepositoryError> {
            self.inner.delete_poll(id).await
        }
    }

    struct FailingRepository;

    #[async_trait]
    impl PollRepository for FailingRepository {
        async fn save_poll(&self, _poll: Poll) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("disk full".to_owned()))
        }

        async fn get_poll(&self, _id: &PollId) -> Result<Poll, RepositoryError> {
            Err(RepositoryError::NotFound)
        }

        async fn add_vote_atomic(&self, _poll: &Poll) -> Result<u64, RepositoryError> {
            Err(RepositoryError::NotFound)
        }

        async fn close_poll(&self, _id: &PollId) -> Result<(), RepositoryError> {
            Err(RepositoryError::NotFound)
        }

        async fn delete_poll(&self, _id: &PollId) -> Result<(), RepositoryError> {
            Err(RepositoryError::NotFound)
        }

        async fn ping(&self) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("unreachable".to_owned()))
        }
    }

    #[tokio::test]
    async fn create_then_results_shows_zeroed_counts() {
        let (service, repository) = memory_service();

        let reply = service
            .create_poll(&ctx(), "U-creator", "Lunch?", &labels(&["Pizza", "Sushi"]))
            .await
            .expect("create");
        assert!(reply.contains("Lunch?"));
        assert!(reply.contains("1. Pizza"));
        assert!(reply.contains("2. Sushi"));

        assert_eq!(repository.len().await, 1);
        let id = reply
            .split('`')
            .nth(1)
            .and_then(PollId::parse)
            .expect("reply should quote the generated id");
        let stored = repository.get_poll(&id).await.expect("stored poll");
        assert_eq!(stored.creator, "U-creator");
        assert!(stored.voters.is_empty());
        assert!(!stored.closed);
        assert!(stored.options.iter().all(|option| option.votes == 0));

        let results = service.get_results(&ctx(), "U-other", id.as_str()).await.expect("results");
        assert!(results.contains("Pizza: 0"));
        assert!(results.contains("Sushi: 0"));
    }

    #[tokio::test]
    async fn create_rejects_invalid_input_without_saving() {
        let (service, repository) = memory_service();

        let error = service
            .create_poll(&ctx(), "U1", "Q?", &labels(&["A", "A"]))
            .await
            .expect_err("duplicate");
        assert_eq!(error, PollError::Validation(ValidationFailure::DuplicateOption("A".into())));

        let long_question = "q".repeat(256);
        let error = service
            .create_poll(&ctx(), "U1", &long_question, &labels(&["A"]))
            .await
            .expect_err("long question");
        assert_eq!(
            error,
            PollError::Validation(ValidationFailure::QuestionTooLong { max: 255 })
        );

        let error = service.create_poll(&ctx(), "U1", "Q?", &[]).await.expect_err("no options");
        assert_eq!(error, PollError::Validation(ValidationFailure::NoOptions));

        assert!(repository.is_empty().await);
    }

    #[tokio::test]
    async fn configured_limits_are_applied() {
        let (service, _) = memory_service();
        let service =
            service.with_limits(PollLimits { max_question_len: 5, max_option_len: 100 });

        let error = service
            .create_poll(&ctx(), "U1", "Longer?", &labels(&["A"]))
            .await
            .expect_err("question over limit");
        assert_eq!(error, PollError::Validation(ValidationFailure::QuestionTooLong { max: 5 }));
    }

    #[tokio::test]
    async fn save_failure_is_wrapped_as_storage() {
        let service = PollService::new(Arc::new(FailingRepository), catalog());

        let error = service
            .create_poll(&ctx(), "U1", "Q?", &labels(&["A"]))
            .await
            .expect_err("save fails");

        assert!(matches!(error, PollError::Storage(ref message) if message.contains("disk full")));
        assert!(!service.store_ready().await);
    }

    #[tokio::test]
    async fn distinct_voters_are_counted_exactly() {
        let (service, repository) = memory_service();
        let poll = seeded_poll(&repository).await;

        for (voter, choice) in [("U1", "Pizza"), ("U2", "Sushi"), ("U3", "Pizza")] {
            let reply =
                service.add_vote(&ctx(), voter, poll.id.as_str(), choice).await.expect("vote");
            assert!(reply.contains(poll.id.as_str()));
            assert!(reply.contains(choice));
        }

        let stored = repository.get_poll(&poll.id).await.expect("load");
        assert_eq!(stored.options[0].votes, 2);
        assert_eq!(stored.options[1].votes, 1);
        assert_eq!(stored.total_votes() as usize, stored.voters.len());
    }

    #[tokio::test]
    async fn second_vote_by_same_voter_is_rejected() {
        let (service, repository) = memory_service();
        let poll = seeded_poll(&repository).await;

        service.add_vote(&ctx(), "U1", poll.id.as_str(), "Pizza").await.expect("first vote");
        let error = service
            .add_vote(&ctx(), "U1", poll.id.as_str(), "Sushi")
            .await
            .expect_err("second vote");

        assert_eq!(error, PollError::DuplicateVote);
        let stored = repository.get_poll(&poll.id).await.expect("load");
        assert_eq!(stored.options[0].votes, 1);
        assert_eq!(stored.options[1].votes, 0);
    }

    #[tokio::test]
    async fn vote_errors_follow_rule_order() {
        let (service, repository) = memory_service();
        let poll = seeded_poll(&repository).await;

        let error =
            service.add_vote(&ctx(), "U1", "not-an-id", "Pizza").await.expect_err("bad id");
        assert_eq!(
            error,
            PollError::Validation(ValidationFailure::InvalidPollId("not-an-id".into()))
        );

        let missing = PollId::generate();
        let error =
            service.add_vote(&ctx(), "U1", missing.as_str(), "Pizza").await.expect_err("missing");
        assert_eq!(error, PollError::NotFound);

        let error = service
            .add_vote(&ctx(), "U1", poll.id.as_str(), "Tacos")
            .await
            .expect_err("unknown option");
        assert_eq!(error, PollError::InvalidChoice("Tacos".into()));
    }

    #[tokio::test]
    async fn vote_after_end_is_rejected() {
        let (service, repository) = memory_service();
        let poll = seeded_poll(&repository).await;

        service.end_poll(&ctx(), "U-creator", poll.id.as_str()).await.expect("end");
        let error = service
            .add_vote(&ctx(), "U1", poll.id.as_str(), "Pizza")
            .await
            .expect_err("closed poll");

        assert_eq!(error, PollError::PollClosed);
    }

    #[tokio::test]
    async fn vote_racing_end_is_rejected_as_closed() {
        let repository = Arc::new(EndedMidVoteRepository {
            inner: InMemoryPollRepository::default(),
            closed: AtomicU32::new(0),
        });
        let service =
            PollService::new(repository.clone(), catalog()).with_retry_policy(fast_retry());
        let poll = seeded_poll(&repository.inner).await;

        let error = service
            .add_vote(&ctx(), "U1", poll.id.as_str(), "Pizza")
            .await
            .expect_err("poll ended mid-vote");

        assert_eq!(error, PollError::PollClosed);
        let stored = repository.get_poll(&poll.id).await.expect("load");
        assert!(stored.closed);
        assert_eq!(stored.total_votes(), 0);
        assert!(stored.voters.is_empty());
    }

    #[tokio::test]
    async fn only_creator_may_end_or_delete() {
        let (service, repository) = memory_service();
        let poll = seeded_poll(&repository).await;

        assert_eq!(
            service.end_poll(&ctx(), "U-intruder", poll.id.as_str()).await,
            Err(PollError::Unauthorized)
        );
        assert_eq!(
            service.delete_poll(&ctx(), "U-intruder", poll.id.as_str()).await,
            Err(PollError::Unauthorized)
        );
        assert!(!repository.get_poll(&poll.id).await.expect("still there").closed);

        let ended =
            service.end_poll(&ctx(), "U-creator", poll.id.as_str()).await.expect("creator ends");
        assert!(ended.contains(poll.id.as_str()));
        service.delete_poll(&ctx(), "U-creator", poll.id.as_str()).await.expect("creator deletes");
        assert!(repository.is_empty().await);
    }

    #[tokio::test]
    async fn ending_twice_is_a_quiet_success() {
        let (service, repository) = memory_service();
        let poll = seeded_poll(&repository).await;

        service.end_poll(&ctx(), "U-creator", poll.id.as_str()).await.expect("first end");
        service.end_poll(&ctx(), "U-creator", poll.id.as_str()).await.expect("second end");

        assert!(repository.get_poll(&poll.id).await.expect("load").closed);
    }

    #[tokio::test]
    async fn missing_poll_is_not_found_for_every_lookup() {
        let (service, _) = memory_service();
        let id = PollId::generate();

        assert_eq!(service.get_results(&ctx(), "U1", id.as_str()).await, Err(PollError::NotFound));
        assert_eq!(service.end_poll(&ctx(), "U1", id.as_str()).await, Err(PollError::NotFound));
        assert_eq!(service.delete_poll(&ctx(), "U1", id.as_str()).await, Err(PollError::NotFound));
        assert_eq!(service.get_results(&ctx(), "U1", "x").await, Err(PollError::NotFound));
    }

    #[tokio::test]
    async fn vote_survives_transient_conflicts() {
        let repository = Arc::new(ConflictingRepository::new(3));
        let service =
            PollService::new(repository.clone(), catalog()).with_retry_policy(fast_retry());
        let poll = Poll::create(
            PollId::generate(),
            "U-creator",
            "Q?",
            &labels(&["A"]),
            &PollLimits::default(),
        )
        .expect("poll");
        repository.save_poll(poll.clone()).await.expect("seed");

        service.add_vote(&ctx(), "U1", poll.id.as_str(), "A").await.expect("vote lands");

        assert_eq!(repository.writes.load(Ordering::SeqCst), 4);
        assert_eq!(repository.get_poll(&poll.id).await.expect("load").options[0].votes, 1);
    }

    #[tokio::test]
    async fn vote_fails_after_retry_budget_is_spent() {
        let repository = Arc::new(ConflictingRepository::new(u32::MAX));
        let service =
            PollService::new(repository.clone(), catalog()).with_retry_policy(fast_retry());
        let poll = Poll::create(
            PollId::generate(),
            "U-creator",
            "Q?",
            &labels(&["A"]),
            &PollLimits::default(),
        )
        .expect("poll");
        repository.save_poll(poll.clone()).await.expect("seed");

        let error =
            service.add_vote(&ctx(), "U1", poll.id.as_str(), "A").await.expect_err("exhausted");

        assert_eq!(error, PollError::Storage("failed to persist vote after 5 attempts".into()));
        assert_eq!(repository.writes.load(Ordering::SeqCst), 5);
        assert!(!error.is_user_facing());
    }

    #[tokio::test]
    async fn cancelled_request_never_reaches_the_store() {
        let (service, repository) = memory_service();
        let token = CancellationToken::new();
        token.cancel();
        let cancelled = RequestContext::new("req-cancelled").with_cancellation(token);

        let error = service
            .create_poll(&cancelled, "U1", "Q?", &labels(&["A"]))
            .await
            .expect_err("cancelled");

        assert_eq!(error, PollError::Cancelled);
        assert!(repository.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_voters_on_sql_backend_both_land() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("polls.db").display());
        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let repository = Arc::new(SqlPollRepository::new(pool));
        let service = Arc::new(
            PollService::new(repository.clone(), catalog())
                .with_retry_policy(ConflictRetryPolicy::new(20, Duration::from_millis(2))),
        );
        let poll = Poll::create(
            PollId::generate(),
            "U-creator",
            "Q?",
            &labels(&["A", "B"]),
            &PollLimits::default(),
        )
        .expect("poll");
        repository.save_poll(poll.clone()).await.expect("seed");

        let mut handles = Vec::new();
        for (voter, choice) in [("U1", "A"), ("U2", "B"), ("U3", "A"), ("U4", "A")] {
            let service = Arc::clone(&service);
            let poll_id = poll.id.clone();
            handles.push(tokio::spawn(async move {
                service.add_vote(&RequestContext::new(voter), voter, poll_id.as_str(), choice).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("every distinct voter lands");
        }

        let stored = repository.get_poll(&poll.id).await.expect("load");
        assert_eq!(stored.options[0].votes, 3);
        assert_eq!(stored.options[1].votes, 1);
        assert_eq!(stored.voters.len(), 4);
    }

    #[tokio::test]
    async fn two_voters_land_with_default_retry_policy() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("polls.db").display());
        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let repository = Arc::new(SqlPollRepository::new(pool));
        let service = Arc::new(
            PollService::new(repository.clone(), catalog())
                .with_retry_policy(ConflictRetryPolicy::default()),
        );
        let poll = Poll::create(
            PollId::generate(),
            "U-creator",
            "Q?",
            &labels(&["A", "B"]),
            &PollLimits::default(),
        )
        .expect("poll");
        repository.save_poll(poll.clone()).await.expect("seed");

        let first = {
            let service = Arc::clone(&service);
            let poll_id = poll.id.clone();
            tokio::spawn(async move {
                service.add_vote(&RequestContext::new("U1"), "U1", poll_id.as_str(), "A").await
            })
        };
        let second = {
            let service = Arc::clone(&service);
            let poll_id = poll.id.clone();
            tokio::spawn(async move {
                service.add_vote(&RequestContext::new("U2"), "U2", poll_id.as_str(), "B").await
            })
        };
        first.await.expect("join").expect("first voter lands");
        second.await.expect("join").expect("second voter lands");

        let stored = repository.get_poll(&poll.id).await.expect("load");
        assert_eq!(stored.options[0].votes, 1);
        assert_eq!(stored.options[1].votes, 1);
        assert!(stored.has_voted("U1") && stored.has_voted("U2"));
        assert_eq!(stored.version, 3);
    }
}
