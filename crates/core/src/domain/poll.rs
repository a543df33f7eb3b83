use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{PollError, ValidationFailure};

pub const POLL_ID_LEN: usize = 36;
pub const DEFAULT_MAX_QUESTION_LEN: usize = 255;
pub const DEFAULT_MAX_OPTION_LEN: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PollId(pub String);

impl PollId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts exactly the shape `generate` produces: 36 characters of
    /// lower-case hex digits and hyphens.
    pub fn parse(raw: &str) -> Option<Self> {
        let bytes = raw.as_bytes();
        if bytes.len() != POLL_ID_LEN {
            return None;
        }

        if bytes.iter().all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f' | b'-')) {
            Some(Self(raw.to_owned()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollLimits {
    pub max_question_len: usize,
    pub max_option_len: usize,
}

impl Default for PollLimits {
    fn default() -> Self {
        Self { max_question_len: DEFAULT_MAX_QUESTION_LEN, max_option_len: DEFAULT_MAX_OPTION_LEN }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub label: String,
    pub votes: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub creator: String,
    pub question: String,
    pub options: Vec<PollOption>,
    pub voters: BTreeSet<String>,
    pub closed: bool,
    /// Optimistic concurrency token; bumped by every persisted vote.
    pub version: u64,
}

impl Poll {
    /// Builds a fresh open poll after checking the creation rules in order:
    /// option presence, question length, option length, then label uniqueness.
    pub fn create(
        id: PollId,
        creator: impl Into<String>,
        question: impl Into<String>,
        labels: &[String],
        limits: &PollLimits,
    ) -> Result<Self, ValidationFailure> {
        let question = question.into();

        if labels.is_empty() {
            return Err(ValidationFailure::NoOptions);
        }
        if question.trim().is_empty() {
            return Err(ValidationFailure::EmptyQuestion);
        }
        if question.chars().count() > limits.max_question_len {
            return Err(ValidationFailure::QuestionTooLong { max: limits.max_question_len });
        }

        for label in labels {
            if label.trim().is_empty() {
                return Err(ValidationFailure::EmptyOption);
            }
            if label.chars().count() > limits.max_option_len {
                return Err(ValidationFailure::OptionTooLong { max: limits.max_option_len });
            }
        }

        let mut seen = HashSet::with_capacity(labels.len());
        let mut options = Vec::with_capacity(labels.len());
        for label in labels {
            if !seen.insert(label.as_str()) {
                return Err(ValidationFailure::DuplicateOption(label.clone()));
            }
            options.push(PollOption { label: label.clone(), votes: 0 });
        }

        Ok(Self {
            id,
            creator: creator.into(),
            question,
            options,
            voters: BTreeSet::new(),
            closed: false,
            version: 1,
        })
    }

    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator == user_id
    }

    pub fn has_voted(&self, user_id: &str) -> bool {
        self.voters.contains(user_id)
    }

    pub fn has_option(&self, label: &str) -> bool {
        self.options.iter().any(|option| option.label == label)
    }

    pub fn total_votes(&self) -> u32 {
        self.options.iter().map(|option| option.votes).sum()
    }

    /// Applies one vote in memory. Eligibility is checked before anything is
    /// mutated, so a rejected vote leaves the poll untouched.
    pub fn record_vote(&mut self, voter: &str, choice: &str) -> Result<(), PollError> {
        if self.closed {
            return Err(PollError::PollClosed);
        }
        if self.has_voted(voter) {
            return Err(PollError::DuplicateVote);
        }

        let Some(option) = self.options.iter_mut().find(|option| option.label == choice) else {
            return Err(PollError::InvalidChoice(choice.to_owned()));
        };

        option.votes += 1;
        self.voters.insert(voter.to_owned());
        Ok(())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::{Poll, PollId, PollLimits};
    use crate::errors::{PollError, ValidationFailure};

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn open_poll() -> Poll {
        Poll::create(
            PollId::generate(),
            "U-creator",
            "Lunch?",
            &labels(&["Pizza", "Sushi"]),
            &PollLimits::default(),
        )
        .expect("valid poll")
    }

    #[test]
    fn generated_ids_pass_shape_check() {
        let id = PollId::generate();
        assert_eq!(PollId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn id_shape_rejects_wrong_length_and_alphabet() {
        assert!(PollId::parse("poll-1").is_none());
        assert!(PollId::parse("6F9619FF-8B86-D011-B42D-00C04FC964FF").is_none());
        assert!(PollId::parse("zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz").is_none());
        assert!(PollId::parse("6f9619ff-8b86-d011-b42d-00c04fc964ff").is_some());
    }

    #[test]
    fn create_zeroes_counts_and_starts_open() {
        let poll = open_poll();

        assert_eq!(poll.creator, "U-creator");
        assert!(poll.options.iter().all(|option| option.votes == 0));
        assert_eq!(poll.options[0].label, "Pizza");
        assert_eq!(poll.options[1].label, "Sushi");
        assert!(poll.voters.is_empty());
        assert!(!poll.closed);
        assert_eq!(poll.version, 1);
    }

    #[test]
    fn create_rejects_bad_input_in_rule_order() {
        let limits = PollLimits { max_question_len: 10, max_option_len: 3 };
        let id = PollId::generate;

        assert_eq!(
            Poll::create(id(), "U1", "Q?", &[], &limits).expect_err("no options"),
            ValidationFailure::NoOptions
        );
        assert_eq!(
            Poll::create(id(), "U1", "a question far too long", &labels(&["A"]), &limits)
                .expect_err("long question"),
            ValidationFailure::QuestionTooLong { max: 10 }
        );
        assert_eq!(
            Poll::create(id(), "U1", "Q?", &labels(&["ABCD"]), &limits).expect_err("long option"),
            ValidationFailure::OptionTooLong { max: 3 }
        );
        assert_eq!(
            Poll::create(id(), "U1", "Q?", &labels(&["A", "B", "A"]), &limits)
                .expect_err("duplicate"),
            ValidationFailure::DuplicateOption("A".to_string())
        );
        assert_eq!(
            Poll::create(id(), "U1", "  ", &labels(&["A"]), &limits).expect_err("empty question"),
            ValidationFailure::EmptyQuestion
        );
    }

    #[test]
    fn labels_are_compared_case_sensitively() {
        let poll = Poll::create(
            PollId::generate(),
            "U1",
            "Q?",
            &labels(&["yes", "Yes"]),
            &PollLimits::default(),
        )
        .expect("case variants are distinct");
        assert_eq!(poll.options.len(), 2);
    }

    #[test]
    fn length_limits_count_characters_not_bytes() {
        let limits = PollLimits { max_question_len: 4, max_option_len: 2 };
        Poll::create(PollId::generate(), "U1", "Обед", &labels(&["да"]), &limits)
            .expect("four cyrillic characters fit");
    }

    #[test]
    fn record_vote_counts_once_per_voter() {
        let mut poll = open_poll();
        poll.record_vote("U1", "Pizza").expect("first vote");
        poll.record_vote("U2", "Pizza").expect("second voter");

        let before = poll.clone();
        let error = poll.record_vote("U1", "Sushi").expect_err("duplicate vote");

        assert_eq!(error, PollError::DuplicateVote);
        assert_eq!(poll, before);
        assert_eq!(poll.options[0].votes, 2);
        assert_eq!(poll.total_votes() as usize, poll.voters.len());
    }

    #[test]
    fn record_vote_rejects_unknown_choice_without_mutation() {
        let mut poll = open_poll();
        let error = poll.record_vote("U1", "Tacos").expect_err("unknown option");

        assert_eq!(error, PollError::InvalidChoice("Tacos".to_string()));
        assert!(poll.voters.is_empty());
    }

    #[test]
    fn closed_poll_rejects_votes() {
        let mut poll = open_poll();
        poll.close();
        poll.close();

        assert!(poll.closed);
        assert_eq!(poll.record_vote("U1", "Pizza").expect_err("closed"), PollError::PollClosed);
    }
}
