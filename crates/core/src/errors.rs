use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("a poll needs at least one option")]
    NoOptions,
    #[error("the question must not be empty")]
    EmptyQuestion,
    #[error("the question is longer than {max} characters")]
    QuestionTooLong { max: usize },
    #[error("options must not be empty")]
    EmptyOption,
    #[error("an option is longer than {max} characters")]
    OptionTooLong { max: usize },
    #[error("option `{0}` is listed more than once")]
    DuplicateOption(String),
    #[error("`{0}` is not a valid poll id")]
    InvalidPollId(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),
    #[error("poll not found")]
    NotFound,
    #[error("only the poll creator may do this")]
    Unauthorized,
    #[error("poll is closed")]
    PollClosed,
    #[error("voter has already voted in this poll")]
    DuplicateVote,
    #[error("option `{0}` does not exist")]
    InvalidChoice(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("request was cancelled before it completed")]
    Cancelled,
}

impl PollError {
    /// Business-rule errors whose text may be shown to the chat user as-is.
    /// Storage and cancellation failures are internal and get a generic reply.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Cancelled)
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::PollClosed => "poll_closed",
            Self::DuplicateVote => "duplicate_vote",
            Self::InvalidChoice(_) => "invalid_choice",
            Self::Storage(_) => "storage",
            Self::Cancelled => "cancelled",
        }
    }
}
