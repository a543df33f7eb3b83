pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod messages;

pub use context::RequestContext;
pub use domain::poll::{Poll, PollId, PollOption};
pub use errors::{PollError, ValidationFailure};
pub use messages::{Locale, MessageCatalog};
