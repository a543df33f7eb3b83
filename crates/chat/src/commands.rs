use std::sync::Arc;

use async_trait::async_trait;

use pollbot_core::context::RequestContext;
use pollbot_core::errors::PollError;
use pollbot_core::messages::{MessageCatalog, UsageHint};
use pollbot_service::PollService;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Recognizes `<prefix> <command> <args...>`. Returns `None` when the text
/// is not addressed to the bot; the bare prefix means `help`.
pub fn parse_command(prefix: &str, input: &str) -> Option<ParsedCommand> {
    let mut tokens = tokenize(input).into_iter();
    if tokens.next()? != prefix {
        return None;
    }

    let Some(name) = tokens.next() else {
        return Some(ParsedCommand { name: "help".to_owned(), args: Vec::new() });
    };

    Some(ParsedCommand { name: name.to_lowercase(), args: tokens.collect() })
}

/// Splits chat text into arguments.
///
/// Whitespace separates tokens outside quotes. `'` and `"` open a quoted
/// run that only the same character closes; closing always emits the token,
/// so `""` yields an empty argument. Inside quotes a backslash escapes the
/// next character; outside quotes it is literal. Text left in an
/// unterminated quote is flushed at the end.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut buffer = String::new();
    let mut open_quote: Option<char> = None;
    let mut escaped = false;

    for ch in input.chars() {
        if escaped {
            buffer.push(ch);
            escaped = false;
            continue;
        }

        match open_quote {
            Some(_) if ch == '\\' => escaped = true,
            Some(quote) if ch == quote => {
                open_quote = None;
                tokens.push(std::mem::take(&mut buffer));
            }
            Some(_) => buffer.push(ch),
            None if ch == '"' || ch == '\'' => open_quote = Some(ch),
            None if ch.is_whitespace() => {
                if !buffer.is_empty() {
                    tokens.push(std::mem::take(&mut buffer));
                }
            }
            None => buffer.push(ch),
        }
    }

    if !buffer.is_empty() {
        tokens.push(buffer);
    }

    tokens
}

/// The operations the router forwards to. Implemented by [`PollService`];
/// tests substitute a recording double.
#[async_trait]
pub trait PollCommandService: Send + Sync {
    async fn create_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        question: &str,
        options: &[String],
    ) -> Result<String, PollError>;

    async fn add_vote(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
        choice: &str,
    ) -> Result<String, PollError>;

    async fn get_results(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError>;

    async fn end_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError>;

    async fn delete_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError>;
}

#[async_trait]
impl PollCommandService for PollService {
    async fn create_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        question: &str,
        options: &[String],
    ) -> Result<String, PollError> {
        PollService::create_poll(self, ctx, caller, question, options).await
    }

    async fn add_vote(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
        choice: &str,
    ) -> Result<String, PollError> {
        PollService::add_vote(self, ctx, caller, poll_id, choice).await
    }

    async fn get_results(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError> {
        PollService::get_results(self, ctx, caller, poll_id).await
    }

    async fn end_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError> {
        PollService::end_poll(self, ctx, caller, poll_id).await
    }

    async fn delete_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError> {
        PollService::delete_poll(self, ctx, caller, poll_id).await
    }
}

#[async_trait]
impl<S> PollCommandService for Arc<S>
where
    S: PollCommandService + ?Sized,
{
    async fn create_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        question: &str,
        options: &[String],
    ) -> Result<String, PollError> {
        (**self).create_poll(ctx, caller, question, options).await
    }

    async fn add_vote(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
        choice: &str,
    ) -> Result<String, PollError> {
        (**self).add_vote(ctx, caller, poll_id, choice).await
    }

    async fn get_results(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError> {
        (**self).get_results(ctx, caller, poll_id).await
    }

    async fn end_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError> {
        (**self).end_poll(ctx, caller, poll_id).await
    }

    async fn delete_poll(
        &self,
        ctx: &RequestContext,
        caller: &str,
        poll_id: &str,
    ) -> Result<String, PollError> {
        (**self).delete_poll(ctx, caller, poll_id).await
    }
}

pub struct CommandRouter<S> {
    service: S,
    messages: Arc<MessageCatalog>,
}

impl<S> CommandRouter<S>
where
    S: PollCommandService,
{
    pub fn new(service: S, messages: Arc<MessageCatalog>) -> Self {
        Self { service, messages }
    }

    pub fn messages(&self) -> &MessageCatalog {
        &self.messages
    }

    /// Checks arity and forwards to the service. Malformed commands get a
    /// usage hint as a normal reply; service errors are returned unchanged.
    pub async fn route(
        &self,
        command: &str,
        args: &[String],
        caller: &str,
        ctx: &RequestContext,
    ) -> Result<String, PollError> {
        match (command, args) {
            ("help", _) => Ok(self.messages.help()),
            ("create", [question, options @ ..]) if !options.is_empty() => {
                self.service.create_poll(ctx, caller, question, options).await
            }
            ("create", _) => Ok(self.messages.usage(UsageHint::CreateInsufficient)),
            ("vote", [poll_id, choice]) => {
                self.service.add_vote(ctx, caller, poll_id, choice).await
            }
            ("vote", _) => Ok(self.messages.usage(UsageHint::Vote)),
            ("results", [poll_id]) => self.service.get_results(ctx, caller, poll_id).await,
            ("results", _) => Ok(self.messages.usage(UsageHint::Results)),
            ("end", [poll_id]) => self.service.end_poll(ctx, caller, poll_id).await,
            ("end", _) => Ok(self.messages.usage(UsageHint::End)),
            ("delete", [poll_id]) => self.service.delete_poll(ctx, caller, poll_id).await,
            ("delete", _) => Ok(self.messages.usage(UsageHint::Delete)),
            _ => Ok(self.messages.unknown_command()),
        }
    }
}
