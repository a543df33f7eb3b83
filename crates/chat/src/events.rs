use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use pollbot_core::context::RequestContext;

use crate::commands::{parse_command, CommandRouter, PollCommandService};

pub const POSTED_EVENT: &str = "posted";
pub const HELLO_EVENT: &str = "hello";

/// One decoded websocket frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEnvelope {
    pub seq: Option<i64>,
    pub event: ChatEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Posted(PostedMessage),
    Hello { server_version: Option<String> },
    /// Server acknowledgement of a client request such as the
    /// authentication challenge.
    Reply { seq_reply: i64, status: String },
    Unsupported { event_type: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> &str {
        match self {
            Self::Posted(_) => POSTED_EVENT,
            Self::Hello { .. } => HELLO_EVENT,
            Self::Reply { .. } => "reply",
            Self::Unsupported { event_type } => event_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PostedMessage {
    #[serde(rename = "id")]
    pub post_id: String,
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("frame is not valid json: {0}")]
    Frame(#[from] serde_json::Error),
    #[error("posted event is missing the `data.post` string")]
    MissingPost,
    #[error("embedded post is not valid json: {0}")]
    Post(serde_json::Error),
}

#[derive(Deserialize)]
struct RawFrame {
    event: Option<String>,
    #[serde(default)]
    data: Value,
    seq: Option<i64>,
    seq_reply: Option<i64>,
    status: Option<String>,
}

/// Decodes a websocket text frame. A `posted` event carries the post as a
/// JSON string in `data.post`, so it is decoded twice.
pub fn decode_frame(raw: &str) -> Result<ChatEnvelope, EventDecodeError> {
    let frame: RawFrame = serde_json::from_str(raw)?;

    let event = match frame.event.as_deref() {
        Some(POSTED_EVENT) => {
            let post = frame
                .data
                .get("post")
                .and_then(Value::as_str)
                .ok_or(EventDecodeError::MissingPost)?;
            let message: PostedMessage =
                serde_json::from_str(post).map_err(EventDecodeError::Post)?;
            ChatEvent::Posted(message)
        }
        Some(HELLO_EVENT) => ChatEvent::Hello {
            server_version: frame
                .data
                .get("server_version")
                .and_then(Value::as_str)
                .map(str::to_owned),
        },
        Some(other) => ChatEvent::Unsupported { event_type: other.to_owned() },
        None => ChatEvent::Reply {
            seq_reply: frame.seq_reply.unwrap_or_default(),
            status: frame.status.unwrap_or_default(),
        },
    };

    Ok(ChatEnvelope { seq: frame.seq, event })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(String),
    Ignored,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, message: &PostedMessage, ctx: &RequestContext) -> HandlerResult;
}

/// Turns chat posts addressed to the bot into poll commands and renders
/// the outcome, errors included, as reply text.
pub struct PollCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> PollCommandHandler<S>
where
    S: PollCommandService,
{
    pub fn new(router: CommandRouter<S>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl<S> EventHandler for PollCommandHandler<S>
where
    S: PollCommandService,
{
    async fn handle(&self, message: &PostedMessage, ctx: &RequestContext) -> HandlerResult {
        let messages = self.router.messages();
        let Some(command) = parse_command(messages.command_prefix(), &message.message) else {
            return HandlerResult::Ignored;
        };

        debug!(
            event_name = "chat.command.received",
            correlation_id = %ctx.correlation_id,
            channel_id = %message.channel_id,
            command = %command.name,
            arg_count = command.args.len(),
            "routing poll command"
        );

        match self.router.route(&command.name, &command.args, &message.user_id, ctx).await {
            Ok(reply) => HandlerResult::Responded(reply),
            Err(error) => {
                if error.is_user_facing() {
                    debug!(
                        event_name = "chat.command.rejected",
                        correlation_id = %ctx.correlation_id,
                        command = %command.name,
                        error_class = error.error_class(),
                        error = %error,
                        "poll command rejected"
                    );
                } else {
                    warn!(
                        event_name = "chat.command.failed",
                        correlation_id = %ctx.correlation_id,
                        channel_id = %message.channel_id,
                        command = %command.name,
                        error_class = error.error_class(),
                        error = %error,
                        "poll command failed"
                    );
                }
                HandlerResult::Responded(messages.error(&error))
            }
        }
    }
}
