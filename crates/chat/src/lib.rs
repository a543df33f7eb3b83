//! Chat front end for the poll bot.
//!
//! - `commands` parses `!poll ...` posts and routes them to the poll service
//! - `events` decodes websocket frames and turns posts into replies
//! - `socket` owns the connect/read/dispatch loop over any transport
//! - `mattermost` is the production transport (websocket + REST)
//!
//! ```text
//! websocket frame -> decode_frame -> ChatRunner -> PollCommandHandler
//!                                        |               |
//!                                  MessagePoster <- CommandRouter -> PollService
//! ```

pub mod commands;
pub mod events;
pub mod mattermost;
pub mod socket;

pub use commands::{parse_command, CommandRouter, ParsedCommand, PollCommandService};
pub use events::{ChatEnvelope, ChatEvent, EventHandler, HandlerResult, PollCommandHandler};
pub use mattermost::{BotIdentity, MattermostClient, MattermostWebSocket};
pub use socket::{
    ChatRunner, ChatTransport, ConnectPolicy, MessagePoster, RunnerSettings, SocketError,
    TransportError,
};
