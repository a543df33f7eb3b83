use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pollbot_core::context::RequestContext;

use crate::events::{ChatEnvelope, ChatEvent, EventHandler, HandlerResult, PostedMessage};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("could not connect to chat server after {attempts} attempts: {last_error}")]
    ConnectExhausted { attempts: u32, last_error: TransportError },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Bounded connect retries with a linearly growing pause:
/// `base_delay * attempt` after the n-th failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, base_delay: Duration::from_secs(1) }
    }
}

impl ConnectPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// Next decoded frame; `Ok(None)` once the server closed the stream.
    async fn next_event(&self) -> Result<Option<ChatEnvelope>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait MessagePoster: Send + Sync {
    async fn post_message(&self, channel_id: &str, message: &str) -> Result<(), TransportError>;
}

#[derive(Clone, Debug)]
pub struct RunnerSettings {
    pub bot_user_id: String,
    pub connect_policy: ConnectPolicy,
    pub request_timeout: Duration,
}

pub struct ChatRunner {
    transport: Arc<dyn ChatTransport>,
    poster: Arc<dyn MessagePoster>,
    handler: Arc<dyn EventHandler>,
    settings: RunnerSettings,
}

impl ChatRunner {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        poster: Arc<dyn MessagePoster>,
        handler: Arc<dyn EventHandler>,
        settings: RunnerSettings,
    ) -> Self {
        Self { transport, poster, handler, settings }
    }

    /// Connects, then pumps events until the stream ends or `shutdown`
    /// fires. Each post is handled on its own task; in-flight handlers are
    /// awaited before the socket is closed.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), SocketError> {
        if !self.connect_with_retry(&shutdown).await? {
            info!("shutdown requested while connecting; chat runner stopped");
            return Ok(());
        }

        let mut in_flight = JoinSet::new();
        let outcome = self.pump(&shutdown, &mut in_flight).await;

        let pending = in_flight.len();
        if pending > 0 {
            info!(pending, "waiting for in-flight command handlers");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(error) = joined {
                warn!(error = %error, "command handler task panicked or was aborted");
            }
        }

        if let Err(error) = self.transport.disconnect().await {
            warn!(error = %error, "failed to close chat transport cleanly");
        }
        info!("chat runner stopped");

        outcome
    }

    /// `Ok(false)` when shutdown fired during a backoff pause.
    async fn connect_with_retry(&self, shutdown: &CancellationToken) -> Result<bool, SocketError> {
        let max_attempts = self.settings.connect_policy.max_attempts.max(1);
        let mut last_error = TransportError::Connect("no attempt made".to_owned());

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, "connecting to chat server");
            match self.transport.connect().await {
                Ok(()) => {
                    info!(attempt, "chat transport connected");
                    return Ok(true);
                }
                Err(error) => {
                    warn!(attempt, max_attempts, error = %error, "chat transport connect failed");
                    last_error = error;
                }
            }

            if attempt < max_attempts {
                let delay = self.settings.connect_policy.delay_after(attempt);
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(false),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(SocketError::ConnectExhausted { attempts: max_attempts, last_error })
    }

    async fn pump(
        &self,
        shutdown: &CancellationToken,
        in_flight: &mut JoinSet<()>,
    ) -> Result<(), SocketError> {
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested; no longer reading chat events");
                    return Ok(());
                }
                next = self.transport.next_event() => next?,
            };

            // Reap finished handlers so the set does not grow unbounded.
            while in_flight.try_join_next().is_some() {}

            let Some(envelope) = next else {
                info!("chat event stream closed by server");
                return Ok(());
            };

            match envelope.event {
                ChatEvent::Posted(message) => self.spawn_handler(message, envelope.seq, in_flight),
                ChatEvent::Hello { server_version } => {
                    info!(
                        server_version = server_version.as_deref().unwrap_or("unknown"),
                        "chat server said hello"
                    );
                }
                ChatEvent::Reply { seq_reply, status } => {
                    debug!(seq_reply, status = %status, "chat server replied");
                }
                ChatEvent::Unsupported { event_type } => {
                    debug!(event_type = %event_type, "ignoring chat event");
                }
            }
        }
    }

    fn spawn_handler(
        &self,
        message: PostedMessage,
        seq: Option<i64>,
        in_flight: &mut JoinSet<()>,
    ) {
        if message.user_id == self.settings.bot_user_id {
            debug!(post_id = %message.post_id, "ignoring own post");
            return;
        }

        info!(
            event_name = "ingress.chat.post_received",
            correlation_id = %message.post_id,
            channel_id = %message.channel_id,
            seq = seq.unwrap_or_default(),
            "received chat post"
        );

        let handler = Arc::clone(&self.handler);
        let poster = Arc::clone(&self.poster);
        let ctx = RequestContext::new(message.post_id.clone())
            .with_timeout(self.settings.request_timeout);

        in_flight.spawn(async move {
            let reply = match handler.handle(&message, &ctx).await {
                HandlerResult::Ignored => return,
                HandlerResult::Responded(reply) => reply,
            };

            if reply.trim().is_empty() {
                warn!(
                    event_name = "egress.chat.empty_reply",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %message.channel_id,
                    "handler produced an empty reply; nothing sent"
                );
                return;
            }

            match poster.post_message(&message.channel_id, &reply).await {
                Ok(()) => debug!(
                    event_name = "egress.chat.reply_sent",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %message.channel_id,
                    "reply posted"
                ),
                Err(error) => warn!(
                    event_name = "egress.chat.reply_failed",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %message.channel_id,
                    error = %error,
                    "failed to post reply"
                ),
            }
        });
    }
}
