//! Mattermost wiring: REST calls for identity and replies, and the
//! websocket event stream.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use pollbot_core::config::MattermostConfig;

use crate::events::{decode_frame, ChatEnvelope};
use crate::socket::{ChatTransport, MessagePoster, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const AUTH_CHALLENGE_SEQ: i64 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BotIdentity {
    pub id: String,
    pub username: String,
}

#[derive(Serialize)]
struct CreatePost<'a> {
    channel_id: &'a str,
    message: &'a str,
}

/// REST side of the Mattermost API.
#[derive(Clone)]
pub struct MattermostClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl MattermostClient {
    pub fn new(
        base_url: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        Ok(Self { http, base_url: base_url.into(), token })
    }

    pub fn from_config(config: &MattermostConfig) -> Result<Self, TransportError> {
        Self::new(
            config.http_url(),
            config.bot_token.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v4/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Resolves the account behind the bot token; its id is used to skip
    /// the bot's own posts.
    pub async fn current_user(&self) -> Result<BotIdentity, TransportError> {
        let response = self
            .http
            .get(self.endpoint("users/me"))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?
            .error_for_status()
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        response
            .json::<BotIdentity>()
            .await
            .map_err(|error| TransportError::Receive(error.to_string()))
    }
}

#[async_trait]
impl MessagePoster for MattermostClient {
    async fn post_message(&self, channel_id: &str, message: &str) -> Result<(), TransportError> {
        self.http
            .post(self.endpoint("posts"))
            .bearer_auth(self.token.expose_secret())
            .json(&CreatePost { channel_id, message })
            .send()
            .await
            .map_err(|error| TransportError::Send(error.to_string()))?
            .error_for_status()
            .map_err(|error| TransportError::Send(error.to_string()))?;
        Ok(())
    }
}

/// Websocket event stream. The read and write halves are locked separately
/// so that closing never waits on a pending read.
pub struct MattermostWebSocket {
    url: String,
    token: SecretString,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    reader: Mutex<Option<SplitStream<WsStream>>>,
}

impl MattermostWebSocket {
    pub fn new(url: impl Into<String>, token: SecretString) -> Self {
        Self {
            url: url.into(),
            token,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    pub fn from_config(config: &MattermostConfig) -> Self {
        Self::new(config.websocket_url(), config.bot_token.clone())
    }
}

pub(crate) fn authentication_challenge(token: &str) -> String {
    json!({
        "seq": AUTH_CHALLENGE_SEQ,
        "action": "authentication_challenge",
        "data": { "token": token },
    })
    .to_string()
}

#[async_trait]
impl ChatTransport for MattermostWebSocket {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token.expose_secret()))
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (mut writer, reader) = stream.split();

        writer
            .send(Message::Text(authentication_challenge(self.token.expose_secret()).into()))
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        info!(url = %self.url, "websocket connected; authentication challenge sent");
        *self.writer.lock().await = Some(writer);
        *self.reader.lock().await = Some(reader);
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return Err(TransportError::Receive("websocket is not connected".to_owned()));
        };

        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => match decode_frame(text.as_str()) {
                    Ok(envelope) => return Ok(Some(envelope)),
                    Err(error) => {
                        warn!(error = %error, "skipping undecodable websocket frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "websocket closed by server");
                    *guard = None;
                    return Ok(None);
                }
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    *guard = None;
                    return Err(TransportError::Receive(error.to_string()));
                }
                None => {
                    *guard = None;
                    return Ok(None);
                }
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let writer = self.writer.lock().await.take();
        self.reader.lock().await.take();

        if let Some(mut writer) = writer {
            writer
                .send(Message::Close(None))
                .await
                .map_err(|error| TransportError::Disconnect(error.to_string()))?;
        }
        Ok(())
    }
}
