//! Discord integration
//!
//! [`DiscordClient`] implements [`ChatTransport`] over the REST API.
//! [`GatewayListener`] keeps a gateway websocket open and publishes incoming
//! messages on the [`MessageBus`], reconnecting after a delay whenever the
//! session ends.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::{Client, RequestBuilder, Url};
use sdk::errors::EngineError;
use sdk::transport::ChatTransport;
use sdk::types::{ChannelId, ChatEvent, MessageId, Participant, ParticipantId, PostedMessage};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::config::DiscordConfig;
use crate::message_bus::MessageBus;
use crate::secrets::{SecretManager, SecretString};

/// GUILDS | GUILD_MESSAGES | GUILD_MESSAGE_REACTIONS | MESSAGE_CONTENT
pub const GATEWAY_INTENTS: u64 = 1 | (1 << 9) | (1 << 10) | (1 << 15);

/// Page size for the reaction users endpoint
const REACTION_PAGE_LIMIT: usize = 100;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

#[derive(Deserialize, Debug)]
struct ApiUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

impl From<ApiUser> for Participant {
    fn from(user: ApiUser) -> Self {
        let name = user
            .global_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(user.username);
        let participant = Participant::new(user.id, name);
        if user.bot {
            participant.bot()
        } else {
            participant
        }
    }
}

#[derive(Deserialize, Debug)]
struct ApiMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    content: String,
}

impl From<ApiMessage> for PostedMessage {
    fn from(message: ApiMessage) -> Self {
        Self {
            id: MessageId::new(message.id),
            channel_id: ChannelId::new(message.channel_id),
            content: message.content,
        }
    }
}

/// REST client for the Discord API
pub struct DiscordClient {
    api_base: String,
    token: SecretString,
    client: Client,
    secret_manager: SecretManager,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl DiscordClient {
    pub fn new(api_base: impl Into<String>, token: SecretString) -> Self {
        Self {
            api_base: api_base.into(),
            token,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            secret_manager: SecretManager::default(),
        }
    }

    pub fn from_config(config: &DiscordConfig, token: SecretString) -> Self {
        Self::new(config.api_base_url.clone(), token)
    }

    /// Build an endpoint URL; each segment is percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, EngineError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            EngineError::Config(format!("Invalid Discord API base URL '{}': {}", self.api_base, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                EngineError::Config(format!(
                    "Discord API base URL cannot take a path: {}",
                    self.api_base
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", self.token.bot_authorization())
    }

    /// Send a request and fail on a non-success status
    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, EngineError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| EngineError::Network(self.secret_manager.scrub(&e.to_string())))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::transport(status, self.secret_manager.scrub(&body)));
        }

        Ok(response)
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, EngineError> {
        self.execute(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| EngineError::Decode(e.to_string()))
    }

    /// The bot's own account
    pub async fn current_user(&self) -> Result<Participant, EngineError> {
        let url = self.endpoint(&["users", "@me"])?;
        let user: ApiUser = self.execute_json(self.client.get(url)).await?;
        Ok(user.into())
    }
}

#[async_trait]
impl ChatTransport for DiscordClient {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send_message(
        &self,
        channel: &ChannelId,
        text: &str,
    ) -> Result<PostedMessage, EngineError> {
        let url = self.endpoint(&["channels", channel.as_str(), "messages"])?;
        let body = json!({
            "content": text,
            "allowed_mentions": { "parse": ["everyone", "users"] },
        });
        let message: ApiMessage = self.execute_json(self.client.post(url).json(&body)).await?;
        debug!(channel = %channel, message_id = %message.id, "Message sent");
        Ok(message.into())
    }

    async fn add_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<(), EngineError> {
        let url = self.endpoint(&[
            "channels",
            channel.as_str(),
            "messages",
            message.as_str(),
            "reactions",
            emoji,
            "@me",
        ])?;
        self.execute(self.client.put(url).header("Content-Length", "0"))
            .await?;
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<PostedMessage, EngineError> {
        let url = self.endpoint(&["channels", channel.as_str(), "messages", message.as_str()])?;
        let message: ApiMessage = self.execute_json(self.client.get(url)).await?;
        Ok(message.into())
    }

    async fn fetch_reaction_users(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<Vec<Participant>, EngineError> {
        let url = self.endpoint(&[
            "channels",
            channel.as_str(),
            "messages",
            message.as_str(),
            "reactions",
            emoji,
        ])?;

        let mut users = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut query = vec![("limit", REACTION_PAGE_LIMIT.to_string())];
            if let Some(ref last) = after {
                query.push(("after", last.clone()));
            }

            let page: Vec<ApiUser> = self
                .execute_json(self.client.get(url.clone()).query(&query))
                .await?;
            let full_page = page.len() >= REACTION_PAGE_LIMIT;
            after = page.last().map(|u| u.id.clone());
            users.extend(page.into_iter().map(Participant::from));

            if !full_page || after.is_none() {
                break;
            }
        }

        debug!(count = users.len(), "Fetched reaction users");
        Ok(users)
    }

    async fn fetch_user(&self, id: &ParticipantId) -> Result<Participant, EngineError> {
        let url = self.endpoint(&["users", id.as_str()])?;
        let user: ApiUser = self.execute_json(self.client.get(url)).await?;
        Ok(user.into())
    }
}

/// A frame received on the gateway
#[derive(Deserialize, Debug)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Turn a dispatch event into a chat event, if it is one we care about
pub fn parse_dispatch(event_name: &str, data: &Value) -> Option<ChatEvent> {
    match event_name {
        "READY" => Some(ChatEvent::Connected),
        "MESSAGE_CREATE" => {
            let channel_id = data.get("channel_id").and_then(Value::as_str)?;
            let author: ApiUser = serde_json::from_value(data.get("author")?.clone()).ok()?;
            let content = data
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default();

            if channel_id.is_empty() || author.id.is_empty() {
                return None;
            }

            Some(ChatEvent::MessageCreated {
                channel_id: ChannelId::new(channel_id),
                author: author.into(),
                content: content.to_string(),
            })
        }
        _ => None,
    }
}

/// Detects a session that stopped acknowledging heartbeats
#[derive(Debug, Default)]
struct HeartbeatMonitor {
    awaiting_ack: bool,
}

impl HeartbeatMonitor {
    /// Call on each heartbeat tick, before sending
    fn beat(&mut self) -> Result<(), EngineError> {
        if self.awaiting_ack {
            return Err(EngineError::Gateway(
                "heartbeat not acknowledged, session is stale".to_string(),
            ));
        }
        self.awaiting_ack = true;
        Ok(())
    }

    fn ack(&mut self) {
        self.awaiting_ack = false;
    }
}

fn heartbeat(sequence: Option<u64>) -> WsMessage {
    WsMessage::Text(json!({ "op": OP_HEARTBEAT, "d": sequence }).to_string())
}

/// Keeps a gateway session open and feeds the message bus
pub struct GatewayListener {
    gateway_url: String,
    token: SecretString,
    bus: Arc<MessageBus>,
    reconnect_delay: Duration,
}

impl GatewayListener {
    pub fn new(config: &DiscordConfig, token: SecretString, bus: Arc<MessageBus>) -> Self {
        Self {
            gateway_url: config.gateway_url.clone(),
            token,
            bus,
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
        }
    }

    /// Run sessions forever, reconnecting after each one ends
    pub async fn run(self) {
        info!("Starting Discord gateway listener...");

        loop {
            let reason = match self.session().await {
                Ok(()) => "session closed".to_string(),
                Err(e) => e.to_string(),
            };
            warn!(
                "Gateway disconnected ({}), reconnecting in {:?}",
                reason, self.reconnect_delay
            );
            self.bus.publish(ChatEvent::Disconnected { reason }).await;
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn session(&self) -> Result<(), EngineError> {
        let (stream, _) = tokio_tungstenite::connect_async(self.gateway_url.as_str())
            .await
            .map_err(|e| EngineError::Gateway(format!("connect failed: {}", e)))?;
        let (mut write, mut read) = stream.split();

        let hello = match read.next().await {
            Some(Ok(WsMessage::Text(text))) => serde_json::from_str::<GatewayPayload>(&text)
                .map_err(|e| EngineError::Gateway(format!("bad hello: {}", e)))?,
            Some(Ok(other)) => {
                return Err(EngineError::Gateway(format!(
                    "unexpected hello frame: {:?}",
                    other
                )))
            }
            Some(Err(e)) => return Err(EngineError::Gateway(e.to_string())),
            None => return Err(EngineError::Gateway("closed before hello".to_string())),
        };
        if hello.op != OP_HELLO {
            return Err(EngineError::Gateway(format!(
                "expected hello, got op {}",
                hello.op
            )));
        }
        let interval_ms = hello
            .d
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .unwrap_or(41_250);

        let identify = json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.token.unsecure(),
                "intents": GATEWAY_INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "middag",
                    "device": "middag"
                }
            }
        });
        write
            .send(WsMessage::Text(identify.to_string()))
            .await
            .map_err(|e| EngineError::Gateway(format!("identify failed: {}", e)))?;

        let period = Duration::from_millis(interval_ms);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let mut sequence: Option<u64> = None;
        let mut monitor = HeartbeatMonitor::default();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    monitor.beat()?;
                    write
                        .send(heartbeat(sequence))
                        .await
                        .map_err(|e| EngineError::Gateway(format!("heartbeat failed: {}", e)))?;
                }
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(WsMessage::Text(text))) => text,
                        Some(Ok(WsMessage::Close(frame))) => {
                            return Err(EngineError::Gateway(format!("closed by server: {:?}", frame)));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(EngineError::Gateway(e.to_string())),
                        None => return Ok(()),
                    };

                    let payload: GatewayPayload = match serde_json::from_str(&text) {
                        Ok(payload) => payload,
                        Err(e) => {
                            debug!("Skipping undecodable gateway frame: {}", e);
                            continue;
                        }
                    };

                    if payload.s.is_some() {
                        sequence = payload.s;
                    }

                    match payload.op {
                        OP_DISPATCH => {
                            let name = payload.t.as_deref().unwrap_or_default();
                            if let Some(event) = parse_dispatch(name, &payload.d) {
                                if event == ChatEvent::Connected {
                                    info!("Gateway session ready");
                                }
                                self.bus.publish(event).await;
                            }
                        }
                        OP_HEARTBEAT => {
                            write
                                .send(heartbeat(sequence))
                                .await
                                .map_err(|e| EngineError::Gateway(format!("heartbeat failed: {}", e)))?;
                        }
                        OP_HEARTBEAT_ACK => {
                            monitor.ack();
                            debug!("Heartbeat acknowledged");
                        }
                        OP_RECONNECT => {
                            return Err(EngineError::Gateway("server requested reconnect".to_string()));
                        }
                        OP_INVALID_SESSION => {
                            return Err(EngineError::Gateway("invalid session".to_string()));
                        }
                        op => debug!(op, "Ignoring gateway opcode"),
                    }
                }
            }
        }
    }
}
