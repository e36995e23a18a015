use super::traits::{Channel, DeliveryMode, IncomingMessage, OutgoingMessage};
use crate::util::truncate_chars;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Discord's maximum message length for regular messages
const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;

/// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
const GATEWAY_INTENTS: u64 = 37377;

/// Discord clears the typing indicator after ~10s.
const TYPING_REFRESH: Duration = Duration::from_secs(8);

/// Refresh task for one channel's typing indicator, shared by every reply
/// currently being composed there.
struct TypingIndicator {
    holders: usize,
    task: JoinHandle<()>,
}

/// Discord channel: gateway WebSocket for events, REST for sends
pub struct DiscordChannel {
    bot_token: String,
    guild_id: Option<String>,
    admin_users: Vec<String>,
    listen_to_bots: bool,
    activity: Option<String>,
    api_base: String,
    client: reqwest::Client,
    /// Learned from the READY event.
    bot_user_id: RwLock<Option<String>>,
    typing_handles: Mutex<HashMap<String, TypingIndicator>>,
    latency: Mutex<Option<Duration>>,
}

impl DiscordChannel {
    pub fn new(
        bot_token: String,
        guild_id: Option<String>,
        admin_users: Vec<String>,
        listen_to_bots: bool,
    ) -> Self {
        Self {
            bot_token,
            guild_id,
            admin_users,
            listen_to_bots,
            activity: None,
            api_base: DISCORD_API_BASE.to_string(),
            client: reqwest::Client::new(),
            bot_user_id: RwLock::new(None),
            typing_handles: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
        }
    }

    /// "Listening to ..." presence shown after identify.
    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }

    /// Point REST calls somewhere else (tests, proxies).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn bot_user_id(&self) -> Option<String> {
        self.bot_user_id.read().clone()
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.admin_users.iter().any(|u| u == user_id)
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    fn identify_payload(&self) -> Value {
        let mut d = json!({
            "token": self.bot_token,
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "quipbot",
                "device": "quipbot"
            }
        });
        if let Some(activity) = &self.activity {
            d["presence"] = json!({
                "since": null,
                "activities": [{ "name": activity, "type": 2 }],
                "status": "online",
                "afk": false
            });
        }
        json!({ "op": 2, "d": d })
    }

    /// Remember who we are; returns the username for the banner.
    fn handle_ready(&self, d: &Value) -> Option<String> {
        let user = d.get("user")?;
        let id = user.get("id").and_then(Value::as_str)?;
        *self.bot_user_id.write() = Some(id.to_string());
        Some(
            user.get("username")
                .and_then(Value::as_str)
                .unwrap_or(id)
                .to_string(),
        )
    }

    /// Reduce a MESSAGE_CREATE payload to an [`IncomingMessage`], or drop it.
    ///
    /// Dropped: our own messages, other bots (unless `listen_to_bots`),
    /// messages from a foreign guild, and empty content.
    fn parse_message_create(&self, d: &Value) -> Option<IncomingMessage> {
        let bot_id = self.bot_user_id();
        let author = d.get("author")?;
        let author_id = author.get("id").and_then(Value::as_str)?;
        if bot_id.as_deref() == Some(author_id) {
            return None;
        }
        let author_is_bot = author.get("bot").and_then(Value::as_bool).unwrap_or(false);
        if author_is_bot && !self.listen_to_bots {
            return None;
        }

        if let Some(gid) = &self.guild_id {
            // DMs have no guild_id and are let through
            if let Some(g) = d.get("guild_id").and_then(Value::as_str) {
                if g != gid {
                    return None;
                }
            }
        }

        let raw = d.get("content").and_then(Value::as_str).unwrap_or("");
        if raw.trim().is_empty() {
            return None;
        }

        let (mentions_bot, content) = match bot_id.as_deref() {
            Some(id) => {
                let listed = d
                    .get("mentions")
                    .and_then(Value::as_array)
                    .is_some_and(|m| {
                        m.iter()
                            .any(|u| u.get("id").and_then(Value::as_str) == Some(id))
                    });
                let (inline, stripped) = strip_mention(raw, id);
                (listed || inline, stripped)
            }
            None => (false, raw.trim().to_string()),
        };

        Some(IncomingMessage {
            message_id: d
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            author_id: author_id.to_string(),
            channel_id: d
                .get("channel_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            content,
            mentions_bot,
            author_is_admin: self.is_admin(author_id),
            timestamp: chrono::Local::now().fixed_offset(),
        })
    }
}

/// Remove `<@id>` / `<@!id>` from `content`. Returns whether one was present.
/// A message that is nothing but the mention keeps its raw text.
fn strip_mention(content: &str, bot_id: &str) -> (bool, String) {
    let plain = format!("<@{bot_id}>");
    let nick = format!("<@!{bot_id}>");
    if !content.contains(&plain) && !content.contains(&nick) {
        return (false, content.trim().to_string());
    }
    let stripped = content.replace(&nick, "").replace(&plain, "");
    let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if stripped.is_empty() {
        (true, content.trim().to_string())
    } else {
        (true, stripped)
    }
}

/// Split a message into chunks that respect Discord's character limit,
/// preferring a newline or space in the second half of each chunk.
fn split_message_for_discord(message: &str) -> Vec<String> {
    if message.chars().count() <= DISCORD_MAX_MESSAGE_LENGTH {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        let window = truncate_chars(remaining, DISCORD_MAX_MESSAGE_LENGTH);
        let chunk_end = if window.len() == remaining.len() {
            remaining.len()
        } else {
            let half = window.len() / 2;
            match window.rfind('\n').or_else(|| window.rfind(' ')) {
                Some(pos) if pos >= half => pos + 1,
                _ => window.len(),
            }
        };

        chunks.push(remaining[..chunk_end].to_string());
        remaining = &remaining[chunk_end..];
    }

    chunks
}

/// JSON body for one chunk. Only the first chunk carries the reply reference.
fn message_body(chunk: &str, mode: &DeliveryMode, first: bool) -> Value {
    match mode {
        DeliveryMode::Reply { message_id } if first && !message_id.is_empty() => json!({
            "content": chunk,
            "message_reference": {
                "message_id": message_id,
                "fail_if_not_exists": false
            },
            "allowed_mentions": { "parse": [], "replied_user": false }
        }),
        _ => json!({
            "content": chunk,
            "allowed_mentions": { "parse": [] }
        }),
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
        let chunks = split_message_for_discord(&message.text);
        let url = format!("{}/channels/{}/messages", self.api_base, message.channel_id);

        for (i, chunk) in chunks.iter().enumerate() {
            let resp = self
                .client
                .post(&url)
                .header("Authorization", self.auth_header())
                .json(&message_body(chunk, &message.mode, i == 0))
                .send()
                .await?;

            if !resp.status().is_success() {
                return Err(crate::providers::api_error("Discord", resp).await);
            }

            // Add a small delay between chunks to avoid rate limiting
            if i < chunks.len() - 1 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    async fn listen(&self, tx: tokio::sync::mpsc::Sender<IncomingMessage>) -> anyhow::Result<()> {
        let gw_resp = self
            .client
            .get(format!("{}/gateway/bot", self.api_base))
            .header("Authorization", self.auth_header())
            .send()
            .await?;
        if !gw_resp.status().is_success() {
            return Err(crate::providers::api_error("Discord gateway", gw_resp).await);
        }
        let gw_resp: Value = gw_resp.json().await?;

        let gw_url = gw_resp
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or("wss://gateway.discord.gg");

        let ws_url = format!("{gw_url}/?v=10&encoding=json");
        tracing::info!("Discord: connecting to gateway...");

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url).await?;
        let (mut write, mut read) = ws_stream.split();

        // Read Hello (opcode 10)
        let hello = read.next().await.ok_or(anyhow::anyhow!("No hello"))??;
        let hello_data: Value = serde_json::from_str(&hello.to_string())?;
        let heartbeat_interval = hello_data
            .get("d")
            .and_then(|d| d.get("heartbeat_interval"))
            .and_then(Value::as_u64)
            .unwrap_or(41250);

        write
            .send(Message::Text(self.identify_payload().to_string().into()))
            .await?;
        tracing::info!("Discord: identified, waiting for READY");

        // Only touched inside the select! loop below.
        let mut sequence: i64 = -1;
        let mut last_heartbeat: Option<Instant> = None;

        let (hb_tx, mut hb_rx) = tokio::sync::mpsc::channel::<()>(1);
        let heartbeat = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(heartbeat_interval));
            loop {
                interval.tick().await;
                if hb_tx.send(()).await.is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                _ = hb_rx.recv() => {
                    let d = if sequence >= 0 { json!(sequence) } else { json!(null) };
                    let hb = json!({"op": 1, "d": d});
                    if write.send(Message::Text(hb.to_string().into())).await.is_err() {
                        break;
                    }
                    last_heartbeat = Some(Instant::now());
                }
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(Message::Text(t))) => t,
                        Some(Ok(Message::Close(frame))) => {
                            tracing::warn!(?frame, "Discord: gateway closed the connection");
                            break;
                        }
                        None => break,
                        _ => continue,
                    };

                    let Ok(event) = serde_json::from_str::<Value>(&msg) else {
                        continue;
                    };

                    if let Some(s) = event.get("s").and_then(Value::as_i64) {
                        sequence = s;
                    }

                    match event.get("op").and_then(Value::as_u64).unwrap_or(0) {
                        // Server requests an immediate heartbeat
                        1 => {
                            let d = if sequence >= 0 { json!(sequence) } else { json!(null) };
                            let hb = json!({"op": 1, "d": d});
                            if write.send(Message::Text(hb.to_string().into())).await.is_err() {
                                break;
                            }
                            last_heartbeat = Some(Instant::now());
                            continue;
                        }
                        7 => {
                            tracing::warn!("Discord: received Reconnect (op 7), closing for restart");
                            break;
                        }
                        9 => {
                            tracing::warn!("Discord: received Invalid Session (op 9), closing for restart");
                            break;
                        }
                        // Heartbeat ACK
                        11 => {
                            if let Some(sent) = last_heartbeat.take() {
                                *self.latency.lock() = Some(sent.elapsed());
                            }
                            continue;
                        }
                        _ => {}
                    }

                    let Some(d) = event.get("d") else {
                        continue;
                    };

                    match event.get("t").and_then(Value::as_str).unwrap_or("") {
                        "READY" => {
                            if let Some(username) = self.handle_ready(d) {
                                tracing::info!(user = %username, "✅ Discord: online");
                            }
                        }
                        "MESSAGE_CREATE" => {
                            let Some(incoming) = self.parse_message_create(d) else {
                                continue;
                            };
                            if tx.send(incoming).await.is_err() {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        heartbeat.abort();
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/users/@me", self.api_base))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn start_typing(&self, channel_id: &str) -> anyhow::Result<()> {
        let mut handles = self.typing_handles.lock();
        if let Some(active) = handles.get_mut(channel_id) {
            active.holders += 1;
            return Ok(());
        }

        let client = self.client.clone();
        let auth = self.auth_header();
        let url = format!("{}/channels/{channel_id}/typing", self.api_base);

        let task = tokio::spawn(async move {
            loop {
                if let Err(e) = client.post(&url).header("Authorization", &auth).send().await {
                    tracing::debug!("Discord: typing indicator failed: {e}");
                }
                tokio::time::sleep(TYPING_REFRESH).await;
            }
        });

        handles.insert(channel_id.to_string(), TypingIndicator { holders: 1, task });
        Ok(())
    }

    async fn stop_typing(&self, channel_id: &str) -> anyhow::Result<()> {
        let mut handles = self.typing_handles.lock();
        if let Entry::Occupied(mut entry) = handles.entry(channel_id.to_string()) {
            let active = entry.get_mut();
            active.holders = active.holders.saturating_sub(1);
            if active.holders == 0 {
                entry.remove().task.abort();
            }
        }
        Ok(())
    }

    fn latency(&self) -> Option<Duration> {
        *self.latency.lock()
    }
}
