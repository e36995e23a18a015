use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::time::Duration;

/// A message received from a channel, already reduced to what the gate needs.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub message_id: String,
    pub author_id: String,
    pub channel_id: String,
    pub content: String,
    /// The bot was addressed directly (mention or `<@id>` in content).
    pub mentions_bot: bool,
    /// Author is allowed to run admin commands.
    pub author_is_admin: bool,
    /// When the message was received, in the host's local offset.
    ///
    /// Differences between two timestamps are real elapsed time even across
    /// a DST change; `hour()` is the local wall-clock hour.
    pub timestamp: DateTime<FixedOffset>,
}

/// How an outgoing message is attached to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Reply to the given message without pinging its author.
    Reply { message_id: String },
    /// Plain post to the channel.
    Channel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub channel_id: String,
    pub text: String,
    pub mode: DeliveryMode,
}

impl OutgoingMessage {
    pub fn to_channel(channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            text: text.into(),
            mode: DeliveryMode::Channel,
        }
    }

    pub fn reply_to(message: &IncomingMessage, text: impl Into<String>) -> Self {
        Self {
            channel_id: message.channel_id.clone(),
            text: text.into(),
            mode: DeliveryMode::Reply {
                message_id: message.message_id.clone(),
            },
        }
    }
}

/// A chat platform the bot can listen on and post to.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name
    fn name(&self) -> &str;

    /// Deliver one message; the core never retries a failed send.
    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()>;

    /// Start listening for incoming messages (long-running)
    async fn listen(&self, tx: tokio::sync::mpsc::Sender<IncomingMessage>) -> anyhow::Result<()>;

    /// Check if channel is healthy
    async fn health_check(&self) -> bool {
        true
    }

    /// Show a "typing" indicator in `channel_id` until `stop_typing`.
    /// Calls may overlap; each start is paired with exactly one stop.
    async fn start_typing(&self, _channel_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop_typing(&self, _channel_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Most recent round-trip to the platform, if the channel measures one.
    fn latency(&self) -> Option<Duration> {
        None
    }
}
