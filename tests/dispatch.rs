//! Dispatch Loop Tests
//!
//! Drives the bot runtime end-to-end with an in-memory channel: commands,
//! mentions, cooldowns and delivery modes, with no network involved.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone};
use parking_lot::Mutex;
use quipbot::channels::{
    run_message_dispatch_loop, BotRuntime, Channel, DeliveryMode, IncomingMessage,
    OutgoingMessage,
};
use quipbot::gate::{ChannelPolicy, CooldownStore};
use quipbot::persona::PersonalityProfile;
use quipbot::providers::{FnProvider, GenerationParams, ProviderChain};
use quipbot::responder::Responder;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct MemoryChannel {
    sent: Mutex<Vec<OutgoingMessage>>,
    fail_sends: bool,
}

#[async_trait]
impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
        if self.fail_sends {
            anyhow::bail!("network unreachable");
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }

    async fn listen(&self, _tx: tokio::sync::mpsc::Sender<IncomingMessage>) -> anyhow::Result<()> {
        Ok(())
    }
}

fn base_time() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 9, 9, 14, 0, 0)
        .unwrap()
}

fn incoming(
    id: &str,
    author: &str,
    content: &str,
    mentions_bot: bool,
    offset_secs: i64,
) -> IncomingMessage {
    IncomingMessage {
        message_id: id.into(),
        author_id: author.into(),
        channel_id: "general".into(),
        content: content.into(),
        mentions_bot,
        author_is_admin: author == "admin",
        timestamp: base_time() + TimeDelta::seconds(offset_secs),
    }
}

fn bot(channel: Arc<MemoryChannel>, reply_directly: bool) -> Arc<BotRuntime> {
    let mut profile = PersonalityProfile::default();
    profile.response_style.add_typing_delay = false;
    profile.response_style.reply_directly = reply_directly;
    profile.response_style.emoji_chance = Some(0.0);

    let chain = ProviderChain::new(
        vec![Box::new(FnProvider::new(
            "echo",
            |_prompt: String, _params: GenerationParams| async {
                Ok::<_, anyhow::Error>("generated answer".to_string())
            },
        ))],
        Duration::from_secs(1),
    );

    // Silent by default: only mentions, triggers and commands get answers.
    let policy = ChannelPolicy {
        global_chance: 0,
        ..ChannelPolicy::default()
    };

    Arc::new(BotRuntime::new(
        channel,
        profile,
        policy,
        CooldownStore::new(TimeDelta::seconds(30), 100),
        Responder::new(chain),
    ))
}

async fn drive(runtime: Arc<BotRuntime>, messages: Vec<IncomingMessage>) {
    let (tx, rx) = tokio::sync::mpsc::channel(16);
    for message in messages {
        tx.send(message).await.unwrap();
    }
    drop(tx);
    run_message_dispatch_loop(rx, runtime, 3).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Gating through the loop
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn mention_is_answered_as_a_reply() {
    let channel = Arc::new(MemoryChannel::default());
    drive(
        bot(Arc::clone(&channel), true),
        vec![incoming("m1", "u1", "what do you think?", true, 0)],
    )
    .await;

    let sent = channel.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "generated answer");
    assert_eq!(
        sent[0].mode,
        DeliveryMode::Reply {
            message_id: "m1".into()
        }
    );
}

#[tokio::test]
async fn plain_chatter_in_silent_channel_is_ignored() {
    let channel = Arc::new(MemoryChannel::default());
    let runtime = bot(Arc::clone(&channel), true);
    drive(
        Arc::clone(&runtime),
        vec![
            incoming("m1", "u1", "just talking amongst ourselves here", false, 0),
            incoming("m2", "u2", "indeed we are, quite a lot of talking", false, 1),
        ],
    )
    .await;

    assert!(channel.sent.lock().is_empty());
    assert!(runtime.cooldowns().is_empty());
}

#[tokio::test]
async fn trigger_then_cooldown_then_expiry() {
    let channel = Arc::new(MemoryChannel::default());
    drive(
        bot(Arc::clone(&channel), false),
        vec![
            incoming("m1", "u1", "hello friends", false, 0),
            incoming("m2", "u1", "hello again", false, 10),
            incoming("m3", "u1", "hello once more", false, 45),
        ],
    )
    .await;

    let sent = channel.sent.lock();
    assert_eq!(sent.len(), 2, "{sent:?}");
    assert!(sent.iter().all(|m| m.mode == DeliveryMode::Channel));
}

#[tokio::test]
async fn mentions_bypass_cooldown() {
    let channel = Arc::new(MemoryChannel::default());
    drive(
        bot(Arc::clone(&channel), true),
        vec![
            incoming("m1", "u1", "hello", false, 0),
            incoming("m2", "u1", "answer me", true, 5),
        ],
    )
    .await;

    assert_eq!(channel.sent.lock().len(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands through the loop
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn admin_command_changes_later_decisions() {
    let channel = Arc::new(MemoryChannel::default());
    let runtime = bot(Arc::clone(&channel), true);
    let chatter = "a long enough message to max out the content factor ".repeat(3);
    drive(
        Arc::clone(&runtime),
        vec![
            incoming("m1", "u1", "!setresponse 100", false, 0),
            incoming("m2", "admin", "!setresponse 100", false, 1),
            incoming("m3", "u2", &chatter, false, 2),
        ],
    )
    .await;

    let sent = channel.sent.lock();
    let texts: Vec<&str> = sent.iter().map(|m| m.text.as_str()).collect();
    assert!(texts.contains(&"❌ Only bot admins can change the response chance."));
    assert!(texts.contains(&"✅ Response chance set to 100% in this channel!"));
    assert!(texts.contains(&"generated answer"), "{texts:?}");
    assert_eq!(
        runtime.policy().read().get_channel_response_chance("general"),
        100
    );
}

#[tokio::test]
async fn send_failures_do_not_stop_the_loop() {
    let channel = Arc::new(MemoryChannel {
        fail_sends: true,
        ..MemoryChannel::default()
    });
    let runtime = bot(Arc::clone(&channel), true);
    drive(
        Arc::clone(&runtime),
        vec![
            incoming("m1", "u1", "hi there", true, 0),
            incoming("m2", "u2", "hi there", true, 0),
        ],
    )
    .await;

    assert!(channel.sent.lock().is_empty());
    assert_eq!(runtime.cooldowns().len(), 2);
}
