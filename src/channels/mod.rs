//! Channel subsystem: the chat platform adapter and the bot runtime on top of it.
//!
//! A supervised listener feeds [`IncomingMessage`]s into a single dispatch
//! loop. The loop handles commands, asks the [`ResponseGate`] whether to speak
//! and records the author's cooldown, all serially, so two messages from one
//! author can never both slip past the cooldown. Admitted messages are then
//! answered by a bounded pool of workers (typing delay, [`Responder`], send).

pub mod commands;
pub mod discord;
pub mod traits;

pub use discord::DiscordChannel;
pub use traits::{Channel, DeliveryMode, IncomingMessage, OutgoingMessage};

use crate::config::{build_http_client, Config};
use crate::gate::{ChannelPolicy, CooldownStore, GateDecision, ResponseGate};
use crate::persona::PersonalityProfile;
use crate::providers::create_provider_chain;
use crate::responder::Responder;
use anyhow::Result;
use chrono::{DateTime, FixedOffset, TimeDelta};
use commands::{execute_command, parse_command, CommandContext};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CHANNEL_INITIAL_BACKOFF_SECS: u64 = 2;
const DEFAULT_CHANNEL_MAX_BACKOFF_SECS: u64 = 60;
const CHANNEL_QUEUE_CAPACITY: usize = 100;
const DISCORD_HTTP_TIMEOUT_SECS: u64 = 30;
const DISCORD_CONNECT_TIMEOUT_SECS: u64 = 10;

/// What the dispatch loop decided to do with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Job {
    /// Post a command's output to the channel.
    CommandReply(String),
    /// Generate and send a reply.
    Respond,
}

/// Shared state for the dispatch loop and its workers.
pub struct BotRuntime {
    channel: Arc<dyn Channel>,
    profile: PersonalityProfile,
    policy: RwLock<ChannelPolicy>,
    cooldowns: CooldownStore,
    responder: Responder,
    command_prefix: String,
}

impl BotRuntime {
    pub fn new(
        channel: Arc<dyn Channel>,
        profile: PersonalityProfile,
        policy: ChannelPolicy,
        cooldowns: CooldownStore,
        responder: Responder,
    ) -> Self {
        Self {
            channel,
            profile,
            policy: RwLock::new(policy),
            cooldowns,
            responder,
            command_prefix: "!".to_string(),
        }
    }

    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    pub fn from_config(config: &Config, channel: Arc<dyn Channel>) -> Self {
        let cooldown_secs = i64::try_from(config.response.cooldown_secs).unwrap_or(i64::MAX);
        let cooldowns = CooldownStore::new(
            TimeDelta::try_seconds(cooldown_secs).unwrap_or(TimeDelta::MAX),
            config.response.cooldown_capacity,
        );
        let responder = Responder::new(create_provider_chain(config))
            .with_max_tokens(config.generation.max_tokens);

        Self::new(
            channel,
            config.personality.clone(),
            config.response.policy.clone(),
            cooldowns,
            responder,
        )
        .with_command_prefix(config.discord.command_prefix.clone())
    }

    pub fn profile(&self) -> &PersonalityProfile {
        &self.profile
    }

    pub fn policy(&self) -> &RwLock<ChannelPolicy> {
        &self.policy
    }

    pub fn cooldowns(&self) -> &CooldownStore {
        &self.cooldowns
    }

    /// Run the gate for `message` at `now` and, when it says yes, start the
    /// author's cooldown before anything else can observe it.
    pub fn decide<R: Rng + ?Sized>(
        &self,
        message: &IncomingMessage,
        now: DateTime<FixedOffset>,
        rng: &mut R,
    ) -> GateDecision {
        let decision = {
            let policy = self.policy.read();
            ResponseGate::new(&self.profile, &policy)
                .with_cooldown(self.cooldowns.period())
                .evaluate(message, &self.cooldowns, now, rng)
        };

        match &decision {
            GateDecision::Rolled { chance, draw } => tracing::debug!(
                channel_id = %message.channel_id,
                author_id = %message.author_id,
                final_chance = chance.final_chance,
                draw,
                respond = decision.should_respond(),
                "Gate roll"
            ),
            other => tracing::debug!(
                channel_id = %message.channel_id,
                author_id = %message.author_id,
                decision = other.label(),
                "Gate decision"
            ),
        }

        if decision.should_respond() {
            self.cooldowns.record(&message.author_id, now);
        }
        decision
    }

    fn triage<R: Rng + ?Sized>(&self, message: &IncomingMessage, rng: &mut R) -> Option<Job> {
        if let Some(command) = parse_command(&self.command_prefix, &message.content) {
            let ctx = CommandContext {
                profile: &self.profile,
                policy: &self.policy,
                cooldown_period: self.cooldowns.period(),
                latency: self.channel.latency(),
            };
            return Some(Job::CommandReply(execute_command(&command, message, &ctx)));
        }

        self.decide(message, message.timestamp, rng)
            .should_respond()
            .then_some(Job::Respond)
    }

    async fn run_job(&self, job: Job, message: IncomingMessage) {
        let outgoing = match job {
            Job::CommandReply(text) => OutgoingMessage::to_channel(&message.channel_id, text),
            Job::Respond => self.compose_reply(&message).await,
        };

        if let Err(e) = self.channel.send(&outgoing).await {
            tracing::error!(
                channel = self.channel.name(),
                channel_id = %message.channel_id,
                "Failed to send reply: {e:#}"
            );
        }
    }

    async fn compose_reply(&self, message: &IncomingMessage) -> OutgoingMessage {
        let style = &self.profile.response_style;
        let mut rng = StdRng::from_os_rng();

        if style.add_typing_delay {
            if let Err(e) = self.channel.start_typing(&message.channel_id).await {
                tracing::debug!("Failed to start typing indicator: {e:#}");
            }
            tokio::time::sleep(typing_delay(style.typing_delay_range, &mut rng)).await;
        }

        let reply = self
            .responder
            .respond(&message.content, &self.profile, &mut rng)
            .await;

        if style.add_typing_delay {
            if let Err(e) = self.channel.stop_typing(&message.channel_id).await {
                tracing::debug!("Failed to stop typing indicator: {e:#}");
            }
        }

        tracing::info!(
            channel_id = %message.channel_id,
            author_id = %message.author_id,
            source = %reply.source,
            "Replying"
        );

        if style.reply_directly {
            OutgoingMessage::reply_to(message, reply.text)
        } else {
            OutgoingMessage::to_channel(&message.channel_id, reply.text)
        }
    }
}

/// Uniform pause within `[min, max]` seconds.
pub fn typing_delay<R: Rng + ?Sized>(range: [f64; 2], rng: &mut R) -> Duration {
    let [min, max] = range;
    let min = if min.is_finite() { min.max(0.0) } else { 0.0 };
    let secs = if max.is_finite() && max > min {
        rng.random_range(min..=max)
    } else {
        min
    };
    Duration::from_secs_f64(secs)
}

fn spawn_supervised_listener(
    ch: Arc<dyn Channel>,
    tx: tokio::sync::mpsc::Sender<IncomingMessage>,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);

        loop {
            let result = ch.listen(tx.clone()).await;

            if tx.is_closed() {
                break;
            }

            match result {
                Ok(()) => {
                    tracing::warn!("Channel {} exited unexpectedly; restarting", ch.name());
                    // Clean exit: the listener ran, so start over from the initial backoff
                    backoff = initial_backoff_secs.max(1);
                }
                Err(e) => {
                    tracing::error!("Channel {} error: {e}; restarting", ch.name());
                }
            }

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            // Double backoff AFTER sleeping so first error uses initial_backoff
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}

fn log_worker_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(error) = result {
        tracing::error!("Channel message worker crashed: {error}");
    }
}

/// Consume messages until the sender side closes, then drain the workers.
pub async fn run_message_dispatch_loop(
    mut rx: tokio::sync::mpsc::Receiver<IncomingMessage>,
    ctx: Arc<BotRuntime>,
    max_in_flight_messages: usize,
) {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(max_in_flight_messages.max(1)));
    let mut workers = tokio::task::JoinSet::new();
    let mut rng = StdRng::from_os_rng();

    while let Some(msg) = rx.recv().await {
        let Some(job) = ctx.triage(&msg, &mut rng) else {
            continue;
        };

        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let worker_ctx = Arc::clone(&ctx);
        workers.spawn(async move {
            let _permit = permit;
            worker_ctx.run_job(job, msg).await;
        });

        while let Some(result) = workers.try_join_next() {
            log_worker_join_result(result);
        }
    }

    while let Some(result) = workers.join_next().await {
        log_worker_join_result(result);
    }
}

/// Periodically drop expired cooldown entries.
pub fn spawn_cooldown_sweeper(
    ctx: Arc<BotRuntime>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = ctx.cooldowns.sweep(chrono::Local::now().fixed_offset());
            if removed > 0 {
                tracing::debug!(
                    removed,
                    remaining = ctx.cooldowns.len(),
                    "Swept expired cooldowns"
                );
            }
        }
    })
}

fn print_banner(config: &Config, runtime: &BotRuntime) {
    let profile = runtime.profile();
    let providers = runtime.responder.chain().provider_names().join(" → ");

    println!("🤖 quipbot starting");
    println!("  🎭 Personality: {} ({})", profile.name, profile.tone);
    println!(
        "  🎯 Global response chance: {}%",
        runtime.policy().read().global_chance
    );
    println!("  ⏳ Cooldown: {}s", config.response.cooldown_secs);
    if providers.is_empty() {
        println!("  🧠 Providers: none (fallback replies only)");
    } else {
        println!("  🧠 Providers: {providers}");
    }
    println!(
        "  🚦 In-flight reply limit: {}",
        config.response.max_concurrent_replies.max(1)
    );
    println!("  Listening for messages... (Ctrl+C to stop)");
}

/// Connect to Discord and answer messages until Ctrl+C.
pub async fn start_bot(config: Config) -> Result<()> {
    let token = config.require_bot_token()?.to_string();
    if config.discord.admin_users.is_empty() {
        tracing::warn!(
            "discord.admin_users is empty; !setresponse will be refused for everyone"
        );
    }

    let discord = DiscordChannel::new(
        token,
        config.discord.guild_id.clone(),
        config.discord.admin_users.clone(),
        config.discord.listen_to_bots,
    )
    .with_activity(format!("chats | {} mode", config.personality.tone))
    .with_client(build_http_client(
        "channel.discord",
        DISCORD_HTTP_TIMEOUT_SECS,
        DISCORD_CONNECT_TIMEOUT_SECS,
    ));
    let channel: Arc<dyn Channel> = Arc::new(discord);

    if !channel.health_check().await {
        tracing::warn!("Discord health check failed; the bot token may be invalid");
    }

    let runtime = Arc::new(BotRuntime::from_config(&config, Arc::clone(&channel)));
    print_banner(&config, &runtime);

    let (tx, rx) = tokio::sync::mpsc::channel::<IncomingMessage>(CHANNEL_QUEUE_CAPACITY);
    let listener = spawn_supervised_listener(
        channel,
        tx,
        DEFAULT_CHANNEL_INITIAL_BACKOFF_SECS,
        DEFAULT_CHANNEL_MAX_BACKOFF_SECS,
    );
    let sweeper = spawn_cooldown_sweeper(
        Arc::clone(&runtime),
        Duration::from_secs(config.response.sweep_interval_secs),
    );

    tokio::select! {
        () = run_message_dispatch_loop(rx, runtime, config.response.max_concurrent_replies) => {
            tracing::warn!("Message queue closed; shutting down");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for Ctrl+C: {e}");
            }
            tracing::info!("Shutdown requested");
        }
    }

    listener.abort();
    sweeper.abort();
    Ok(())
}
