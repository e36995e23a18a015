//! Prefix commands (`!ping`, `!setresponse 5`, ...).
//!
//! Commands read the live profile and policy; only `setresponse` writes, and
//! only for admins. A message that parses as a command never reaches the
//! response gate.

use super::traits::IncomingMessage;
use crate::gate::{ChannelPolicy, ValidationError, NORMAL_TIME_MODIFIER};
use crate::persona::prompt::describe_emotion;
use crate::persona::PersonalityProfile;
use chrono::TimeDelta;
use parking_lot::RwLock;
use std::fmt::Write;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Ping,
    Info,
    Personality,
    ResponseConfig,
    /// Raw argument, validated when executed.
    SetResponse(Option<String>),
}

/// Rejection surfaced to the user who ran the command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("only bot admins can change response settings")]
    PermissionDenied,
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
}

impl CommandError {
    /// Chat-facing rejection text.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::OutOfRange(_)) => {
                "❌ Chance must be between 0-100!".into()
            }
            Self::Validation(ValidationError::NotAnInteger(raw)) => {
                format!("❌ '{raw}' is not a whole number. Usage: setresponse <0-100>")
            }
            Self::PermissionDenied => "❌ Only bot admins can change the response chance.".into(),
            Self::MissingArgument(what) => format!("❌ Missing {what}. Usage: setresponse <0-100>"),
        }
    }
}

/// Parse `content` as a command under `prefix`. Unknown names are not commands.
pub fn parse_command(prefix: &str, content: &str) -> Option<BotCommand> {
    let rest = content.trim().strip_prefix(prefix)?;
    let mut parts = rest.split_whitespace();
    let name = parts.next()?.to_ascii_lowercase();
    let arg = parts.next().map(str::to_string);

    match name.as_str() {
        "ping" => Some(BotCommand::Ping),
        "info" => Some(BotCommand::Info),
        "personality" => Some(BotCommand::Personality),
        "responseconfig" => Some(BotCommand::ResponseConfig),
        "setresponse" => Some(BotCommand::SetResponse(arg)),
        _ => None,
    }
}

/// Read-mostly state a command can see.
pub struct CommandContext<'a> {
    pub profile: &'a PersonalityProfile,
    pub policy: &'a RwLock<ChannelPolicy>,
    pub cooldown_period: TimeDelta,
    pub latency: Option<Duration>,
}

/// Run a command; errors are returned for the caller to render.
pub fn run_command(
    command: &BotCommand,
    message: &IncomingMessage,
    ctx: &CommandContext<'_>,
) -> Result<String, CommandError> {
    match command {
        BotCommand::Ping => Ok(match ctx.latency {
            Some(latency) => format!("🏓 Pong! {}ms", latency.as_millis()),
            None => "🏓 Pong! (latency not measured yet)".into(),
        }),
        BotCommand::Info => {
            let chance = ctx.policy.read().get_channel_response_chance(&message.channel_id);
            Ok(format!(
                "🤖 {name} Info\nPersonality: {tone}\nResponse Chance: {chance}%",
                name = ctx.profile.name,
                tone = ctx.profile.tone,
            ))
        }
        BotCommand::Personality => Ok(describe_personality(ctx.profile)),
        BotCommand::ResponseConfig => Ok(describe_response_config(
            &ctx.policy.read(),
            &message.channel_id,
            ctx.cooldown_period,
        )),
        BotCommand::SetResponse(arg) => {
            if !message.author_is_admin {
                return Err(CommandError::PermissionDenied);
            }
            let raw = arg
                .as_deref()
                .ok_or(CommandError::MissingArgument("chance"))?;
            let chance = ctx
                .policy
                .write()
                .set_channel_response_chance_str(&message.channel_id, raw)?;
            tracing::info!(
                channel_id = %message.channel_id,
                author_id = %message.author_id,
                chance,
                "Channel response chance updated"
            );
            Ok(format!("✅ Response chance set to {chance}% in this channel!"))
        }
    }
}

/// Run a command and flatten the outcome into the text to send.
pub fn execute_command(
    command: &BotCommand,
    message: &IncomingMessage,
    ctx: &CommandContext<'_>,
) -> String {
    run_command(command, message, ctx).unwrap_or_else(|e| {
        tracing::debug!(command = ?command, error = %e, "Command rejected");
        e.user_message()
    })
}

fn describe_personality(profile: &PersonalityProfile) -> String {
    let mut out = format!(
        "🎭 {} is {} ({}, {} intelligence), creativity {:.0}%",
        profile.name,
        profile.tone,
        profile.formality_level,
        profile.intelligence_level,
        profile.creativity * 100.0
    );

    let emotions: Vec<String> = profile
        .emotions
        .iter()
        .filter_map(|(name, intensity)| describe_emotion(name, *intensity))
        .collect();
    if !emotions.is_empty() {
        let _ = write!(out, "\nMood: {}", emotions.join(", "));
    }

    let domains: Vec<String> = profile
        .knowledge_domains
        .iter()
        .map(|(domain, strength)| format!("{domain} {:.0}%", strength * 100.0))
        .collect();
    if !domains.is_empty() {
        let _ = write!(out, "\nKnows about: {}", domains.join(", "));
    }
    out
}

fn describe_response_config(
    policy: &ChannelPolicy,
    channel_id: &str,
    cooldown_period: TimeDelta,
) -> String {
    let modifiers = &policy.time_modifiers;
    format!(
        "🎯 Response settings\nGlobal chance: {}%\nThis channel: {}%\n\
         Time modifiers: night ×{}, peak ×{}, normal ×{}\nCooldown: {}s",
        policy.global_chance,
        policy.get_channel_response_chance(channel_id),
        modifiers.night,
        modifiers.peak,
        NORMAL_TIME_MODIFIER,
        cooldown_period.num_seconds()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn message(content: &str, admin: bool) -> IncomingMessage {
        IncomingMessage {
            message_id: "m1".into(),
            author_id: "u1".into(),
            channel_id: "555".into(),
            content: content.into(),
            mentions_bot: false,
            author_is_admin: admin,
            timestamp: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
                .unwrap(),
        }
    }

    fn run(
        content: &str,
        admin: bool,
        profile: &PersonalityProfile,
        policy: &RwLock<ChannelPolicy>,
    ) -> String {
        let command = parse_command("!", content).expect("command should parse");
        let ctx = CommandContext {
            profile,
            policy,
            cooldown_period: TimeDelta::seconds(30),
            latency: Some(Duration::from_millis(42)),
        };
        execute_command(&command, &message(content, admin), &ctx)
    }

    #[test]
    fn parse_recognizes_known_commands_only() {
        assert_eq!(parse_command("!", "!ping"), Some(BotCommand::Ping));
        assert_eq!(parse_command("!", "  !INFO  "), Some(BotCommand::Info));
        assert_eq!(
            parse_command("!", "!setresponse 5"),
            Some(BotCommand::SetResponse(Some("5".into())))
        );
        assert_eq!(
            parse_command("!", "!setresponse"),
            Some(BotCommand::SetResponse(None))
        );
        assert_eq!(parse_command("!", "!dance"), None);
        assert_eq!(parse_command("!", "ping"), None);
        assert_eq!(parse_command("!", "!"), None);
        assert_eq!(parse_command("?", "?ping"), Some(BotCommand::Ping));
    }

    #[test]
    fn ping_reports_latency() {
        let profile = PersonalityProfile::default();
        let policy = RwLock::new(ChannelPolicy::default());
        assert_eq!(run("!ping", false, &profile, &policy), "🏓 Pong! 42ms");
    }

    #[test]
    fn info_shows_channel_chance() {
        let profile = PersonalityProfile::default();
        let policy = RwLock::new(ChannelPolicy::default());
        let out = run("!info", false, &profile, &policy);
        assert!(out.contains("Personality: friendly"));
        assert!(out.contains("Response Chance: 20%"));
    }

    #[test]
    fn admin_sets_channel_chance() {
        let profile = PersonalityProfile::default();
        let policy = RwLock::new(ChannelPolicy::default());
        let out = run("!setresponse 5", true, &profile, &policy);
        assert_eq!(out, "✅ Response chance set to 5% in this channel!");
        assert_eq!(policy.read().get_channel_response_chance("555"), 5);
    }

    #[test]
    fn out_of_range_is_rejected_without_mutation() {
        let profile = PersonalityProfile::default();
        let policy = RwLock::new(ChannelPolicy::default());
        let out = run("!setresponse 150", true, &profile, &policy);
        assert_eq!(out, "❌ Chance must be between 0-100!");
        assert!(policy.read().channel_chances.is_empty());
    }

    #[test]
    fn non_admin_cannot_set_chance() {
        let profile = PersonalityProfile::default();
        let policy = RwLock::new(ChannelPolicy::default());
        let command = parse_command("!", "!setresponse 50").unwrap();
        let ctx = CommandContext {
            profile: &profile,
            policy: &policy,
            cooldown_period: TimeDelta::seconds(30),
            latency: None,
        };
        assert_eq!(
            run_command(&command, &message("!setresponse 50", false), &ctx),
            Err(CommandError::PermissionDenied)
        );
        assert!(policy.read().channel_chances.is_empty());
    }

    #[test]
    fn non_integer_and_missing_argument_are_rejected() {
        let profile = PersonalityProfile::default();
        let policy = RwLock::new(ChannelPolicy::default());
        assert!(run("!setresponse lots", true, &profile, &policy).starts_with("❌ 'lots'"));
        assert!(run("!setresponse", true, &profile, &policy).starts_with("❌ Missing chance"));
        assert!(policy.read().channel_chances.is_empty());
    }

    #[test]
    fn response_config_lists_modifiers_and_cooldown() {
        let profile = PersonalityProfile::default();
        let policy = RwLock::new(ChannelPolicy::default());
        let out = run("!responseconfig", false, &profile, &policy);
        assert!(out.contains("Global chance: 20%"));
        assert!(out.contains("night ×0.6"));
        assert!(out.contains("Cooldown: 30s"));
    }

    #[test]
    fn personality_lists_mood_and_domains() {
        let profile = PersonalityProfile::default();
        let policy = RwLock::new(ChannelPolicy::default());
        let out = run("!personality", false, &profile, &policy);
        assert!(out.contains("Quip is friendly"));
        assert!(out.contains("very friendly"));
        assert!(out.contains("technology 90%"));
    }
}
