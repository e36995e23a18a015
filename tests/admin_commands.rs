//! Admin Command Tests
//!
//! Validates: `setresponse` validation and permissions, and that accepted
//! changes are what the response gate sees next.

use chrono::{FixedOffset, TimeDelta, TimeZone};
use parking_lot::RwLock;
use quipbot::channels::commands::{
    parse_command, run_command, BotCommand, CommandContext, CommandError,
};
use quipbot::channels::IncomingMessage;
use quipbot::gate::{ChannelPolicy, CooldownStore, ResponseGate, ValidationError};
use quipbot::persona::PersonalityProfile;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn message(channel: &str, content: &str, admin: bool) -> IncomingMessage {
    IncomingMessage {
        message_id: "m".into(),
        author_id: "admin-or-not".into(),
        channel_id: channel.into(),
        content: content.into(),
        mentions_bot: false,
        author_is_admin: admin,
        timestamp: FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 2, 2, 11, 0, 0)
            .unwrap(),
    }
}

fn set(
    policy: &RwLock<ChannelPolicy>,
    channel: &str,
    raw: &str,
    admin: bool,
) -> Result<String, CommandError> {
    let profile = PersonalityProfile::default();
    let content = format!("!setresponse {raw}");
    let command = parse_command("!", &content).expect("setresponse parses");
    let ctx = CommandContext {
        profile: &profile,
        policy,
        cooldown_period: TimeDelta::seconds(30),
        latency: None,
    };
    run_command(&command, &message(channel, &content, admin), &ctx)
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn boundaries_are_accepted() {
    let policy = RwLock::new(ChannelPolicy::default());
    assert!(set(&policy, "a", "0", true).is_ok());
    assert!(set(&policy, "b", "100", true).is_ok());
    assert_eq!(policy.read().get_channel_response_chance("a"), 0);
    assert_eq!(policy.read().get_channel_response_chance("b"), 100);
}

#[test]
fn out_of_range_values_are_rejected() {
    let policy = RwLock::new(ChannelPolicy::default());
    for (raw, value) in [("-1", -1), ("101", 101), ("99999999999", 99_999_999_999)] {
        assert_eq!(
            set(&policy, "a", raw, true),
            Err(CommandError::Validation(ValidationError::OutOfRange(value)))
        );
    }
    assert!(policy.read().channel_chances.is_empty());
}

#[test]
fn non_numeric_values_are_rejected() {
    let policy = RwLock::new(ChannelPolicy::default());
    for raw in ["abc", "12.5", "1e2"] {
        assert!(matches!(
            set(&policy, "a", raw, true),
            Err(CommandError::Validation(ValidationError::NotAnInteger(_)))
        ));
    }
    assert!(policy.read().channel_chances.is_empty());
}

#[test]
fn non_admins_are_refused_before_parsing() {
    let policy = RwLock::new(ChannelPolicy::default());
    assert_eq!(
        set(&policy, "a", "not-even-a-number", false),
        Err(CommandError::PermissionDenied)
    );
}

#[test]
fn overrides_are_per_channel() {
    let policy = RwLock::new(ChannelPolicy::default());
    set(&policy, "a", "75", true).unwrap();
    let policy = policy.read();
    assert_eq!(policy.get_channel_response_chance("a"), 75);
    assert_eq!(policy.get_channel_response_chance("b"), policy.global_chance);
}

#[test]
fn unknown_commands_are_not_commands() {
    assert_eq!(parse_command("!", "!setchance 5"), None);
    assert_eq!(
        parse_command("!", "!SetResponse 5"),
        Some(BotCommand::SetResponse(Some("5".into())))
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Effect on the gate
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn silenced_channel_stops_unprompted_replies() {
    let profile = PersonalityProfile::default();
    let policy = RwLock::new(ChannelPolicy {
        global_chance: 100,
        ..ChannelPolicy::default()
    });
    set(&policy, "quiet", "0", true).unwrap();

    let store = CooldownStore::new(TimeDelta::seconds(30), 100);
    let mut rng = StdRng::seed_from_u64(99);
    let guard = policy.read();
    let gate = ResponseGate::new(&profile, &guard);
    let now = message("quiet", "", false).timestamp;
    let chatter = "x".repeat(120);

    for _ in 0..500 {
        assert!(!gate.should_respond(&message("quiet", &chatter, false), &store, now, &mut rng));
    }
    assert!(gate.should_respond(&message("loud", &chatter, false), &store, now, &mut rng));
}
