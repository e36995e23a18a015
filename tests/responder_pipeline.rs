//! Reply Pipeline Tests
//!
//! Validates: trigger short-circuit, provider chain ordering and failover,
//! fallback selection, and the length invariant on every reply source.

use parking_lot::Mutex;
use quipbot::persona::{PersonalityProfile, Trigger};
use quipbot::providers::{FnProvider, GenerationParams, Provider, ProviderChain};
use quipbot::responder::fallback::DEFAULT_FALLBACKS;
use quipbot::responder::{FallbackCatalog, ReplySource, Responder};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

type CallLog = Arc<Mutex<Vec<String>>>;

fn answering(name: &'static str, log: &CallLog, answer: &'static str) -> Box<dyn Provider> {
    let log = Arc::clone(log);
    Box::new(FnProvider::new(
        name,
        move |_prompt: String, _params: GenerationParams| {
            log.lock().push(name.to_string());
            async move { Ok::<_, anyhow::Error>(answer.to_string()) }
        },
    ))
}

fn failing(name: &'static str, log: &CallLog) -> Box<dyn Provider> {
    let log = Arc::clone(log);
    Box::new(FnProvider::new(
        name,
        move |_prompt: String, _params: GenerationParams| {
            log.lock().push(name.to_string());
            async move { Err::<String, _>(anyhow::anyhow!("{name} is down")) }
        },
    ))
}

fn profile_without_triggers() -> PersonalityProfile {
    let mut profile = PersonalityProfile::default();
    profile.triggers.clear();
    profile.response_style.emoji_chance = Some(0.0);
    profile
}

fn responder(providers: Vec<Box<dyn Provider>>) -> Responder {
    Responder::new(ProviderChain::new(providers, Duration::from_secs(2)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider chain
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_success_wins_and_later_providers_are_not_called() {
    let log = CallLog::default();
    let responder = responder(vec![
        failing("primary", &log),
        answering("secondary", &log, "from secondary"),
        answering("tertiary", &log, "from tertiary"),
    ]);
    let mut rng = StdRng::seed_from_u64(1);

    let reply = responder
        .respond("anything at all", &profile_without_triggers(), &mut rng)
        .await;

    assert_eq!(reply.text, "from secondary");
    assert_eq!(reply.source, ReplySource::Provider);
    assert_eq!(*log.lock(), vec!["primary", "secondary"]);
}

#[tokio::test]
async fn blank_output_counts_as_failure() {
    let log = CallLog::default();
    let responder = responder(vec![
        answering("blank", &log, "   \n "),
        answering("real", &log, "  actual words  "),
    ]);
    let mut rng = StdRng::seed_from_u64(2);

    let reply = responder
        .respond("anything", &profile_without_triggers(), &mut rng)
        .await;

    assert_eq!(reply.text, "actual words");
    assert_eq!(*log.lock(), vec!["blank", "real"]);
}

#[tokio::test]
async fn exhausted_chain_yields_a_catalog_fallback() {
    let log = CallLog::default();
    let responder = responder(vec![failing("a", &log), failing("b", &log)]);
    let mut rng = StdRng::seed_from_u64(3);

    let reply = responder
        .respond("anything", &profile_without_triggers(), &mut rng)
        .await;

    assert_eq!(reply.source, ReplySource::Fallback);
    assert!(DEFAULT_FALLBACKS.contains(&reply.text.as_str()));
    assert_eq!(log.lock().len(), 2);
}

#[tokio::test]
async fn custom_fallbacks_replace_defaults() {
    let responder = Responder::new(ProviderChain::empty())
        .with_fallbacks(FallbackCatalog::new(vec!["be right back".into()]));
    let mut rng = StdRng::seed_from_u64(4);

    let reply = responder
        .respond("anything", &profile_without_triggers(), &mut rng)
        .await;
    assert_eq!(reply.text, "be right back");
}

// ─────────────────────────────────────────────────────────────────────────────
// Triggers
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn trigger_reply_never_reaches_providers() {
    let log = CallLog::default();
    let responder = responder(vec![answering("model", &log, "generated")]);
    let mut profile = profile_without_triggers();
    profile.triggers.push(Trigger::new("ferris", &["🦀 Ferris says hi!"]));
    let mut rng = StdRng::seed_from_u64(5);

    let reply = responder.respond("Where is FERRIS?", &profile, &mut rng).await;

    assert_eq!(reply.text, "🦀 Ferris says hi!");
    assert_eq!(
        reply.source,
        ReplySource::Trigger {
            pattern: "ferris".into()
        }
    );
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn trigger_replies_are_not_decorated() {
    let responder = Responder::new(ProviderChain::empty());
    let mut profile = profile_without_triggers();
    profile.response_style.emoji_chance = Some(1.0);
    profile.triggers.push(Trigger::new("ping", &["pong"]));
    let mut rng = StdRng::seed_from_u64(6);

    for _ in 0..20 {
        let reply = responder.respond("ping", &profile, &mut rng).await;
        assert_eq!(reply.text, "pong");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Length invariant
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn every_source_respects_max_response_length() {
    let long: &'static str = "This answer rambles on and on without any sign of stopping soon.";
    let log = CallLog::default();
    let mut profile = profile_without_triggers();
    profile.response_style.max_response_length = 24;
    profile.response_style.emoji_chance = Some(1.0);
    profile.triggers.push(Trigger::new("story", &[long]));
    let mut rng = StdRng::seed_from_u64(7);

    let with_provider = responder(vec![answering("model", &log, long)]);
    let without_provider = Responder::new(ProviderChain::empty())
        .with_fallbacks(FallbackCatalog::new(vec![long.to_string()]));

    for (responder, content) in [
        (&with_provider, "tell me a story"),
        (&with_provider, "something else"),
        (&without_provider, "something else"),
    ] {
        let reply = responder.respond(content, &profile, &mut rng).await;
        assert!(
            reply.text.chars().count() <= 24,
            "{} produced {:?}",
            reply.source,
            reply.text
        );
        assert!(reply.text.ends_with("..."));
    }
}
