//! Response gate: decides, per incoming message, whether the bot speaks.
//!
//! Decision order, first match wins:
//! 1. the message mentions the bot → respond
//! 2. the author is still cooling down → stay quiet
//! 3. the content contains a configured trigger → respond
//! 4. otherwise roll against the channel's chance, scaled by time of day,
//!    message length and a fresh jitter factor.
//!
//! The gate never records a cooldown; that is the caller's job after a
//! positive decision. Looking an author up does drop their entry once it
//! has expired.

pub mod cooldown;

pub use cooldown::CooldownStore;

use crate::channels::traits::IncomingMessage;
use crate::persona::PersonalityProfile;
use chrono::{DateTime, FixedOffset, TimeDelta, Timelike};
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

/// Minimum gap between two non-mention responses to the same author.
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;

/// Multiplicative noise applied to every probability roll.
pub const JITTER_RANGE: RangeInclusive<f64> = 0.8..=1.2;

/// Messages this long (in characters) count as "normal" length; longer
/// messages raise the chance up to [`MAX_CONTENT_FACTOR`].
const CONTENT_LENGTH_UNIT: f64 = 50.0;
const MAX_CONTENT_FACTOR: f64 = 2.0;

/// Rejected admin input for a response chance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("'{0}' is not a whole number")]
    NotAnInteger(String),
    #[error("chance must be between 0-100 (got {0})")]
    OutOfRange(i64),
}

/// Part of the day, used to pick a time modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBand {
    /// 22:00–06:00
    Night,
    /// 18:00–22:00
    Peak,
    Normal,
}

impl TimeBand {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            22..=23 | 0..=5 => Self::Night,
            18..=21 => Self::Peak,
            _ => Self::Normal,
        }
    }
}

impl fmt::Display for TimeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Night => "night",
            Self::Peak => "peak",
            Self::Normal => "normal",
        })
    }
}

/// Chance multipliers per [`TimeBand`] (`[response.time_modifiers]`).
/// The normal band is fixed at 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeModifiers {
    #[serde(default = "default_night_modifier")]
    pub night: f64,
    #[serde(default = "default_peak_modifier")]
    pub peak: f64,
}

pub const NORMAL_TIME_MODIFIER: f64 = 1.0;

fn default_night_modifier() -> f64 {
    0.6
}

fn default_peak_modifier() -> f64 {
    1.3
}

impl Default for TimeModifiers {
    fn default() -> Self {
        Self {
            night: default_night_modifier(),
            peak: default_peak_modifier(),
        }
    }
}

impl TimeModifiers {
    pub fn for_band(&self, band: TimeBand) -> f64 {
        match band {
            TimeBand::Night => self.night,
            TimeBand::Peak => self.peak,
            TimeBand::Normal => NORMAL_TIME_MODIFIER,
        }
    }
}

/// Global and per-channel response probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChannelPolicy {
    /// Percent chance (0–100) used when a channel has no override.
    #[serde(default = "default_global_chance")]
    pub global_chance: u8,
    /// Channel ID → percent chance (0–100).
    #[serde(default)]
    pub channel_chances: BTreeMap<String, u8>,
    #[serde(default)]
    pub time_modifiers: TimeModifiers,
}

fn default_global_chance() -> u8 {
    20
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            global_chance: default_global_chance(),
            channel_chances: BTreeMap::new(),
            time_modifiers: TimeModifiers::default(),
        }
    }
}

impl ChannelPolicy {
    pub fn get_channel_response_chance(&self, channel_id: &str) -> u8 {
        self.channel_chances
            .get(channel_id)
            .copied()
            .unwrap_or(self.global_chance)
    }

    /// Store a per-channel override. Out-of-range values leave the policy untouched.
    pub fn set_channel_response_chance(
        &mut self,
        channel_id: &str,
        chance: i64,
    ) -> Result<u8, ValidationError> {
        let chance = u8::try_from(chance)
            .ok()
            .filter(|c| *c <= 100)
            .ok_or(ValidationError::OutOfRange(chance))?;
        self.channel_chances.insert(channel_id.to_string(), chance);
        Ok(chance)
    }

    /// Parse raw command input, then store it.
    pub fn set_channel_response_chance_str(
        &mut self,
        channel_id: &str,
        raw: &str,
    ) -> Result<u8, ValidationError> {
        let trimmed = raw.trim();
        let chance: i64 = trimmed
            .parse()
            .map_err(|_| ValidationError::NotAnInteger(trimmed.to_string()))?;
        self.set_channel_response_chance(channel_id, chance)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.global_chance > 100 {
            anyhow::bail!(
                "response.global_chance must be within 0-100 (got {})",
                self.global_chance
            );
        }
        for (channel, chance) in &self.channel_chances {
            if *chance > 100 {
                anyhow::bail!(
                    "response.channel_chances.{channel} must be within 0-100 (got {chance})"
                );
            }
        }
        for (band, value) in [
            ("night", self.time_modifiers.night),
            ("peak", self.time_modifiers.peak),
        ] {
            if !(value.is_finite() && value > 0.0) {
                anyhow::bail!("response.time_modifiers.{band} must be positive (got {value})");
            }
        }
        Ok(())
    }
}

/// Every factor that went into a probability roll.
#[derive(Debug, Clone, PartialEq)]
pub struct ChanceBreakdown {
    pub base: f64,
    pub band: TimeBand,
    pub time_modifier: f64,
    pub content_factor: f64,
    pub jitter: f64,
    /// Percent, clamped to 0–100.
    pub final_chance: f64,
}

impl ChanceBreakdown {
    /// Whether an integer draw in `1..=100` passes.
    pub fn admits(&self, draw: u32) -> bool {
        f64::from(draw) <= self.final_chance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Mentioned,
    CoolingDown { remaining: TimeDelta },
    Triggered { pattern: String },
    Rolled { chance: ChanceBreakdown, draw: u32 },
}

impl GateDecision {
    pub fn should_respond(&self) -> bool {
        match self {
            Self::Mentioned | Self::Triggered { .. } => true,
            Self::CoolingDown { .. } => false,
            Self::Rolled { chance, draw } => chance.admits(*draw),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Mentioned => "mentioned",
            Self::CoolingDown { .. } => "cooldown",
            Self::Triggered { .. } => "trigger",
            Self::Rolled { .. } => "roll",
        }
    }
}

pub struct ResponseGate<'a> {
    profile: &'a PersonalityProfile,
    policy: &'a ChannelPolicy,
    cooldown_period: TimeDelta,
}

impl<'a> ResponseGate<'a> {
    pub fn new(profile: &'a PersonalityProfile, policy: &'a ChannelPolicy) -> Self {
        Self {
            profile,
            policy,
            cooldown_period: TimeDelta::seconds(DEFAULT_COOLDOWN_SECS as i64),
        }
    }

    pub fn with_cooldown(mut self, cooldown_period: TimeDelta) -> Self {
        self.cooldown_period = cooldown_period;
        self
    }

    pub fn cooldown_period(&self) -> TimeDelta {
        self.cooldown_period
    }

    /// Deterministic part of the roll for a given jitter factor.
    pub fn chance(
        &self,
        message: &IncomingMessage,
        now: DateTime<FixedOffset>,
        jitter: f64,
    ) -> ChanceBreakdown {
        let base = f64::from(self.policy.get_channel_response_chance(&message.channel_id));
        let band = TimeBand::from_hour(now.hour());
        let time_modifier = self.policy.time_modifiers.for_band(band);
        let length = message.content.chars().count() as f64;
        let content_factor = (length / CONTENT_LENGTH_UNIT).min(MAX_CONTENT_FACTOR);
        let final_chance = (base * time_modifier * content_factor * jitter).clamp(0.0, 100.0);

        ChanceBreakdown {
            base,
            band,
            time_modifier,
            content_factor,
            jitter,
            final_chance,
        }
    }

    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        message: &IncomingMessage,
        cooldowns: &CooldownStore,
        now: DateTime<FixedOffset>,
        rng: &mut R,
    ) -> GateDecision {
        if message.mentions_bot {
            return GateDecision::Mentioned;
        }

        if let Some(last) = cooldowns.active_since(&message.author_id, now) {
            let elapsed = now - last;
            if elapsed < self.cooldown_period {
                return GateDecision::CoolingDown {
                    remaining: self.cooldown_period - elapsed,
                };
            }
        }

        if let Some(trigger) = self.profile.find_trigger(&message.content) {
            return GateDecision::Triggered {
                pattern: trigger.pattern.clone(),
            };
        }

        let jitter = rng.random_range(JITTER_RANGE);
        let chance = self.chance(message, now, jitter);
        let draw = rng.random_range(1..=100);
        GateDecision::Rolled { chance, draw }
    }

    pub fn should_respond<R: Rng + ?Sized>(
        &self,
        message: &IncomingMessage,
        cooldowns: &CooldownStore,
        now: DateTime<FixedOffset>,
        rng: &mut R,
    ) -> bool {
        self.evaluate(message, cooldowns, now, rng).should_respond()
    }
}
