//! Personality profile: tunable traits, vocabulary, trigger tables and
//! formatting preferences.
//!
//! A profile is plain data. It is loaded once from config, validated, and then
//! passed by reference into every component that needs it.

pub mod prompt;

pub use prompt::PromptBuilder;

use rand::seq::IndexedRandom;
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Shortest `max_response_length` that still leaves room for one character
/// plus the ellipsis marker.
pub const MIN_RESPONSE_LENGTH: usize = 4;

/// Conversational register the bot speaks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Friendly,
    Witty,
    Sarcastic,
    Professional,
    Humorous,
    Mysterious,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Friendly => "friendly",
            Self::Witty => "witty",
            Self::Sarcastic => "sarcastic",
            Self::Professional => "professional",
            Self::Humorous => "humorous",
            Self::Mysterious => "mysterious",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IntelligenceLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for IntelligenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FormalityLevel {
    Casual,
    Neutral,
    Formal,
}

impl fmt::Display for FormalityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Casual => "casual",
            Self::Neutral => "neutral",
            Self::Formal => "formal",
        })
    }
}

/// A keyword that short-circuits generation with a canned reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Trigger {
    /// Phrase matched case-insensitively as a substring of the message.
    pub pattern: String,
    /// Candidate replies; one is picked uniformly at random.
    pub replies: Vec<String>,
}

impl Trigger {
    pub fn new(pattern: impl Into<String>, replies: &[&str]) -> Self {
        Self {
            pattern: pattern.into(),
            replies: replies.iter().map(|r| (*r).to_string()).collect(),
        }
    }

    /// Whether this trigger fires for an already-lowercased message.
    pub fn matches_lowercase(&self, content_lower: &str) -> bool {
        let pattern = self.pattern.trim().to_lowercase();
        !pattern.is_empty() && content_lower.contains(&pattern)
    }

    pub fn pick_reply<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.replies.choose(rng).map(String::as_str)
    }
}

/// Formatting preferences applied to outgoing text (`[personality.response_style]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseStyle {
    #[serde(default = "default_true")]
    pub use_emojis: bool,
    /// Reply to the author's message instead of posting to the channel.
    #[serde(default = "default_true")]
    pub reply_directly: bool,
    /// Show a typing indicator for a random delay before sending.
    #[serde(default = "default_true")]
    pub add_typing_delay: bool,
    /// `[min, max]` typing delay in seconds.
    #[serde(default = "default_typing_delay_range")]
    pub typing_delay_range: [f64; 2],
    /// Hard cap on outgoing message length, in characters.
    #[serde(default = "default_max_response_length")]
    pub max_response_length: usize,
    /// Fixed probability of appending an emoji. When unset the probability is
    /// derived from the `enthusiasm` and `friendliness` emotions.
    #[serde(default)]
    pub emoji_chance: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn default_typing_delay_range() -> [f64; 2] {
    [1.0, 3.0]
}

fn default_max_response_length() -> usize {
    200
}

impl Default for ResponseStyle {
    fn default() -> Self {
        Self {
            use_emojis: true,
            reply_directly: true,
            add_typing_delay: true,
            typing_delay_range: default_typing_delay_range(),
            max_response_length: default_max_response_length(),
            emoji_chance: None,
        }
    }
}

/// Full personality definition (`[personality]` section). Keys missing from
/// the file keep the built-in profile's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PersonalityProfile {
    pub name: String,
    pub tone: Tone,
    pub intelligence_level: IntelligenceLevel,
    pub formality_level: FormalityLevel,
    /// 0.0–1.0; feeds the generation temperature.
    pub creativity: f64,
    /// Emotion name → intensity (0.0–1.0).
    pub emotions: BTreeMap<String, f64>,
    /// Knowledge domain → strength (0.0–1.0).
    pub knowledge_domains: BTreeMap<String, f64>,
    /// Behavior flag → enabled.
    pub behaviors: BTreeMap<String, bool>,
    /// Scanned in order; the first match wins.
    pub triggers: Vec<Trigger>,
    pub response_style: ResponseStyle,
}

/// A profile invariant that does not hold.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfileError {
    #[error("personality.name must not be empty")]
    EmptyName,
    #[error("{field} must be within [0, 1] (got {value})")]
    OutOfUnitRange { field: String, value: f64 },
    #[error("typing_delay_range must satisfy 0 <= min <= max (got [{min}, {max}])")]
    InvalidDelayRange { min: f64, max: f64 },
    #[error("max_response_length must be at least {min} (got {0})", min = MIN_RESPONSE_LENGTH)]
    ResponseLengthTooSmall(usize),
    #[error("trigger #{index} has an empty pattern")]
    EmptyTriggerPattern { index: usize },
    #[error("trigger '{pattern}' has no candidate replies")]
    TriggerWithoutReplies { pattern: String },
}

fn check_unit(field: impl Into<String>, value: f64) -> Result<(), ProfileError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ProfileError::OutOfUnitRange {
            field: field.into(),
            value,
        })
    }
}

impl PersonalityProfile {
    /// Check trait ranges, the delay range, the length cap and trigger tables.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        check_unit("creativity", self.creativity)?;
        for (emotion, intensity) in &self.emotions {
            check_unit(format!("emotions.{emotion}"), *intensity)?;
        }
        for (domain, strength) in &self.knowledge_domains {
            check_unit(format!("knowledge_domains.{domain}"), *strength)?;
        }
        if let Some(chance) = self.response_style.emoji_chance {
            check_unit("response_style.emoji_chance", chance)?;
        }

        let [min, max] = self.response_style.typing_delay_range;
        if !(min.is_finite() && max.is_finite() && min >= 0.0 && min <= max) {
            return Err(ProfileError::InvalidDelayRange { min, max });
        }
        if self.response_style.max_response_length < MIN_RESPONSE_LENGTH {
            return Err(ProfileError::ResponseLengthTooSmall(
                self.response_style.max_response_length,
            ));
        }

        for (index, trigger) in self.triggers.iter().enumerate() {
            if trigger.pattern.trim().is_empty() {
                return Err(ProfileError::EmptyTriggerPattern { index });
            }
            if trigger.replies.is_empty() {
                return Err(ProfileError::TriggerWithoutReplies {
                    pattern: trigger.pattern.clone(),
                });
            }
        }
        Ok(())
    }

    /// Intensity of an emotion, 0.0 when absent.
    pub fn emotion(&self, name: &str) -> f64 {
        self.emotions.get(name).copied().unwrap_or(0.0)
    }

    /// First trigger (in configured order) contained in `content`, case-insensitive.
    pub fn find_trigger(&self, content: &str) -> Option<&Trigger> {
        let lower = content.to_lowercase();
        self.triggers.iter().find(|t| t.matches_lowercase(&lower))
    }

    /// Sampling temperature handed to every provider: `0.7 + creativity * 0.3`.
    pub fn temperature(&self) -> f64 {
        0.7 + self.creativity.clamp(0.0, 1.0) * 0.3
    }

    /// Probability of decorating a generated reply with an emoji.
    pub fn emoji_probability(&self) -> f64 {
        if !self.response_style.use_emojis {
            return 0.0;
        }
        match self.response_style.emoji_chance {
            Some(fixed) => fixed.clamp(0.0, 1.0),
            None => {
                let mood = (self.emotion("enthusiasm") + self.emotion("friendliness")) / 2.0;
                (0.5 * mood).clamp(0.0, 1.0)
            }
        }
    }
}

impl Default for PersonalityProfile {
    fn default() -> Self {
        let emotions = [
            ("friendliness", 0.9),
            ("sarcasm", 0.1),
            ("curiosity", 0.7),
            ("enthusiasm", 0.8),
            ("patience", 0.9),
            ("humor", 0.6),
        ];
        let domains = [
            ("technology", 0.9),
            ("programming", 0.8),
            ("gaming", 0.6),
            ("science", 0.5),
            ("music", 0.4),
        ];
        let behaviors = [
            "ask_questions_back",
            "share_opinions",
            "use_facts",
            "tell_jokes",
            "use_pop_culture_references",
            "admit_ignorance",
        ];

        Self {
            name: "Quip".into(),
            tone: Tone::Friendly,
            intelligence_level: IntelligenceLevel::High,
            formality_level: FormalityLevel::Casual,
            creativity: 0.7,
            emotions: emotions
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
            knowledge_domains: domains
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
            behaviors: behaviors.iter().map(|k| ((*k).to_string(), true)).collect(),
            triggers: vec![
                Trigger::new(
                    "hello",
                    &["Hey there! 👋", "Hello! Nice to see you!", "Hi! How's your day going?"],
                ),
                Trigger::new(
                    "how are you",
                    &["Running smoothly! 🚀", "Doing great! How about you?", "All systems operational! 💻"],
                ),
                Trigger::new(
                    "rust",
                    &["Rust is my favorite language! 🦀", "Fearless concurrency, gotta love it! 💕"],
                ),
                Trigger::new(
                    "joke",
                    &[
                        "Why do programmers prefer dark mode? Because light attracts bugs! 🐛",
                        "How many programmers does it take to change a light bulb? None, that's a hardware problem! 💡",
                    ],
                ),
                Trigger::new(
                    "weather",
                    &["I'm a digital being, but I hope the weather is nice for you! ☀️"],
                ),
            ],
            response_style: ResponseStyle::default(),
        }
    }
}
