//! Everything between "the gate said yes" and "here is the text to send".
//!
//! ```text
//! trigger match? ── yes ──> canned reply (clamped)
//!      │ no
//!      ▼
//! PromptBuilder ─> ProviderChain ── text ──> ResponseFilter
//!                        │ none
//!                        ▼
//!                 FallbackCatalog
//! ```

pub mod fallback;
pub mod filter;

pub use fallback::FallbackCatalog;
pub use filter::ResponseFilter;

use crate::persona::{PersonalityProfile, PromptBuilder};
use crate::providers::traits::DEFAULT_MAX_TOKENS;
use crate::providers::{GenerationParams, ProviderChain};
use rand::Rng;
use std::fmt;

/// Where the text of a reply came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySource {
    Trigger { pattern: String },
    Provider,
    Fallback,
}

impl fmt::Display for ReplySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trigger { pattern } => write!(f, "trigger '{pattern}'"),
            Self::Provider => f.write_str("provider"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

pub struct Responder {
    prompts: PromptBuilder,
    chain: ProviderChain,
    filter: ResponseFilter,
    fallbacks: FallbackCatalog,
    max_tokens: u32,
}

impl Responder {
    pub fn new(chain: ProviderChain) -> Self {
        Self {
            prompts: PromptBuilder::with_defaults(),
            chain,
            filter: ResponseFilter::default(),
            fallbacks: FallbackCatalog::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_fallbacks(mut self, fallbacks: FallbackCatalog) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn with_filter(mut self, filter: ResponseFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    pub fn prompt_for(&self, content: &str, profile: &PersonalityProfile) -> String {
        self.prompts.build(content, profile)
    }

    /// Produce the text for a message the gate already admitted. Never fails.
    pub async fn respond<R: Rng + Send + ?Sized>(
        &self,
        content: &str,
        profile: &PersonalityProfile,
        rng: &mut R,
    ) -> Reply {
        if let Some(trigger) = profile.find_trigger(content) {
            if let Some(candidate) = trigger.pick_reply(rng) {
                tracing::debug!(pattern = %trigger.pattern, "Trigger short-circuit");
                return Reply {
                    text: ResponseFilter::clamp(candidate, profile),
                    source: ReplySource::Trigger {
                        pattern: trigger.pattern.clone(),
                    },
                };
            }
        }

        let prompt = self.prompt_for(content, profile);
        let params = GenerationParams::from_profile(profile, self.max_tokens);
        if let Some(text) = self.chain.generate(&prompt, &params).await {
            return Reply {
                text: self.filter.apply(&text, profile, rng),
                source: ReplySource::Provider,
            };
        }

        Reply {
            text: ResponseFilter::clamp(self.fallbacks.pick(rng), profile),
            source: ReplySource::Fallback,
        }
    }
}
