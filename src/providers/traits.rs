use crate::persona::PersonalityProfile;
use async_trait::async_trait;

/// Default cap on generated tokens per call.
pub const DEFAULT_MAX_TOKENS: u32 = 120;

/// The small set of knobs every backend receives alongside the prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f64,
}

impl GenerationParams {
    pub fn from_profile(profile: &PersonalityProfile, max_tokens: u32) -> Self {
        Self {
            max_tokens,
            temperature: profile.temperature(),
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.7,
        }
    }
}

/// A stateless text-generation backend.
///
/// Implementations return raw generated text or fail; they never retry.
/// Errors are isolated by [`super::ProviderChain`], so a provider is free to
/// bail on anything it does not understand.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String>;
}
