use super::traits::{GenerationParams, Provider};
use std::time::Duration;

/// Default per-call cutoff for a single provider.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 15;

/// Ordered list of providers consulted until one yields usable text.
///
/// Every call is isolated: an error, a timeout or an empty answer is logged
/// and the chain moves to the next provider. Nothing is retried, and no error
/// escapes `generate`.
pub struct ProviderChain {
    providers: Vec<Box<dyn Provider>>,
    call_timeout: Duration,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn Provider>>, call_timeout: Duration) -> Self {
        Self {
            providers,
            call_timeout,
        }
    }

    /// A chain with no providers; `generate` always returns `None`.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS))
    }

    pub fn push(&mut self, provider: Box<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First non-empty trimmed result in provider order, or `None` when
    /// every provider failed.
    pub async fn generate(&self, prompt: &str, params: &GenerationParams) -> Option<String> {
        for provider in &self.providers {
            let provider_name = provider.name();
            let outcome =
                tokio::time::timeout(self.call_timeout, provider.generate(prompt, params)).await;

            match outcome {
                Ok(Ok(text)) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        tracing::warn!(
                            provider = provider_name,
                            "Provider returned empty text, moving on"
                        );
                        continue;
                    }
                    tracing::debug!(
                        provider = provider_name,
                        chars = trimmed.chars().count(),
                        "Provider produced text"
                    );
                    return Some(trimmed.to_string());
                }
                Ok(Err(e)) => {
                    let error_detail = super::sanitize_api_error(&format!("{e:#}"));
                    tracing::warn!(
                        provider = provider_name,
                        error = %error_detail,
                        "Provider call failed, moving on"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        provider = provider_name,
                        timeout_ms = u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
                        "Provider call timed out, moving on"
                    );
                }
            }
        }

        tracing::warn!(
            attempted = self.providers.len(),
            "No provider produced usable text"
        );
        None
    }
}
