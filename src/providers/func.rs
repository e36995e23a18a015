use super::traits::{GenerationParams, Provider};
use async_trait::async_trait;
use std::future::Future;

/// Adapts an async closure into a [`Provider`], so any
/// `(prompt, params) -> text` function can sit in a chain.
pub struct FnProvider<F> {
    name: String,
    func: F,
}

impl<F, Fut> FnProvider<F>
where
    F: Fn(String, GenerationParams) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> Provider for FnProvider<F>
where
    F: Fn(String, GenerationParams) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String> {
        (self.func)(prompt.to_string(), *params).await
    }
}
