use crate::providers::traits::{GenerationParams, Provider};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const HUGGINGFACE_API_BASE: &str = "https://api-inference.huggingface.co/models";
pub const DEFAULT_HUGGINGFACE_MODEL: &str = "microsoft/DialoGPT-large";

/// Hugging Face hosted inference. A missing token makes every call fail.
pub struct HuggingFaceProvider {
    base_url: String,
    model: String,
    token: Option<String>,
    client: Client,
}

// ─── Request Structures ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    max_new_tokens: u32,
    temperature: f64,
    do_sample: bool,
    return_full_text: bool,
}

// ─── Response Structures ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeneratedText {
    #[serde(default)]
    generated_text: String,
}

// ─── Implementation ───────────────────────────────────────────────────────────

impl HuggingFaceProvider {
    pub fn new(
        base_url: Option<&str>,
        model: Option<&str>,
        token: Option<&str>,
        client: Client,
    ) -> Self {
        let token = token.and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_HUGGINGFACE_MODEL);

        Self {
            base_url: base_url
                .unwrap_or(HUGGINGFACE_API_BASE)
                .trim()
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            token,
            client,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url, self.model)
    }

    pub fn has_credential(&self) -> bool {
        self.token.is_some()
    }
}

#[async_trait]
impl Provider for HuggingFaceProvider {
    fn name(&self) -> &str {
        "huggingface"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String> {
        let token = self.token.as_deref().context(
            "Hugging Face token not set. Set HUGGINGFACE_TOKEN or edit config.toml.",
        )?;

        let request = InferenceRequest {
            inputs: prompt,
            parameters: InferenceParameters {
                max_new_tokens: params.max_tokens,
                temperature: params.temperature,
                do_sample: true,
                return_full_text: false,
            },
        };

        let url = self.endpoint();
        tracing::debug!(url = %url, temperature = params.temperature, "Hugging Face request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::api_error("Hugging Face", response).await);
        }

        let results: Vec<GeneratedText> = response
            .json()
            .await
            .context("Hugging Face response was not a list of generations")?;

        results
            .into_iter()
            .next()
            .map(|r| r.generated_text)
            .context("Hugging Face returned no generations")
    }
}
