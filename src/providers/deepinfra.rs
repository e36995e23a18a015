use crate::providers::traits::{GenerationParams, Provider};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEEPINFRA_API_BASE: &str = "https://api.deepinfra.com/v1/inference";
pub const DEFAULT_DEEPINFRA_MODEL: &str = "microsoft/DialoGPT-large";

/// DeepInfra inference endpoint. Requires an API key.
pub struct DeepInfraProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    input: &'a str,
    max_length: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    results: Vec<InferenceResult>,
}

#[derive(Debug, Deserialize)]
struct InferenceResult {
    #[serde(default)]
    generated_text: String,
}

impl DeepInfraProvider {
    pub fn new(
        base_url: Option<&str>,
        model: Option<&str>,
        api_key: Option<&str>,
        client: Client,
    ) -> Self {
        let api_key = api_key.and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_DEEPINFRA_MODEL);

        Self {
            base_url: base_url
                .unwrap_or(DEEPINFRA_API_BASE)
                .trim()
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key,
            client,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url, self.model)
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl Provider for DeepInfraProvider {
    fn name(&self) -> &str {
        "deepinfra"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .context("DeepInfra API key not set. Set DEEPINFRA_API_KEY or edit config.toml.")?;

        let request = InferenceRequest {
            input: prompt,
            max_length: params.max_tokens,
            temperature: params.temperature,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::api_error("DeepInfra", response).await);
        }

        let body: InferenceResponse = response
            .json()
            .await
            .context("Failed to parse DeepInfra response")?;

        body.results
            .into_iter()
            .next()
            .map(|r| r.generated_text)
            .context("DeepInfra response had no results")
    }
}
