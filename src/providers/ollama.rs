use crate::providers::traits::{GenerationParams, Provider};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Local (or remote) Ollama server via `/api/generate`.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

// ─── Request Structures ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f64,
    num_predict: u32,
}

// ─── Response Structures ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

// ─── Implementation ───────────────────────────────────────────────────────────

impl OllamaProvider {
    fn normalize_base_url(raw_url: &str) -> String {
        let trimmed = raw_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return String::new();
        }

        trimmed
            .strip_suffix("/api")
            .unwrap_or(trimmed)
            .trim_end_matches('/')
            .to_string()
    }

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
            .unwrap_or(DEFAULT_OLLAMA_MODEL);

        Self {
            base_url: Self::normalize_base_url(base_url.unwrap_or(DEFAULT_OLLAMA_URL)),
            model: model.to_string(),
            api_key,
            client,
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: Options {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.base_url);
        tracing::debug!(url = %url, model = %self.model, "Ollama request");

        let mut request_builder = self.client.post(&url).json(&request);
        if let Some(key) = self.api_key.as_ref() {
            request_builder = request_builder.bearer_auth(key);
        }

        let response = request_builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let raw = String::from_utf8_lossy(&body);
            anyhow::bail!(
                "Ollama API error ({}): {}. Is Ollama running?",
                status,
                super::sanitize_api_error(&raw)
            );
        }

        let parsed: GenerateResponse =
            serde_json::from_slice(&body).context("Failed to parse Ollama response")?;
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn default_url() {
        let p = OllamaProvider::new(None, None, None, Client::new());
        assert_eq!(p.base_url, "http://localhost:11434");
        assert_eq!(p.model, "llama3.2");
    }

    #[test]
    fn custom_url_strips_api_suffix_and_slash() {
        let p = OllamaProvider::new(Some("http://box:11434/api/"), None, None, Client::new());
        assert_eq!(p.base_url, "http://box:11434");
    }

    #[tokio::test]
    async fn generate_posts_non_streaming_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "tinyllama",
                "prompt": "User: hi",
                "stream": false,
                "options": {"num_predict": 120}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "hi there", "done": true})),
            )
            .mount(&server)
            .await;

        let p = OllamaProvider::new(Some(&server.uri()), Some("tinyllama"), None, Client::new());
        let text = p
            .generate("User: hi", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not found"))
            .mount(&server)
            .await;

        let p = OllamaProvider::new(Some(&server.uri()), None, None, Client::new());
        let err = p
            .generate("hi", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }
}
