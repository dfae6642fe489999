//! OpenAI-compatible chat completions as a [`TextGenerator`].
//!
//! Works against OpenAI itself or any server speaking the same
//! `/chat/completions` dialect (Ollama, llama.cpp, vLLM, ...).

use std::time::Duration;

use async_trait::async_trait;
use notefabric_core::config::LlmConfig;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::TextGenerator;
use serde_json::{Value, json};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiCompatibleGenerator {
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleGenerator {
    /// OpenAI proper. API key: `config.api_key` > `OPENAI_API_KEY` > none.
    pub fn openai(config: &LlmConfig) -> Result<Self> {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("OPENAI_API_KEY").unwrap_or_default()
        };
        let base_url = if config.endpoint.is_empty() {
            OPENAI_BASE_URL.to_string()
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };
        Self::build("openai", api_key, base_url, config)
    }

    /// Custom endpoint, e.g. `custom:http://localhost:11434/v1`.
    pub fn custom(provider: &str, config: &LlmConfig) -> Result<Self> {
        let base_url = provider
            .strip_prefix("custom:")
            .unwrap_or(provider)
            .trim_end_matches('/')
            .to_string();
        if base_url.is_empty() {
            return Err(FabricError::Config("custom provider needs a base URL".into()));
        }
        Self::build("custom", config.api_key.clone(), base_url, config)
    }

    fn build(name: &str, api_key: String, base_url: String, config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FabricError::Provider(format!("HTTP client: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            api_key,
            base_url,
            model: config.model.clone(),
            client,
        })
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }

    fn request_body(&self, prompt: &str, context_ids: &[String]) -> Value {
        let mut messages = Vec::new();
        if !context_ids.is_empty() {
            messages.push(json!({
                "role": "system",
                "content": format!("Related notes: {}", context_ids.join(", ")),
            }));
        }
        messages.push(json!({"role": "user", "content": prompt}));
        json!({
            "model": self.model,
            "messages": messages,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &str, context_ids: &[String]) -> Result<String> {
        if self.name == "openai" && self.api_key.is_empty() {
            return Err(FabricError::Provider("openai: API key missing".into()));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, context_ids));
        let resp = self.apply_auth(req).send().await.map_err(|e| {
            if e.is_timeout() {
                FabricError::Timeout(format!("{} request to {url}", self.name))
            } else {
                FabricError::Provider(format!("{} connection failed ({url}): {e}", self.name))
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(FabricError::Provider(format!(
                "{} API error {status}: {text}",
                self.name
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| FabricError::Provider(e.to_string()))?;
        json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .map(String::from)
            .ok_or_else(|| FabricError::Provider("No choices in response".into()))
    }

    async fn fetch_external(&self, source: &str, query: &str) -> Result<Value> {
        if !(source.starts_with("http://") || source.starts_with("https://")) {
            return Err(FabricError::Provider(format!(
                "unsupported external source: {source}"
            )));
        }
        let resp = self
            .client
            .get(source)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FabricError::Timeout(format!("fetch {source}"))
                } else {
                    FabricError::Provider(format!("fetch {source}: {e}"))
                }
            })?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| FabricError::Provider(e.to_string()))?;
        if !status.is_success() {
            return Err(FabricError::Provider(format!("fetch {source}: HTTP {status}")));
        }
        // JSON bodies pass through; anything else is wrapped as text.
        Ok(serde_json::from_str(&text)
            .unwrap_or_else(|_| json!({"source": source, "query": query, "text": text})))
    }
}
