//! HTTP generator for OpenAI-compatible chat-completion APIs (Groq by default).
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use localrag_core::error::{Error, Result};
use localrag_core::traits::Generator;
use localrag_core::types::ChatMessage;

pub const API_KEY_ENV: &str = "GROQ_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    /// Falls back to `GROQ_API_KEY` when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.7,
            max_tokens: None,
            timeout_secs: 60,
            api_key: None,
        }
    }
}

/// `Generator` that posts to `{base_url}/v1/chat/completions`.
#[derive(Clone)]
pub struct ChatCompletionsGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    settings: LlmSettings,
}

impl ChatCompletionsGenerator {
    /// Build from settings, taking the key from `settings.api_key` or `GROQ_API_KEY`.
    pub fn from_env(settings: LlmSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| Error::InvalidConfig(format!("{} is not set", API_KEY_ENV)))?;
        Self::new(settings, api_key)
    }

    pub fn new(settings: LlmSettings, api_key: impl Into<String>) -> Result<Self> {
        if settings.model.trim().is_empty() {
            return Err(Error::InvalidConfig("llm model is required".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {}", e)))?;
        tracing::info!(model = %settings.model, base_url = %settings.base_url, "chat generator ready");
        Ok(Self { client, base_url: settings.base_url.trim_end_matches('/').to_string(), api_key: api_key.into(), settings })
    }

    pub fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let mut body = json!({
            "model": self.settings.model,
            "messages": messages,
            "temperature": self.settings.temperature,
            "stream": false,
        });
        if let (Some(obj), Some(max)) = (body.as_object_mut(), self.settings.max_tokens) {
            obj.insert("max_tokens".to_string(), json!(max));
        }
        body
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn model_id(&self) -> &str { &self.settings.model }

    async fn generate(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages))
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("chat completion failed ({}): {}", status, text));
        }

        let payload: Value = res.json().await.context("decoding chat completion")?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("chat completion has no message content"))?;
        tracing::debug!(model = %self.settings.model, chars = content.len(), "chat completion received");
        Ok(content.to_string())
    }
}
