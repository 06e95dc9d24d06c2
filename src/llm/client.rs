// src/llm/client.rs

use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::LlmConfig;
use crate::llm::Completion;

const PROMPT_ABI_VERSION: &str = "v1-bdd-scriptgen";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Anthropic,
}

/// Chat-completion client over blocking reqwest. One instance is built at
/// process start and shared by reference across sessions.
pub struct LlmClient {
    provider: Provider,
    model: String,
    api_key: String,
    base_url: Option<String>,
    max_tokens: u32,
    timeout: Duration,
}

impl LlmClient {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self, String> {
        let provider = match cfg.provider.as_str() {
            "openai" => Provider::OpenAI,
            "anthropic" => Provider::Anthropic,
            other => return Err(format!("Unknown LLM provider: {}", other)),
        };

        Ok(Self {
            provider,
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.clone(),
            max_tokens: cfg.max_tokens,
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }

    /// Stable fingerprint of one request, for log correlation.
    pub fn prompt_hash(system: &str, user: &str) -> String {
        let mut h = Sha256::new();
        h.update(PROMPT_ABI_VERSION.as_bytes());
        h.update(system.as_bytes());
        h.update(user.as_bytes());
        hex::encode(h.finalize())
    }

    fn build_request(
        &self,
        system_message: &str,
        prompt: &str,
    ) -> (String, Vec<(&'static str, String)>, Value) {
        match self.provider {
            Provider::OpenAI => {
                let url = self
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".into());

                let body = serde_json::json!({
                    "model": self.model,
                    "max_tokens": self.max_tokens,
                    "messages": [
                        { "role": "system", "content": system_message },
                        { "role": "user", "content": prompt }
                    ]
                });

                (
                    url,
                    vec![("Authorization", format!("Bearer {}", self.api_key))],
                    body,
                )
            }

            Provider::Anthropic => {
                let url = self
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "https://api.anthropic.com/v1/messages".into());

                let body = serde_json::json!({
                    "model": self.model,
                    "max_tokens": self.max_tokens,
                    "system": system_message,
                    "messages": [
                        { "role": "user", "content": prompt }
                    ]
                });

                (
                    url,
                    vec![
                        ("x-api-key", self.api_key.clone()),
                        ("anthropic-version", "2023-06-01".into()),
                    ],
                    body,
                )
            }
        }
    }

    fn extract_text(&self, v: &Value) -> Result<String, String> {
        match self.provider {
            Provider::OpenAI => v
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_owned())
                .ok_or_else(|| "OpenAI response parse failure".into()),

            Provider::Anthropic => v
                .pointer("/content/0/text")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_owned())
                .ok_or_else(|| "Anthropic response parse failure".into()),
        }
    }
}

impl Completion for LlmClient {
    fn complete(&self, system_message: &str, prompt: &str) -> Result<String, String> {
        let (url, headers, body) = self.build_request(system_message, prompt);

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| e.to_string())?;

        let mut req = client.post(url).json(&body);
        for (k, v) in headers {
            req = req.header(k, v);
        }

        let resp = req.send().map_err(|e| e.to_string())?;
        let status = resp.status();
        let json: Value = resp.json().map_err(|e| e.to_string())?;

        if !status.is_success() {
            return Err(format!("LLM error {}: {}", status, json));
        }

        let text = self.extract_text(&json)?;
        if text.is_empty() {
            return Err("LLM returned empty content".into());
        }

        Ok(text)
    }
}
