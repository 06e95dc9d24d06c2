use std::time::Duration;

use serde_json::Value;

use crate::config::EmbeddingConfig;

/// Embedding collaborator. Absence or failure degrades reuse search to an
/// empty result set; it is never a hard dependency.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
}

/// HTTP embedding server client (text-embeddings-inference wire shape:
/// POST /embed with {"inputs": ...} returning [[f32]]).
pub struct HttpEmbedder {
    url: String,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn from_config(cfg: &EmbeddingConfig) -> Result<Self, String> {
        let base = url::Url::parse(&cfg.url).map_err(|e| format!("invalid embedding url: {}", e))?;
        let url = base
            .join("embed")
            .map_err(|e| format!("invalid embedding url: {}", e))?;
        Ok(Self {
            url: url.to_string(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| e.to_string())?;

        let resp = client
            .post(&self.url)
            .json(&serde_json::json!({ "inputs": text }))
            .send()
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        let json: Value = resp.json().map_err(|e| e.to_string())?;

        if !status.is_success() {
            return Err(format!("embedding error {}: {}", status, json));
        }

        let vector = json
            .get(0)
            .and_then(Value::as_array)
            .ok_or("embedding response parse failure")?
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or("embedding response parse failure")?;

        if vector.is_empty() {
            return Err("embedding server returned an empty vector".into());
        }

        Ok(vector)
    }
}
