// src/madl/index.rs

use std::time::Duration;

use serde_json::Value;

use crate::config::IndexConfig;

#[derive(Clone, Debug)]
pub struct SearchHit {
    pub score: f32,
    pub payload: Value,
}

/// Similarity-index collaborator. An external, concurrently-writable
/// service; the core issues independent searches/upserts and assumes
/// per-point atomicity.
pub trait VectorIndex: Send + Sync {
    fn search(&self, vector: &[f32], top_k: usize, min_score: f32)
        -> Result<Vec<SearchHit>, String>;
    fn upsert(&self, id: u64, vector: &[f32], payload: &Value) -> Result<(), String>;
    fn ensure_collection(&self, vector_size: usize) -> Result<(), String>;
}

/// Qdrant REST client (cosine distance). Supports local and cloud
/// instances via an optional api-key header.
pub struct QdrantIndex {
    base: url::Url,
    collection: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl QdrantIndex {
    pub fn from_config(cfg: &IndexConfig) -> Result<Self, String> {
        let base = url::Url::parse(&cfg.url).map_err(|e| format!("invalid index url: {}", e))?;
        Ok(Self {
            base,
            collection: cfg.collection.clone(),
            api_key: cfg.api_key.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }

    fn endpoint(&self, path: &str) -> Result<String, String> {
        self.base
            .join(path)
            .map(|u| u.to_string())
            .map_err(|e| e.to_string())
    }

    fn client(&self) -> Result<reqwest::blocking::Client, String> {
        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| e.to_string())
    }

    fn apply_key(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("api-key", key.clone()),
            None => req,
        }
    }
}

impl VectorIndex for QdrantIndex {
    fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchHit>, String> {
        let url = self.endpoint(&format!("collections/{}/points/search", self.collection))?;

        let body = serde_json::json!({
            "vector": vector,
            "limit": top_k,
            "score_threshold": min_score,
            "with_payload": true,
        });

        let resp = self
            .apply_key(self.client()?.post(url).json(&body))
            .send()
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        let json: Value = resp.json().map_err(|e| e.to_string())?;

        if !status.is_success() {
            return Err(format!("index search error {}: {}", status, json));
        }

        let hits = json
            .get("result")
            .and_then(Value::as_array)
            .ok_or("index search response parse failure")?
            .iter()
            .filter_map(|point| {
                let score = point.get("score")?.as_f64()? as f32;
                let payload = point.get("payload").cloned().unwrap_or(Value::Null);
                Some(SearchHit { score, payload })
            })
            .collect();

        Ok(hits)
    }

    fn upsert(&self, id: u64, vector: &[f32], payload: &Value) -> Result<(), String> {
        let url = self.endpoint(&format!("collections/{}/points", self.collection))?;

        let body = serde_json::json!({
            "points": [{
                "id": id,
                "vector": vector,
                "payload": payload,
            }]
        });

        let resp = self
            .apply_key(self.client()?.put(url).query(&[("wait", "true")]).json(&body))
            .send()
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        if !status.is_success() {
            let json: Value = resp.json().unwrap_or(Value::Null);
            return Err(format!("index upsert error {}: {}", status, json));
        }

        Ok(())
    }

    fn ensure_collection(&self, vector_size: usize) -> Result<(), String> {
        let url = self.endpoint(&format!("collections/{}", self.collection))?;

        let resp = self
            .apply_key(self.client()?.get(&url))
            .send()
            .map_err(|e| e.to_string())?;

        if resp.status().is_success() {
            return Ok(());
        }

        let body = serde_json::json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine",
            }
        });

        let resp = self
            .apply_key(self.client()?.put(&url).json(&body))
            .send()
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        if !status.is_success() {
            let json: Value = resp.json().unwrap_or(Value::Null);
            return Err(format!("collection create error {}: {}", status, json));
        }

        Ok(())
    }
}
