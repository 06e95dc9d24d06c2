use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload stored in (and returned from) the similarity index. Identity is
/// the full signature, keyed as `class_name.method_name`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MethodRecord {
    #[serde(default)]
    pub method_name: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub semantic_description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub return_type: String,
    #[serde(default)]
    pub full_signature: String,
    #[serde(default)]
    pub example: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_code: Option<String>,
    #[serde(default)]
    pub stored_at: String,
}

impl MethodRecord {
    pub fn identity_key(&self) -> String {
        format!("{}.{}", self.class_name, self.method_name)
    }

    /// Canonical text the embedding is computed over.
    pub fn embeddable_text(&self) -> String {
        format!(
            "{} {} {} {} {} {} {}",
            self.full_signature,
            self.intent,
            self.semantic_description,
            self.keywords.join(" "),
            self.parameters,
            self.return_type,
            self.example
        )
    }
}

/// A search hit: the stored record plus its similarity score. Candidates
/// are ephemeral; only `MethodRecord`s are durable.
#[derive(Clone, Debug)]
pub struct ScoredMethod {
    pub record: MethodRecord,
    pub score: f32,
}

impl ScoredMethod {
    pub fn match_percentage(&self) -> f32 {
        (self.score * 100.0).min(100.0)
    }

    /// Shape sent to the caller in METHODS_FOUND.
    pub fn summary(&self) -> Value {
        serde_json::json!({
            "signature": self.record.full_signature,
            "intent": self.record.intent,
            "match_percentage": self.match_percentage(),
            "example": self.record.example,
        })
    }
}
