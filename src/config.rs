// src/config.rs

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub execution: ExecutionConfig,
    pub interaction: InteractionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub vector_size: usize,
    pub top_k: usize,
    pub min_score: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub interpreter: String,
    pub script_suffix: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub plan_edit_enabled: bool,
    pub plan_edit_wait_secs: u64,
    pub selection_enabled: bool,
    pub selection_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            execution: ExecutionConfig::default(),
            interaction: InteractionConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8077".into(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4".into(),
            api_key: String::new(),
            base_url: None,
            max_tokens: 4000,
            timeout_secs: 60,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:6333".into(),
            api_key: None,
            collection: "madl_methods".into(),
            vector_size: 768,
            top_k: 5,
            min_score: 0.6,
            timeout_secs: 30,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".into(),
            script_suffix: "py".into(),
            timeout_secs: 300,
        }
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            plan_edit_enabled: true,
            plan_edit_wait_secs: 300,
            selection_enabled: true,
            selection_wait_secs: 60,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            catalog_path: None,
        }
    }
}

impl Config {
    /// Load from an explicit path, or fall back to the platform config dir.
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Ok(Self::default()),
        };

        toml::from_str(&raw).map_err(|e| format!("invalid config {}: {}", path.display(), e))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(|| default_app_dir().join("records"))
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.storage
            .catalog_path
            .clone()
            .unwrap_or_else(|| default_app_dir().join("catalog.json"))
    }
}

fn default_app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("testforge")
}

fn default_config_path() -> PathBuf {
    default_app_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = Config::load(Some(Path::new("/nonexistent/testforge.toml"))).unwrap();
        assert_eq!(cfg.execution.timeout_secs, 300);
        assert_eq!(cfg.index.collection, "madl_methods");
        assert_eq!(cfg.index.vector_size, 768);
        assert!(cfg.interaction.selection_enabled);
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let raw = r#"
            [execution]
            interpreter = "python3"

            [interaction]
            selection_wait_secs = 5
        "#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert_eq!(cfg.execution.interpreter, "python3");
        assert_eq!(cfg.execution.timeout_secs, 300);
        assert_eq!(cfg.interaction.selection_wait_secs, 5);
        assert_eq!(cfg.interaction.plan_edit_wait_secs, 300);
        assert_eq!(cfg.index.top_k, 5);
    }

    #[test]
    fn malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[execution\ninterpreter =").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
