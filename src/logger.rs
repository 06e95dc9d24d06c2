//! logger.rs
//!
//! Append-only structured session log. Each orchestration session owns one
//! `SessionLog`; every component appends to it through a `&mut` reference,
//! so entry order is emission order. Entries serialize both machine-readable
//! (JSON) and human-readable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    #[serde(rename = "DEBUG")]
    Debug,
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "ACTION")]
    Action,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Success => "SUCCESS",
            LogLevel::Action => "ACTION",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogCategory {
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "PLAN")]
    Plan,
    #[serde(rename = "SEARCH")]
    Search,
    #[serde(rename = "GENERATION")]
    Generation,
    #[serde(rename = "EXECUTION")]
    Execution,
    #[serde(rename = "HEALING")]
    Healing,
    #[serde(rename = "STORAGE")]
    Storage,
    #[serde(rename = "CLEANUP")]
    Cleanup,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Init => "INIT",
            LogCategory::Plan => "PLAN",
            LogCategory::Search => "SEARCH",
            LogCategory::Generation => "GENERATION",
            LogCategory::Execution => "EXECUTION",
            LogCategory::Healing => "HEALING",
            LogCategory::Storage => "STORAGE",
            LogCategory::Cleanup => "CLEANUP",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

impl LogEntry {
    pub fn to_readable(&self) -> String {
        let mut s = format!(
            "[{}] [{}] [{}] {}",
            self.timestamp,
            self.level.as_str(),
            self.category.as_str(),
            self.message
        );
        if let Some(code) = &self.code {
            s.push_str(&format!(" (Code: {})", code));
        }
        if let Some(ms) = self.duration_ms {
            s.push_str(&format!(" ({:.2}ms)", ms));
        }
        s
    }
}

pub struct SessionLog {
    testcase_id: String,
    entries: Vec<LogEntry>,
    started_at: std::time::Instant,
}

impl SessionLog {
    pub fn new(testcase_id: impl Into<String>) -> Self {
        Self {
            testcase_id: testcase_id.into(),
            entries: Vec::new(),
            started_at: std::time::Instant::now(),
        }
    }

    pub fn push(
        &mut self,
        level: LogLevel,
        category: LogCategory,
        message: impl Into<String>,
    ) -> &LogEntry {
        self.push_full(level, category, message, None, None, None)
    }

    pub fn push_full(
        &mut self,
        level: LogLevel,
        category: LogCategory,
        message: impl Into<String>,
        code: Option<String>,
        details: Option<Value>,
        duration_ms: Option<f64>,
    ) -> &LogEntry {
        self.entries.push(LogEntry {
            timestamp: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            level,
            category,
            message: message.into(),
            code,
            details,
            duration_ms,
        });
        self.entries.last().expect("just pushed")
    }

    pub fn info(&mut self, category: LogCategory, message: impl Into<String>) {
        self.push(LogLevel::Info, category, message);
    }

    pub fn warning(&mut self, category: LogCategory, message: impl Into<String>) {
        self.push(LogLevel::Warning, category, message);
    }

    pub fn error(&mut self, category: LogCategory, message: impl Into<String>) {
        self.push(LogLevel::Error, category, message);
    }

    pub fn success(&mut self, category: LogCategory, message: impl Into<String>) {
        self.push(LogLevel::Success, category, message);
    }

    /// Log one executed test action with timing, as an ACTION entry keyed by
    /// the action name.
    pub fn action(&mut self, action_name: &str, status: &str, duration_ms: Option<f64>) {
        self.push_full(
            LogLevel::Action,
            LogCategory::Execution,
            format!("Action: {} - Status: {}", action_name, status),
            Some(action_name.to_string()),
            None,
            duration_ms,
        );
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn readable(&self) -> String {
        self.entries
            .iter()
            .map(LogEntry::to_readable)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.entries).unwrap_or_else(|_| "[]".into())
    }

    pub fn summary(&self) -> Value {
        let error_count = self
            .entries
            .iter()
            .filter(|e| e.level == LogLevel::Error)
            .count();
        let success_count = self
            .entries
            .iter()
            .filter(|e| e.level == LogLevel::Success)
            .count();

        serde_json::json!({
            "testcase_id": self.testcase_id,
            "total_logs": self.entries.len(),
            "total_time_ms": self.started_at.elapsed().as_secs_f64() * 1000.0,
            "success_count": success_count,
            "error_count": error_count,
            "status": if error_count == 0 { "SUCCESS" } else { "FAILED" },
        })
    }
}
