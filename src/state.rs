use std::time::Duration;

use serde::{Deserialize, Serialize};

/* ---------- scripts ---------- */

/// Where a script came from. A healing cycle produces a new script with
/// `Healed` provenance; the failing original is kept only for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptProvenance {
    Original,
    Healed,
}

#[derive(Clone, Debug)]
pub struct GeneratedScript {
    pub text: String,
    pub provenance: ScriptProvenance,
}

impl GeneratedScript {
    pub fn original(text: String) -> Self {
        Self {
            text,
            provenance: ScriptProvenance::Original,
        }
    }

    pub fn healed(text: String) -> Self {
        Self {
            text,
            provenance: ScriptProvenance::Healed,
        }
    }
}

/* ---------- execution ---------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failed(i32),
    Timeout,
}

impl ExitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }
}

/// Produced exactly once per script run.
#[derive(Clone, Debug)]
pub struct ExecutionOutcome {
    pub status: ExitStatus,
    pub output: String,
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub fn failure_summary(&self) -> String {
        match self.status {
            ExitStatus::Success => "Script executed successfully".to_string(),
            ExitStatus::Failed(code) => format!("Script exited with code {}", code),
            ExitStatus::Timeout => format!(
                "Script timed out after {:.1}s",
                self.duration.as_secs_f32()
            ),
        }
    }
}

/* ---------- session status ---------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Success => "SUCCESS",
            SessionStatus::Failed => "FAILED",
        }
    }
}

/* ---------- persisted record ---------- */

/// Row shape of the external execution-record store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub exeid: String,
    pub testcaseid: String,
    pub scripttype: String,
    pub datestamp: String,
    pub exetime: String,
    pub message: String,
    pub output: String,
    pub status: SessionStatus,
}

impl ExecutionRecord {
    pub fn new(
        testcaseid: &str,
        scripttype: &str,
        message: String,
        output: String,
        status: SessionStatus,
    ) -> Self {
        let now = chrono::Local::now();
        Self {
            exeid: String::new(),
            testcaseid: testcaseid.to_string(),
            scripttype: scripttype.to_string(),
            datestamp: now.format("%Y-%m-%d").to_string(),
            exetime: now.format("%H:%M:%S").to_string(),
            message,
            output,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_summary_reports_exit_code() {
        let outcome = ExecutionOutcome {
            status: ExitStatus::Failed(3),
            output: String::new(),
            duration: Duration::from_millis(10),
        };
        assert_eq!(outcome.failure_summary(), "Script exited with code 3");
    }

    #[test]
    fn session_status_serializes_upper_case() {
        let json = serde_json::to_string(&SessionStatus::Success).unwrap();
        assert_eq!(json, "\"SUCCESS\"");
    }
}
