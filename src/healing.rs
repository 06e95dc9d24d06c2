//! healing.rs
//!
//! Self-healing controller. One failing run gets exactly one
//! repair-and-retry cycle:
//! `ExecutedFailed → ContextCollected → HealingRequested → HealedExecuted`.
//! A healed script that fails again is terminal; there is no second repair.

use regex::Regex;

use crate::error::SessionError;
use crate::executor::run::ScriptEngine;
use crate::llm::codeblock::extract_code_block;
use crate::llm::prompt::healing_prompt;
use crate::llm::Completion;
use crate::logger::{LogCategory, SessionLog};
use crate::state::{ExecutionOutcome, GeneratedScript};

const MAX_HEADLINE_PATTERNS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HealPhase {
    ExecutedFailed,
    ContextCollected,
    HealingRequested,
    HealedExecuted,
}

impl HealPhase {
    fn as_str(&self) -> &'static str {
        match self {
            HealPhase::ExecutedFailed => "EXECUTED_FAILED",
            HealPhase::ContextCollected => "CONTEXT_COLLECTED",
            HealPhase::HealingRequested => "HEALING_REQUESTED",
            HealPhase::HealedExecuted => "HEALED_EXECUTED",
        }
    }
}

/* ---------- diagnostic context ---------- */

#[derive(Clone, Debug)]
pub struct ErrorContext {
    pub execution_logs: String,
    pub testplan: String,
    pub script: String,
    pub error_patterns: Vec<String>,
    pub failed_actions: Vec<String>,
}

/// Best-effort scan of the failure output. Headline patterns are the first
/// few lines carrying a failure-indicating token.
pub fn collect_error_context(logs: &str, testplan: &str, script: &str) -> ErrorContext {
    let failure_token = Regex::new(r"(?i)error|failed|exception").expect("static pattern");
    let action_token = Regex::new(r"(?i)failed|exception").expect("static pattern");

    let error_patterns = logs
        .lines()
        .filter(|line| failure_token.is_match(line))
        .take(MAX_HEADLINE_PATTERNS)
        .map(str::to_string)
        .collect();

    let failed_actions = logs
        .lines()
        .filter(|line| action_token.is_match(line))
        .map(|line| line.trim().to_string())
        .collect();

    ErrorContext {
        execution_logs: logs.to_string(),
        testplan: testplan.to_string(),
        script: script.to_string(),
        error_patterns,
        failed_actions,
    }
}

/* ---------- controller ---------- */

pub struct HealingController<'a> {
    llm: &'a dyn Completion,
    engine: &'a ScriptEngine,
}

impl<'a> HealingController<'a> {
    pub fn new(llm: &'a dyn Completion, engine: &'a ScriptEngine) -> Self {
        Self { llm, engine }
    }

    /// Drive one full healing cycle for a failed run. `on_line` mirrors the
    /// healed run's output to the caller; its error means the caller is
    /// gone. Returns the healed script and its outcome; deciding whether a
    /// second failure is terminal belongs to the orchestrator, a second
    /// repair is never attempted here.
    pub fn heal_and_rerun(
        &self,
        plan_json: &str,
        failing: &GeneratedScript,
        failed_outcome: &ExecutionOutcome,
        log: &mut SessionLog,
        mut on_line: impl FnMut(&str) -> Result<(), String>,
    ) -> Result<(GeneratedScript, ExecutionOutcome), SessionError> {
        let original_failure = failed_outcome.failure_summary();
        self.transition(log, HealPhase::ExecutedFailed, &original_failure);

        let ctx = collect_error_context(&failed_outcome.output, plan_json, &failing.text);
        self.transition(
            log,
            HealPhase::ContextCollected,
            format!(
                "{} headline patterns, {} failed actions",
                ctx.error_patterns.len(),
                ctx.failed_actions.len()
            ),
        );

        self.transition(log, HealPhase::HealingRequested, "Invoking repair collaborator");
        let prompt = healing_prompt(&ctx.testplan, &ctx.script, &ctx.execution_logs);
        let healed_text = self
            .llm
            .complete(&prompt.system, &prompt.user)
            .and_then(|raw| extract_code_block(&raw).map_err(|e| e.to_string()))
            .map_err(|e| {
                log.error(
                    LogCategory::Healing,
                    format!("Healing failed: {}", e),
                );
                SessionError::Healing(format!("{}; healing failed: {}", original_failure, e))
            })?;

        let healed = GeneratedScript::healed(healed_text);

        self.transition(log, HealPhase::HealedExecuted, "Executing healed script");
        let mut run = self
            .engine
            .start(&healed.text)
            .map_err(SessionError::Engine)?;

        while let Some(line) = run.next_line() {
            if on_line(&line).is_err() {
                return Err(SessionError::Disconnected);
            }
        }
        let outcome = run.finish();

        if outcome.status.is_success() {
            log.success(
                LogCategory::Healing,
                "Healed script executed successfully",
            );
        } else {
            log.error(LogCategory::Healing, "Healed script still failed");
        }

        Ok((healed, outcome))
    }

    fn transition(&self, log: &mut SessionLog, phase: HealPhase, detail: impl Into<String>) {
        log.push_full(
            crate::logger::LogLevel::Info,
            LogCategory::Healing,
            detail,
            Some(phase.as_str().to_string()),
            None,
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ExitStatus, ScriptProvenance};
    use std::time::Duration;

    struct CannedHealer(Result<String, String>);

    impl Completion for CannedHealer {
        fn complete(&self, _system: &str, _prompt: &str) -> Result<String, String> {
            self.0.clone()
        }
    }

    fn sh_engine() -> ScriptEngine {
        ScriptEngine::new("sh", "sh", Duration::from_secs(10))
    }

    fn failed_outcome(output: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            status: ExitStatus::Failed(2),
            output: output.to_string(),
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn headline_patterns_are_case_insensitive_and_capped() {
        let mut logs = String::new();
        for i in 0..15 {
            logs.push_str(&format!("Action step{} FAILED due to: boom\n", i));
        }
        logs.push_str("an ordinary line\nsome Exception was raised\n");

        let ctx = collect_error_context(&logs, "{}", "script");
        assert_eq!(ctx.error_patterns.len(), 10);
        assert_eq!(ctx.failed_actions.len(), 16);
        assert!(!ctx.error_patterns.iter().any(|l| l.contains("ordinary")));
    }

    #[test]
    fn healed_script_success_replaces_outcome() {
        let healer = CannedHealer(Ok("```python\necho healed\nexit 0\n```".into()));
        let engine = sh_engine();
        let controller = HealingController::new(&healer, &engine);
        let mut log = SessionLog::new("TC0001");
        let mut mirrored = Vec::new();

        let failing = GeneratedScript::original("exit 2".into());
        let (healed, outcome) = controller
            .heal_and_rerun(
                "{}",
                &failing,
                &failed_outcome("Action failed due to: selector"),
                &mut log,
                |line| {
                    mirrored.push(line.to_string());
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(healed.provenance, ScriptProvenance::Healed);
        assert_eq!(outcome.status, ExitStatus::Success);
        assert_eq!(outcome.output, "healed\n");
        assert_eq!(mirrored, ["healed"]);
    }

    #[test]
    fn repair_collaborator_error_preserves_original_failure() {
        let healer = CannedHealer(Err("model unavailable".into()));
        let engine = sh_engine();
        let controller = HealingController::new(&healer, &engine);
        let mut log = SessionLog::new("TC0001");

        let failing = GeneratedScript::original("exit 2".into());
        let err = controller
            .heal_and_rerun("{}", &failing, &failed_outcome("boom"), &mut log, |_| Ok(()))
            .unwrap_err();

        match err {
            SessionError::Healing(msg) => {
                assert!(msg.contains("Script exited with code 2"));
                assert!(msg.contains("model unavailable"));
            }
            other => panic!("expected healing error, got {}", other),
        }
    }

    #[test]
    fn empty_repair_output_is_a_healing_error() {
        let healer = CannedHealer(Ok("```python\n```".into()));
        let engine = sh_engine();
        let controller = HealingController::new(&healer, &engine);
        let mut log = SessionLog::new("TC0001");

        let failing = GeneratedScript::original("exit 2".into());
        let err = controller
            .heal_and_rerun("{}", &failing, &failed_outcome("boom"), &mut log, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, SessionError::Healing(_)));
    }

    #[test]
    fn healed_failure_is_returned_not_retried() {
        let healer = CannedHealer(Ok("echo still bad\nexit 1".into()));
        let engine = sh_engine();
        let controller = HealingController::new(&healer, &engine);
        let mut log = SessionLog::new("TC0001");

        let failing = GeneratedScript::original("exit 2".into());
        let (_, outcome) = controller
            .heal_and_rerun("{}", &failing, &failed_outcome("boom"), &mut log, |_| Ok(()))
            .unwrap();

        assert_eq!(outcome.status, ExitStatus::Failed(1));
        assert!(outcome.output.contains("still bad"));
    }
}
