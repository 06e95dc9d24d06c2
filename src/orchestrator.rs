//! orchestrator.rs
//!
//! Top-level session state machine:
//! `STARTED → PLAN_BUILT → REUSE_SEARCHED → [AWAITING_SELECTION]? →
//! GENERATING → EXECUTING → [HEALING]? → PERSISTED → COMPLETED`,
//! short-circuiting to FAILED from any pre-execution stage. Every
//! transition maps onto one outbound protocol event; besides those events
//! the only observable effects are the persisted execution record and, on
//! success, the best-effort reuse-store upsert.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::SessionError;
use crate::executor::run::ScriptEngine;
use crate::healing::HealingController;
use crate::llm::client::LlmClient;
use crate::llm::codeblock::extract_code_block;
use crate::llm::prompt::generation_prompt;
use crate::llm::Completion;
use crate::logger::{LogCategory, LogLevel, SessionLog};
use crate::madl::engine::ReuseEngine;
use crate::madl::extract::store_successful_execution;
use crate::madl::method::ScoredMethod;
use crate::persistence::RecordStore;
use crate::plan::{self, Catalog, TestPlan};
use crate::protocol::{ClientAction, SessionEvent, SessionTransport};
use crate::state::{ExecutionRecord, GeneratedScript, SessionStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Started,
    PlanBuilt,
    ReuseSearched,
    AwaitingSelection,
    Generating,
    Executing,
    Healing,
    Persisted,
    Completed,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Started => "STARTED",
            Stage::PlanBuilt => "PLAN_BUILT",
            Stage::ReuseSearched => "REUSE_SEARCHED",
            Stage::AwaitingSelection => "AWAITING_SELECTION",
            Stage::Generating => "GENERATING",
            Stage::Executing => "EXECUTING",
            Stage::Healing => "HEALING",
            Stage::Persisted => "PERSISTED",
            Stage::Completed => "COMPLETED",
        }
    }
}

/// Injected capability interfaces, constructed once at process start and
/// shared by reference across sessions. No ambient globals.
pub struct Collaborators {
    pub catalog: Arc<dyn Catalog>,
    pub llm: Arc<dyn Completion>,
    pub reuse: Arc<ReuseEngine>,
    pub records: Arc<dyn RecordStore>,
}

#[derive(Clone, Debug)]
pub struct SessionRequest {
    pub testcase_id: String,
    pub script_type: String,
    pub token: Option<String>,
}

pub struct Orchestrator {
    cfg: Config,
    deps: Arc<Collaborators>,
    engine: ScriptEngine,
}

impl Orchestrator {
    pub fn new(cfg: Config, deps: Arc<Collaborators>) -> Self {
        let engine = ScriptEngine::from_config(&cfg.execution);
        Self { cfg, deps, engine }
    }

    /// Drive one session to a terminal state. All faults are absorbed here:
    /// terminal errors become one FAILED event, disconnects tear down
    /// silently. Temp files and child processes are released on every path
    /// by the engine's scoped guards.
    pub fn run_session(&self, transport: &mut dyn SessionTransport, req: &SessionRequest) {
        let mut log = SessionLog::new(&req.testcase_id);

        match self.drive(transport, req, &mut log) {
            Ok(()) => {}
            Err(SessionError::Disconnected) => {
                log.warning(LogCategory::Cleanup, "Client disconnected");
            }
            Err(err) => {
                log.error(category_for(&err), err.to_string());
                let _ = transport.send(&SessionEvent::Failed {
                    error: err.to_string(),
                });
            }
        }

        log.info(LogCategory::Cleanup, "Session closed");
    }

    fn drive(
        &self,
        transport: &mut dyn SessionTransport,
        req: &SessionRequest,
        log: &mut SessionLog,
    ) -> Result<(), SessionError> {
        /* ---------- init ---------- */

        self.transition(log, Stage::Started);
        self.send(
            transport,
            &SessionEvent::Started {
                testcase_id: req.testcase_id.clone(),
            },
        )?;
        log.info(
            LogCategory::Init,
            format!("Execution started for {}", req.testcase_id),
        );

        let script_type = req.script_type.to_lowercase();
        if script_type != "playwright" && script_type != "selenium" {
            return Err(SessionError::InvalidInput(
                "Script type must be 'playwright' or 'selenium'".into(),
            ));
        }

        let testcase = plan::lookup_testcase(&*self.deps.catalog, &req.testcase_id)?;
        plan::authorize(&*self.deps.catalog, req.token.as_deref(), &testcase)?;

        /* ---------- plan ---------- */

        self.send(transport, &SessionEvent::BuildingPlan)?;
        log.info(
            LogCategory::Plan,
            "Building test plan from prerequisites and steps",
        );

        let mut active_plan = plan::build_plan(&*self.deps.catalog, &req.testcase_id)?;
        let mut plan_edited = false;

        self.transition(log, Stage::PlanBuilt);
        self.send(transport, &SessionEvent::PlanReady)?;
        log.success(LogCategory::Plan, "Test plan built successfully");

        if self.cfg.interaction.plan_edit_enabled {
            self.plan_edit_wait(transport, log, &mut active_plan, &mut plan_edited)?;
        }

        /* ---------- reuse search ---------- */

        self.send(transport, &SessionEvent::SearchingMadl)?;
        log.info(LogCategory::Search, "Searching MADL for reusable methods");

        let candidates = self.deps.reuse.search(&active_plan, log);
        self.transition(log, Stage::ReuseSearched);

        let mut selected: Vec<ScoredMethod> = candidates.clone();
        if candidates.is_empty() {
            self.send(transport, &SessionEvent::NoMadlMethods)?;
        } else {
            self.send(
                transport,
                &SessionEvent::MethodsFound {
                    methods: candidates.iter().map(ScoredMethod::summary).collect(),
                },
            )?;

            if self.cfg.interaction.selection_enabled {
                self.transition(log, Stage::AwaitingSelection);
                selected = self.selection_wait(
                    transport,
                    log,
                    &candidates,
                    &mut active_plan,
                    &mut plan_edited,
                )?;
            }
        }

        // The plan is immutable from here on.
        let plan_json = active_plan.to_json();

        /* ---------- generation ---------- */

        self.transition(log, Stage::Generating);
        self.send(transport, &SessionEvent::Generating)?;
        log.info(
            LogCategory::Generation,
            "Starting script generation with the completion collaborator",
        );

        let prompt = generation_prompt(
            &req.testcase_id,
            &script_type,
            "python",
            &plan_json,
            &selected,
        );
        log.push_full(
            LogLevel::Debug,
            LogCategory::Generation,
            "Prompt prepared",
            Some(LlmClient::prompt_hash(&prompt.system, &prompt.user)[..12].to_string()),
            None,
            None,
        );

        let raw = self
            .deps
            .llm
            .complete(&prompt.system, &prompt.user)
            .map_err(SessionError::Generation)?;
        let mut script = GeneratedScript::original(
            extract_code_block(&raw).map_err(|e| SessionError::Generation(e.to_string()))?,
        );
        log.success(
            LogCategory::Generation,
            format!("Script generated ({} bytes)", script.text.len()),
        );

        /* ---------- execution ---------- */

        self.transition(log, Stage::Executing);
        self.send(transport, &SessionEvent::Executing)?;
        log.info(LogCategory::Execution, "Executing generated script");

        let mut run = self
            .engine
            .start(&script.text)
            .map_err(SessionError::Engine)?;
        while let Some(line) = run.next_line() {
            self.send(transport, &SessionEvent::Running { log: line })?;
        }
        let mut outcome = run.finish();

        /* ---------- healing ---------- */

        let mut message;
        if outcome.status.is_success() {
            message = "Script executed successfully".to_string();
            log.success(LogCategory::Execution, message.clone());
        } else {
            log.error(LogCategory::Execution, outcome.failure_summary());

            self.transition(log, Stage::Healing);
            self.send(
                transport,
                &SessionEvent::AutoHealing {
                    log: "Script execution failed. Starting auto-healing with context...".into(),
                },
            )?;

            let controller = HealingController::new(&*self.deps.llm, &self.engine);
            match controller.heal_and_rerun(&plan_json, &script, &outcome, log, |line| {
                transport.send(&SessionEvent::Running {
                    log: format!("[AUTO-HEALED] {}", line),
                })
            }) {
                Ok((healed_script, healed_outcome)) => {
                    script = healed_script;
                    outcome = healed_outcome;
                    message = if outcome.status.is_success() {
                        "[AUTO-HEALED] Script executed successfully after self-healing".into()
                    } else {
                        "[AUTO-HEALED] Script failed even after self-healing".into()
                    };
                }
                Err(SessionError::Healing(msg)) => {
                    // Terminal: no second repair. The original run's output
                    // stays in the record; the failure trail is in the log.
                    message = msg;
                }
                Err(other) => return Err(other),
            }
        }

        /* ---------- persistence ---------- */

        let final_status = if outcome.status.is_success() {
            SessionStatus::Success
        } else {
            SessionStatus::Failed
        };

        let record = ExecutionRecord::new(
            &req.testcase_id,
            &script_type,
            message.clone(),
            outcome.output.clone(),
            final_status,
        );
        let exeid = self
            .deps
            .records
            .insert(&record)
            .map_err(SessionError::Persistence)?;

        self.transition(log, Stage::Persisted);
        log.info(
            LogCategory::Storage,
            format!("Execution record {} saved", exeid),
        );

        /* ---------- reuse store (success only, best-effort) ---------- */

        if final_status == SessionStatus::Success {
            log.info(
                LogCategory::Storage,
                "Extracting MADL data from successful execution",
            );

            match store_successful_execution(
                &self.deps.reuse,
                &*self.deps.llm,
                &req.testcase_id,
                &script.text,
                &active_plan,
                log,
            ) {
                Ok(key) => {
                    log.success(
                        LogCategory::Storage,
                        format!("Stored reusable method {}", key),
                    );
                    self.send(transport, &SessionEvent::StorageSuccess)?;
                }
                Err(e) => {
                    log.warning(LogCategory::Storage, format!("MADL storage error: {}", e));
                }
            }
        }

        /* ---------- completed ---------- */

        self.transition(log, Stage::Completed);
        self.send(
            transport,
            &SessionEvent::Completed {
                final_status,
                message,
                summary: log.summary(),
            },
        )?;
        log.success(LogCategory::Init, "Execution completed");

        Ok(())
    }

    /// Optional plan-edit wait: offer the built plan for review, accept one
    /// edit or an explicit skip, fall back to the original on deadline.
    fn plan_edit_wait(
        &self,
        transport: &mut dyn SessionTransport,
        log: &mut SessionLog,
        active_plan: &mut TestPlan,
        plan_edited: &mut bool,
    ) -> Result<(), SessionError> {
        let plan_value =
            serde_json::to_value(&*active_plan).map_err(|e| SessionError::PlanBuild(e.to_string()))?;
        self.send(transport, &SessionEvent::TestplanReady { plan: plan_value })?;

        let deadline = Duration::from_secs(self.cfg.interaction.plan_edit_wait_secs);
        let started = Instant::now();

        loop {
            let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
                self.send(transport, &SessionEvent::TestplanEditTimeout)?;
                log.warning(LogCategory::Plan, "Plan edit wait timed out; using original");
                return Ok(());
            };

            match transport
                .wait_action(remaining)
                .map_err(|_| SessionError::Disconnected)?
            {
                Some(ClientAction::UpdateTestplan { testplan }) => {
                    match TestPlan::from_edit(&testplan) {
                        Some(edited) => {
                            *active_plan = edited;
                            *plan_edited = true;
                            self.send(transport, &SessionEvent::TestplanUpdated)?;
                            log.info(LogCategory::Plan, "Edited testplan received");
                        }
                        None => {
                            self.send(transport, &SessionEvent::TestplanSkipped)?;
                            log.warning(
                                LogCategory::Plan,
                                "Edited testplan invalid; keeping original",
                            );
                        }
                    }
                    return Ok(());
                }
                Some(
                    ClientAction::SkipEdit | ClientAction::SkipMethods | ClientAction::Continue,
                ) => {
                    self.send(transport, &SessionEvent::TestplanSkipped)?;
                    log.info(LogCategory::Plan, "Client skipped plan editing");
                    return Ok(());
                }
                // Selection has not been offered yet; ignore and keep waiting.
                Some(ClientAction::ConfirmSelection { .. }) => continue,
                None => {
                    self.send(transport, &SessionEvent::TestplanEditTimeout)?;
                    log.warning(LogCategory::Plan, "Plan edit wait timed out; using original");
                    return Ok(());
                }
            }
        }
    }

    /// Method-selection wait. Resolution rules: an explicit selection keeps
    /// the chosen subset; `skip_methods` declines reuse entirely;
    /// `continue`/`skip_edit` and the deadline keep the unfiltered
    /// candidate set. A plan edit is still honored here if none happened
    /// earlier.
    fn selection_wait(
        &self,
        transport: &mut dyn SessionTransport,
        log: &mut SessionLog,
        candidates: &[ScoredMethod],
        active_plan: &mut TestPlan,
        plan_edited: &mut bool,
    ) -> Result<Vec<ScoredMethod>, SessionError> {
        let deadline = Duration::from_secs(self.cfg.interaction.selection_wait_secs);
        let started = Instant::now();

        loop {
            let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
                self.send(transport, &SessionEvent::SelectionTimeout)?;
                log.warning(LogCategory::Search, "Method selection timeout");
                return Ok(candidates.to_vec());
            };

            match transport
                .wait_action(remaining)
                .map_err(|_| SessionError::Disconnected)?
            {
                Some(ClientAction::ConfirmSelection { selected_methods }) => {
                    let selected: Vec<ScoredMethod> = candidates
                        .iter()
                        .filter(|m| selected_methods.contains(&m.record.full_signature))
                        .cloned()
                        .collect();
                    self.send(
                        transport,
                        &SessionEvent::SelectionConfirmed {
                            count: selected.len(),
                        },
                    )?;
                    log.info(
                        LogCategory::Search,
                        format!("User selected {} methods", selected.len()),
                    );
                    return Ok(selected);
                }
                Some(ClientAction::SkipMethods) => {
                    log.info(LogCategory::Search, "Client declined reusable methods");
                    return Ok(Vec::new());
                }
                Some(ClientAction::SkipEdit | ClientAction::Continue) => {
                    log.info(
                        LogCategory::Search,
                        "Client skipped selection; using all found methods",
                    );
                    return Ok(candidates.to_vec());
                }
                Some(ClientAction::UpdateTestplan { testplan }) if !*plan_edited => {
                    if let Some(edited) = TestPlan::from_edit(&testplan) {
                        *active_plan = edited;
                        *plan_edited = true;
                        self.send(transport, &SessionEvent::TestplanUpdated)?;
                        log.info(LogCategory::Plan, "Edited testplan received");
                    }
                    // Still awaiting a selection decision.
                    continue;
                }
                Some(ClientAction::UpdateTestplan { .. }) => continue,
                None => {
                    self.send(transport, &SessionEvent::SelectionTimeout)?;
                    log.warning(LogCategory::Search, "Method selection timeout");
                    return Ok(candidates.to_vec());
                }
            }
        }
    }

    fn send(
        &self,
        transport: &mut dyn SessionTransport,
        event: &SessionEvent,
    ) -> Result<(), SessionError> {
        transport.send(event).map_err(|_| SessionError::Disconnected)
    }

    fn transition(&self, log: &mut SessionLog, stage: Stage) {
        log.push_full(
            LogLevel::Debug,
            LogCategory::Init,
            format!("Stage {}", stage.as_str()),
            Some(stage.as_str().to_string()),
            None,
            None,
        );
    }
}

fn category_for(err: &SessionError) -> LogCategory {
    match err {
        SessionError::Authorization(_)
        | SessionError::NotFound(_)
        | SessionError::InvalidInput(_) => LogCategory::Init,
        SessionError::PlanBuild(_) => LogCategory::Plan,
        SessionError::Generation(_) => LogCategory::Generation,
        SessionError::Healing(_) => LogCategory::Healing,
        SessionError::Persistence(_) => LogCategory::Storage,
        SessionError::Engine(_) => LogCategory::Execution,
        SessionError::Disconnected => LogCategory::Cleanup,
    }
}
