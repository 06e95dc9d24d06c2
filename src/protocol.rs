//! protocol.rs
//!
//! Message vocabulary of one execution session. Inbound messages carry an
//! `action` tag; every outbound message carries a machine-readable `status`
//! plus a human-readable `log` line (or `error`).

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::SessionStatus;

/* ---------- inbound ---------- */

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    UpdateTestplan {
        testplan: Value,
    },
    SkipEdit,
    ConfirmSelection {
        #[serde(default)]
        selected_methods: Vec<String>,
    },
    SkipMethods,
    Continue,
}

impl ClientAction {
    pub fn parse(raw: &str) -> Option<ClientAction> {
        serde_json::from_str(raw).ok()
    }
}

/* ---------- outbound ---------- */

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started { testcase_id: String },
    BuildingPlan,
    PlanReady,
    TestplanReady { plan: Value },
    TestplanUpdated,
    TestplanSkipped,
    TestplanEditTimeout,
    SearchingMadl,
    MethodsFound { methods: Vec<Value> },
    NoMadlMethods,
    SelectionConfirmed { count: usize },
    SelectionTimeout,
    Generating,
    Executing,
    Running { log: String },
    AutoHealing { log: String },
    StorageSuccess,
    Completed {
        final_status: SessionStatus,
        message: String,
        summary: Value,
    },
    Failed { error: String },
}

impl SessionEvent {
    pub fn status(&self) -> &'static str {
        match self {
            SessionEvent::Started { .. } => "STARTED",
            SessionEvent::BuildingPlan => "BUILDING_PLAN",
            SessionEvent::PlanReady => "PLAN_READY",
            SessionEvent::TestplanReady { .. } => "TESTPLAN_READY",
            SessionEvent::TestplanUpdated => "TESTPLAN_UPDATED",
            SessionEvent::TestplanSkipped => "TESTPLAN_SKIPPED",
            SessionEvent::TestplanEditTimeout => "TESTPLAN_EDIT_TIMEOUT",
            SessionEvent::SearchingMadl => "SEARCHING_MADL",
            SessionEvent::MethodsFound { .. } => "METHODS_FOUND",
            SessionEvent::NoMadlMethods => "NO_MADL_METHODS",
            SessionEvent::SelectionConfirmed { .. } => "SELECTION_CONFIRMED",
            SessionEvent::SelectionTimeout => "SELECTION_TIMEOUT",
            SessionEvent::Generating => "GENERATING",
            SessionEvent::Executing => "EXECUTING",
            SessionEvent::Running { .. } => "RUNNING",
            SessionEvent::AutoHealing { .. } => "AUTO_HEALING",
            SessionEvent::StorageSuccess => "STORAGE_SUCCESS",
            SessionEvent::Completed { .. } => "COMPLETED",
            SessionEvent::Failed { .. } => "FAILED",
        }
    }

    pub fn to_message(&self) -> Value {
        let status = self.status();
        match self {
            SessionEvent::Started { testcase_id } => json!({
                "status": status,
                "log": format!("Execution initialized for {}", testcase_id),
            }),
            SessionEvent::BuildingPlan => json!({
                "status": status,
                "log": "Building test plan...",
            }),
            SessionEvent::PlanReady => json!({
                "status": status,
                "log": "Test plan built",
            }),
            SessionEvent::TestplanReady { plan } => json!({
                "status": status,
                "log": "Test plan ready for review/editing",
                "testplan": plan,
            }),
            SessionEvent::TestplanUpdated => json!({
                "status": status,
                "log": "Edited testplan received",
            }),
            SessionEvent::TestplanSkipped => json!({
                "status": status,
                "log": "Client skipped editing",
            }),
            SessionEvent::TestplanEditTimeout => json!({
                "status": status,
                "log": "Timed out waiting for edited testplan; using original",
            }),
            SessionEvent::SearchingMadl => json!({
                "status": status,
                "log": "Searching MADL for reusable methods...",
            }),
            SessionEvent::MethodsFound { methods } => json!({
                "status": status,
                "methods": methods,
                "log": format!("Found {} reusable methods", methods.len()),
            }),
            SessionEvent::NoMadlMethods => json!({
                "status": status,
                "log": "No reusable MADL methods found",
            }),
            SessionEvent::SelectionConfirmed { count } => json!({
                "status": status,
                "count": count,
            }),
            SessionEvent::SelectionTimeout => json!({
                "status": status,
                "log": "No selection received, proceeding with all found methods",
            }),
            SessionEvent::Generating => json!({
                "status": status,
                "log": "Generating script using AI...",
            }),
            SessionEvent::Executing => json!({
                "status": status,
                "log": "Starting execution...",
            }),
            SessionEvent::Running { log } => json!({
                "status": status,
                "log": log,
            }),
            SessionEvent::AutoHealing { log } => json!({
                "status": status,
                "log": log,
            }),
            SessionEvent::StorageSuccess => json!({
                "status": status,
                "log": "Script stored to MADL for future reuse",
            }),
            SessionEvent::Completed {
                final_status,
                message,
                summary,
            } => json!({
                "status": status,
                "final_status": final_status.as_str(),
                "log": message,
                "summary": summary,
            }),
            SessionEvent::Failed { error } => json!({
                "status": status,
                "error": error,
            }),
        }
    }
}

/* ---------- transport ---------- */

/// One bidirectional caller connection. `Err` from either method means the
/// caller is gone; `Ok(None)` from `wait_action` means the deadline passed
/// without a parseable action (unparseable messages are ignored).
pub trait SessionTransport {
    fn send(&mut self, event: &SessionEvent) -> Result<(), String>;
    fn wait_action(&mut self, deadline: Duration) -> Result<Option<ClientAction>, String>;
}
