// End-to-end orchestration flows over fake collaborators. Scripts run
// through the real execution engine with `sh` as the interpreter.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use testforge::config::Config;
use testforge::llm::Completion;
use testforge::madl::embedding::Embedder;
use testforge::madl::engine::ReuseEngine;
use testforge::madl::index::{SearchHit, VectorIndex};
use testforge::orchestrator::{Collaborators, Orchestrator, SessionRequest};
use testforge::persistence::RecordStore;
use testforge::plan::{Catalog, StepRow, TestCaseInfo, UserInfo};
use testforge::protocol::{ClientAction, SessionEvent, SessionTransport};
use testforge::state::{ExecutionRecord, SessionStatus};

/* ---------- fakes ---------- */

struct FakeTransport {
    sent: Vec<Value>,
    actions: VecDeque<ClientAction>,
}

impl FakeTransport {
    fn new(actions: Vec<ClientAction>) -> Self {
        Self {
            sent: Vec::new(),
            actions: actions.into(),
        }
    }

    fn statuses(&self) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|m| m.get("status"))
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    }

    fn count(&self, status: &str) -> usize {
        self.statuses().iter().filter(|s| *s == status).count()
    }

    fn running_lines(&self) -> Vec<String> {
        self.sent
            .iter()
            .filter(|m| m["status"] == "RUNNING")
            .filter_map(|m| m["log"].as_str())
            .map(str::to_string)
            .collect()
    }

    fn last(&self) -> &Value {
        self.sent.last().expect("no events sent")
    }
}

impl SessionTransport for FakeTransport {
    fn send(&mut self, event: &SessionEvent) -> Result<(), String> {
        self.sent.push(event.to_message());
        Ok(())
    }

    fn wait_action(&mut self, _deadline: Duration) -> Result<Option<ClientAction>, String> {
        Ok(self.actions.pop_front())
    }
}

struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].clone()
    }
}

impl Completion for ScriptedLlm {
    fn complete(&self, _system: &str, prompt: &str) -> Result<String, String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err("no scripted response left".into()))
    }
}

struct FixedEmbedder;

impl Embedder for FixedEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, String> {
        Ok(vec![0.1, 0.2, 0.3])
    }
}

struct MemIndex {
    hits: Vec<SearchHit>,
    upserts: Mutex<Vec<(u64, Value)>>,
}

impl MemIndex {
    fn empty() -> Self {
        Self {
            hits: Vec::new(),
            upserts: Mutex::new(Vec::new()),
        }
    }

    fn with_methods() -> Self {
        let hit = |class: &str, method: &str, score: f32| SearchHit {
            score,
            payload: serde_json::json!({
                "method_name": method,
                "class_name": class,
                "full_signature": format!("{}.{}()", class, method),
                "intent": format!("intent of {}", method),
                "example": format!("{}.{}()", class, method),
            }),
        };
        Self {
            hits: vec![
                hit("LoginService", "login_user", 0.9),
                hit("FormHelper", "fill_form", 0.7),
            ],
            upserts: Mutex::new(Vec::new()),
        }
    }
}

impl VectorIndex for MemIndex {
    fn search(
        &self,
        _vector: &[f32],
        _top_k: usize,
        _min_score: f32,
    ) -> Result<Vec<SearchHit>, String> {
        Ok(self.hits.clone())
    }

    fn upsert(&self, id: u64, _vector: &[f32], payload: &Value) -> Result<(), String> {
        self.upserts.lock().unwrap().push((id, payload.clone()));
        Ok(())
    }

    fn ensure_collection(&self, _vector_size: usize) -> Result<(), String> {
        Ok(())
    }
}

struct MemRecords {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl MemRecords {
    fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }
}

impl RecordStore for MemRecords {
    fn insert(&self, record: &ExecutionRecord) -> Result<String, String> {
        let mut records = self.records.lock().unwrap();
        let exeid = format!("EX{:04}", records.len() + 1);
        let mut stored = record.clone();
        stored.exeid = exeid.clone();
        records.push(stored);
        Ok(exeid)
    }
}

struct MemCatalog;

impl Catalog for MemCatalog {
    fn testcase(&self, id: &str) -> Result<Option<TestCaseInfo>, String> {
        if id == "TC0001" {
            Ok(Some(TestCaseInfo {
                testcaseid: id.into(),
                pretestid: None,
                projects: vec!["PJ0001".into()],
            }))
        } else {
            Ok(None)
        }
    }

    fn steps(&self, id: &str) -> Result<Option<StepRow>, String> {
        if id == "TC0001" {
            Ok(Some(StepRow {
                steps: vec!["Enter credentials".into()],
                args: vec!["user/pass".into()],
            }))
        } else {
            Ok(None)
        }
    }

    fn resolve_token(&self, token: &str) -> Result<Option<UserInfo>, String> {
        if token == "tok" {
            Ok(Some(UserInfo {
                userid: "U01".into(),
                token: token.into(),
                projects: vec!["PJ0001".into()],
            }))
        } else {
            Ok(None)
        }
    }
}

/* ---------- harness ---------- */

struct Harness {
    llm: Arc<ScriptedLlm>,
    index: Arc<MemIndex>,
    records: Arc<MemRecords>,
    orchestrator: Orchestrator,
}

fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.execution.interpreter = "sh".into();
    cfg.execution.script_suffix = "sh".into();
    cfg.execution.timeout_secs = 10;
    cfg.interaction.plan_edit_enabled = false;
    cfg
}

fn harness(cfg: Config, llm: ScriptedLlm, index: MemIndex) -> Harness {
    let llm = Arc::new(llm);
    let index = Arc::new(index);
    let records = Arc::new(MemRecords::new());

    let reuse = Arc::new(ReuseEngine::new(
        Arc::new(FixedEmbedder),
        index.clone(),
        cfg.index.top_k,
        cfg.index.min_score,
    ));

    let deps = Arc::new(Collaborators {
        catalog: Arc::new(MemCatalog),
        llm: llm.clone(),
        reuse,
        records: records.clone(),
    });

    Harness {
        llm,
        index,
        records,
        orchestrator: Orchestrator::new(cfg, deps),
    }
}

fn request(token: Option<&str>) -> SessionRequest {
    SessionRequest {
        testcase_id: "TC0001".into(),
        script_type: "selenium".into(),
        token: token.map(String::from),
    }
}

const METADATA_JSON: &str = r#"{"method_name": "enter_credentials", "intent": "Log in with user/pass", "keywords": ["login"], "class_name": "AutomationHelper"}"#;

/* ---------- scenarios ---------- */

#[test]
fn successful_run_persists_and_stores_reuse_method() {
    let h = harness(
        test_config(),
        ScriptedLlm::new(vec![
            Ok("echo Running action: Enter credentials\nexit 0".into()),
            Ok(METADATA_JSON.into()),
        ]),
        MemIndex::empty(),
    );
    let mut transport = FakeTransport::new(vec![]);

    h.orchestrator.run_session(&mut transport, &request(Some("tok")));

    let statuses = transport.statuses();
    for expected in [
        "STARTED",
        "BUILDING_PLAN",
        "PLAN_READY",
        "SEARCHING_MADL",
        "NO_MADL_METHODS",
        "GENERATING",
        "EXECUTING",
        "RUNNING",
        "STORAGE_SUCCESS",
        "COMPLETED",
    ] {
        assert!(statuses.contains(&expected.to_string()), "missing {}", expected);
    }
    assert_eq!(transport.count("AUTO_HEALING"), 0);

    let last = transport.last();
    assert_eq!(last["status"], "COMPLETED");
    assert_eq!(last["final_status"], "SUCCESS");
    assert!(last["summary"]["total_logs"].as_u64().unwrap() > 0);

    let records = h.records.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, SessionStatus::Success);
    assert!(records[0].output.contains("Enter credentials"));

    // Reuse store invoked exactly once.
    assert_eq!(h.index.upserts.lock().unwrap().len(), 1);
}

#[test]
fn failed_run_heals_once_and_succeeds_with_healed_output() {
    let h = harness(
        test_config(),
        ScriptedLlm::new(vec![
            Ok("echo original failure\nexit 1".into()),
            Ok("echo healed\nexit 0".into()),
            Ok(METADATA_JSON.into()),
        ]),
        MemIndex::empty(),
    );
    let mut transport = FakeTransport::new(vec![]);

    h.orchestrator.run_session(&mut transport, &request(Some("tok")));

    assert_eq!(transport.count("AUTO_HEALING"), 1);
    assert_eq!(transport.last()["final_status"], "SUCCESS");
    assert!(transport.last()["log"]
        .as_str()
        .unwrap()
        .contains("[AUTO-HEALED]"));

    let lines = transport.running_lines();
    assert!(lines.contains(&"original failure".to_string()));
    assert!(lines.contains(&"[AUTO-HEALED] healed".to_string()));

    // The persisted output is the healed run's, not the original's.
    let records = h.records.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].output, "healed\n");
    assert_eq!(records[0].status, SessionStatus::Success);
}

#[test]
fn healing_collaborator_failure_is_terminal_with_original_message() {
    let h = harness(
        test_config(),
        ScriptedLlm::new(vec![
            Ok("echo boom\nexit 2".into()),
            Err("model unavailable".into()),
        ]),
        MemIndex::empty(),
    );
    let mut transport = FakeTransport::new(vec![]);

    h.orchestrator.run_session(&mut transport, &request(Some("tok")));

    // Generation + one healing attempt, nothing more: no re-run, no
    // metadata extraction.
    assert_eq!(h.llm.calls(), 2);

    let last = transport.last();
    assert_eq!(last["status"], "COMPLETED");
    assert_eq!(last["final_status"], "FAILED");
    assert!(last["log"].as_str().unwrap().contains("Script exited with code 2"));

    // Only the original run produced output lines.
    assert!(transport
        .running_lines()
        .iter()
        .all(|l| !l.starts_with("[AUTO-HEALED]")));

    let records = h.records.records.lock().unwrap();
    assert_eq!(records[0].status, SessionStatus::Failed);
    assert!(records[0].output.contains("boom"));
}

#[test]
fn healed_script_failure_is_terminal_without_second_repair() {
    let h = harness(
        test_config(),
        ScriptedLlm::new(vec![
            Ok("exit 1".into()),
            Ok("echo still broken\nexit 5".into()),
        ]),
        MemIndex::empty(),
    );
    let mut transport = FakeTransport::new(vec![]);

    h.orchestrator.run_session(&mut transport, &request(Some("tok")));

    assert_eq!(transport.count("AUTO_HEALING"), 1);
    assert_eq!(h.llm.calls(), 2);
    assert_eq!(transport.last()["final_status"], "FAILED");
    assert!(transport.last()["log"]
        .as_str()
        .unwrap()
        .contains("failed even after self-healing"));

    // Nothing was stored for reuse.
    assert_eq!(h.index.upserts.lock().unwrap().len(), 0);
}

#[test]
fn selection_timeout_proceeds_with_unfiltered_candidates() {
    let h = harness(
        test_config(),
        ScriptedLlm::new(vec![
            Ok("exit 0".into()),
            Ok(METADATA_JSON.into()),
        ]),
        MemIndex::with_methods(),
    );
    // No inbound actions: the selection wait times out.
    let mut transport = FakeTransport::new(vec![]);

    h.orchestrator.run_session(&mut transport, &request(Some("tok")));

    assert_eq!(transport.count("METHODS_FOUND"), 1);
    assert_eq!(transport.count("SELECTION_TIMEOUT"), 1);
    assert_eq!(transport.last()["final_status"], "SUCCESS");

    // Generation saw the full candidate set.
    let gen_prompt = h.llm.prompt(0);
    assert!(gen_prompt.contains("LoginService.login_user()"));
    assert!(gen_prompt.contains("FormHelper.fill_form()"));
}

#[test]
fn confirmed_selection_filters_candidates_for_generation() {
    let h = harness(
        test_config(),
        ScriptedLlm::new(vec![
            Ok("exit 0".into()),
            Ok(METADATA_JSON.into()),
        ]),
        MemIndex::with_methods(),
    );
    let mut transport = FakeTransport::new(vec![ClientAction::ConfirmSelection {
        selected_methods: vec!["LoginService.login_user()".into()],
    }]);

    h.orchestrator.run_session(&mut transport, &request(Some("tok")));

    assert_eq!(transport.count("SELECTION_CONFIRMED"), 1);

    let gen_prompt = h.llm.prompt(0);
    assert!(gen_prompt.contains("LoginService.login_user()"));
    assert!(!gen_prompt.contains("FormHelper.fill_form()"));
}

#[test]
fn skip_methods_declines_reuse_entirely() {
    let h = harness(
        test_config(),
        ScriptedLlm::new(vec![
            Ok("exit 0".into()),
            Ok(METADATA_JSON.into()),
        ]),
        MemIndex::with_methods(),
    );
    let mut transport = FakeTransport::new(vec![ClientAction::SkipMethods]);

    h.orchestrator.run_session(&mut transport, &request(Some("tok")));

    let gen_prompt = h.llm.prompt(0);
    assert!(!gen_prompt.contains("AVAILABLE REUSABLE METHODS"));
}

#[test]
fn plan_edit_replaces_plan_before_generation() {
    let mut cfg = test_config();
    cfg.interaction.plan_edit_enabled = true;

    let h = harness(
        cfg,
        ScriptedLlm::new(vec![
            Ok("exit 0".into()),
            Ok(METADATA_JSON.into()),
        ]),
        MemIndex::empty(),
    );

    let edited = serde_json::json!({
        "pretestid_steps": {},
        "current_testid": "TC0001",
        "current_bdd_steps": { "Open dashboard": "" }
    });
    let mut transport = FakeTransport::new(vec![ClientAction::UpdateTestplan {
        testplan: edited,
    }]);

    h.orchestrator.run_session(&mut transport, &request(Some("tok")));

    assert_eq!(transport.count("TESTPLAN_READY"), 1);
    assert_eq!(transport.count("TESTPLAN_UPDATED"), 1);

    let gen_prompt = h.llm.prompt(0);
    assert!(gen_prompt.contains("Open dashboard"));
    assert!(!gen_prompt.contains("Enter credentials"));
}

#[test]
fn plan_edit_timeout_keeps_original_plan() {
    let mut cfg = test_config();
    cfg.interaction.plan_edit_enabled = true;

    let h = harness(
        cfg,
        ScriptedLlm::new(vec![
            Ok("exit 0".into()),
            Ok(METADATA_JSON.into()),
        ]),
        MemIndex::empty(),
    );
    let mut transport = FakeTransport::new(vec![]);

    h.orchestrator.run_session(&mut transport, &request(Some("tok")));

    assert_eq!(transport.count("TESTPLAN_EDIT_TIMEOUT"), 1);
    assert!(h.llm.prompt(0).contains("Enter credentials"));
}

#[test]
fn missing_token_short_circuits_before_any_side_effect() {
    let h = harness(
        test_config(),
        ScriptedLlm::new(vec![]),
        MemIndex::empty(),
    );
    let mut transport = FakeTransport::new(vec![]);

    h.orchestrator.run_session(&mut transport, &request(None));

    let last = transport.last();
    assert_eq!(last["status"], "FAILED");
    assert!(last["error"].as_str().unwrap().contains("token missing"));

    assert_eq!(h.llm.calls(), 0);
    assert!(h.records.records.lock().unwrap().is_empty());
    assert_eq!(transport.count("BUILDING_PLAN"), 0);
}

#[test]
fn unknown_testcase_fails_with_not_found() {
    let h = harness(test_config(), ScriptedLlm::new(vec![]), MemIndex::empty());
    let mut transport = FakeTransport::new(vec![]);

    let req = SessionRequest {
        testcase_id: "TC9999".into(),
        script_type: "selenium".into(),
        token: Some("tok".into()),
    };
    h.orchestrator.run_session(&mut transport, &req);

    let last = transport.last();
    assert_eq!(last["status"], "FAILED");
    assert_eq!(last["error"], "Test case not found");
}

#[test]
fn unsupported_script_type_is_invalid_input() {
    let h = harness(test_config(), ScriptedLlm::new(vec![]), MemIndex::empty());
    let mut transport = FakeTransport::new(vec![]);

    let req = SessionRequest {
        testcase_id: "TC0001".into(),
        script_type: "cypress".into(),
        token: Some("tok".into()),
    };
    h.orchestrator.run_session(&mut transport, &req);

    let last = transport.last();
    assert_eq!(last["status"], "FAILED");
    assert!(last["error"]
        .as_str()
        .unwrap()
        .contains("'playwright' or 'selenium'"));
}

#[test]
fn reuse_store_failure_never_fails_the_session() {
    // Metadata extraction response is not JSON, so the storage path errors.
    let h = harness(
        test_config(),
        ScriptedLlm::new(vec![
            Ok("exit 0".into()),
            Ok("cannot extract anything useful".into()),
        ]),
        MemIndex::empty(),
    );
    let mut transport = FakeTransport::new(vec![]);

    h.orchestrator.run_session(&mut transport, &request(Some("tok")));

    assert_eq!(transport.last()["final_status"], "SUCCESS");
    assert_eq!(transport.count("STORAGE_SUCCESS"), 0);
    assert_eq!(h.index.upserts.lock().unwrap().len(), 0);

    let records = h.records.records.lock().unwrap();
    assert_eq!(records[0].status, SessionStatus::Success);
}
