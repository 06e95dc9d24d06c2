//! plan.rs
//!
//! Test-plan assembly. A plan is the ordered steps (with arguments) of a
//! test case plus its prerequisite chain, built from the catalog
//! collaborator. Step order is preserved; a step is deduplicated only by
//! (test case, step) identity.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/* ---------- plan ---------- */

/// Canonical plan schema. Exactly these three snake_case keys; an edited
/// plan missing any of them is rejected and the original kept.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestPlan {
    pub pretestid_steps: IndexMap<String, IndexMap<String, String>>,
    pub current_testid: String,
    pub current_bdd_steps: IndexMap<String, String>,
}

impl TestPlan {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }

    /// Parse a caller-edited plan. Returns None when the payload does not
    /// conform to the canonical schema.
    pub fn from_edit(value: &serde_json::Value) -> Option<TestPlan> {
        serde_json::from_value(value.clone()).ok()
    }
}

/* ---------- catalog collaborator ---------- */

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestCaseInfo {
    pub testcaseid: String,
    #[serde(default)]
    pub pretestid: Option<String>,
    #[serde(default)]
    pub projects: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepRow {
    pub steps: Vec<String>,
    pub args: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub userid: String,
    pub token: String,
    #[serde(default)]
    pub projects: Vec<String>,
}

/// Upstream source of test cases, steps, and user access. External storage
/// is out of scope; the core depends only on this contract.
pub trait Catalog: Send + Sync {
    fn testcase(&self, id: &str) -> Result<Option<TestCaseInfo>, String>;
    fn steps(&self, id: &str) -> Result<Option<StepRow>, String>;
    fn resolve_token(&self, token: &str) -> Result<Option<UserInfo>, String>;
}

/* ---------- authorization ---------- */

/// Token and project-access check. Short-circuits before any side effect.
pub fn authorize(
    catalog: &dyn Catalog,
    token: Option<&str>,
    testcase: &TestCaseInfo,
) -> Result<UserInfo, SessionError> {
    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => {
            return Err(SessionError::Authorization(
                "Authorization token missing".into(),
            ))
        }
    };

    let user = catalog
        .resolve_token(token)
        .map_err(SessionError::Authorization)?
        .ok_or_else(|| SessionError::Authorization("Invalid token".into()))?;

    let allowed = testcase.projects.iter().any(|p| user.projects.contains(p));
    if !allowed {
        return Err(SessionError::Authorization(
            "Unauthorized test case access".into(),
        ));
    }

    Ok(user)
}

/* ---------- assembly ---------- */

pub fn lookup_testcase(
    catalog: &dyn Catalog,
    testcase_id: &str,
) -> Result<TestCaseInfo, SessionError> {
    catalog
        .testcase(testcase_id)
        .map_err(SessionError::PlanBuild)?
        .ok_or_else(|| SessionError::NotFound("Test case not found".into()))
}

/// Build the plan for one test case: prerequisite steps first (in chain
/// order), then the test case's own steps.
pub fn build_plan(catalog: &dyn Catalog, testcase_id: &str) -> Result<TestPlan, SessionError> {
    let chain = prereq_chain(catalog, testcase_id)?;

    let mut plan = TestPlan {
        pretestid_steps: IndexMap::new(),
        current_testid: testcase_id.to_string(),
        current_bdd_steps: IndexMap::new(),
    };

    for tc_id in &chain[..chain.len().saturating_sub(1)] {
        if let Some(row) = catalog.steps(tc_id).map_err(SessionError::PlanBuild)? {
            plan.pretestid_steps
                .insert(tc_id.clone(), zip_steps(tc_id, &row)?);
        }
    }

    if let Some(row) = catalog.steps(testcase_id).map_err(SessionError::PlanBuild)? {
        plan.current_bdd_steps = zip_steps(testcase_id, &row)?;
    }

    Ok(plan)
}

/// All prerequisite test cases in execution order, ending with the test
/// case itself. The visited set makes prerequisite cycles terminate.
fn prereq_chain(catalog: &dyn Catalog, testcase_id: &str) -> Result<Vec<String>, SessionError> {
    let mut visited = std::collections::HashSet::new();
    let mut chain = Vec::new();
    walk_chain(catalog, testcase_id, &mut visited, &mut chain)?;
    Ok(chain)
}

fn walk_chain(
    catalog: &dyn Catalog,
    testcase_id: &str,
    visited: &mut std::collections::HashSet<String>,
    chain: &mut Vec<String>,
) -> Result<(), SessionError> {
    if !visited.insert(testcase_id.to_string()) {
        return Ok(());
    }

    let info = catalog
        .testcase(testcase_id)
        .map_err(SessionError::PlanBuild)?;

    if let Some(info) = info {
        if let Some(pre) = &info.pretestid {
            if !pre.is_empty() {
                walk_chain(catalog, pre, visited, chain)?;
            }
        }
    }

    chain.push(testcase_id.to_string());
    Ok(())
}

fn zip_steps(tc_id: &str, row: &StepRow) -> Result<IndexMap<String, String>, SessionError> {
    if row.steps.len() != row.args.len() {
        return Err(SessionError::PlanBuild(format!(
            "step count ({}) != argument count ({}) for {}",
            row.steps.len(),
            row.args.len(),
            tc_id
        )));
    }

    let mut map = IndexMap::new();
    for (step, arg) in row.steps.iter().zip(row.args.iter()) {
        map.insert(step.clone(), arg.clone());
    }
    Ok(map)
}

/* ---------- JSON-backed catalog ---------- */

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    users: Vec<UserInfo>,
    #[serde(default)]
    testcases: Vec<CatalogTestCase>,
}

#[derive(Debug, Deserialize)]
struct CatalogTestCase {
    testcaseid: String,
    #[serde(default)]
    pretestid: Option<String>,
    #[serde(default)]
    projects: Vec<String>,
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default)]
    args: Vec<String>,
}

/// File-backed catalog for standalone deployments and tests.
pub struct JsonCatalog {
    file: CatalogFile,
}

impl JsonCatalog {
    pub fn load(path: &std::path::Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read catalog {}: {}", path.display(), e))?;
        let file: CatalogFile =
            serde_json::from_str(&raw).map_err(|e| format!("invalid catalog: {}", e))?;
        Ok(Self { file })
    }
}

impl Catalog for JsonCatalog {
    fn testcase(&self, id: &str) -> Result<Option<TestCaseInfo>, String> {
        Ok(self
            .file
            .testcases
            .iter()
            .find(|tc| tc.testcaseid == id)
            .map(|tc| TestCaseInfo {
                testcaseid: tc.testcaseid.clone(),
                pretestid: tc.pretestid.clone(),
                projects: tc.projects.clone(),
            }))
    }

    fn steps(&self, id: &str) -> Result<Option<StepRow>, String> {
        Ok(self
            .file
            .testcases
            .iter()
            .find(|tc| tc.testcaseid == id && !tc.steps.is_empty())
            .map(|tc| StepRow {
                steps: tc.steps.clone(),
                args: tc.args.clone(),
            }))
    }

    fn resolve_token(&self, token: &str) -> Result<Option<UserInfo>, String> {
        Ok(self.file.users.iter().find(|u| u.token == token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemCatalog {
        cases: Vec<(TestCaseInfo, StepRow)>,
    }

    impl Catalog for MemCatalog {
        fn testcase(&self, id: &str) -> Result<Option<TestCaseInfo>, String> {
            Ok(self
                .cases
                .iter()
                .find(|(tc, _)| tc.testcaseid == id)
                .map(|(tc, _)| tc.clone()))
        }

        fn steps(&self, id: &str) -> Result<Option<StepRow>, String> {
            Ok(self
                .cases
                .iter()
                .find(|(tc, _)| tc.testcaseid == id)
                .map(|(_, row)| row.clone()))
        }

        fn resolve_token(&self, _token: &str) -> Result<Option<UserInfo>, String> {
            Ok(None)
        }
    }

    fn case(id: &str, pre: Option<&str>, steps: &[(&str, &str)]) -> (TestCaseInfo, StepRow) {
        (
            TestCaseInfo {
                testcaseid: id.into(),
                pretestid: pre.map(String::from),
                projects: vec!["PJ0001".into()],
            },
            StepRow {
                steps: steps.iter().map(|(s, _)| s.to_string()).collect(),
                args: steps.iter().map(|(_, a)| a.to_string()).collect(),
            },
        )
    }

    #[test]
    fn plan_orders_prereqs_before_current() {
        let catalog = MemCatalog {
            cases: vec![
                case("TC0001", None, &[("Open site", "https://example.test")]),
                case("TC0002", Some("TC0001"), &[("Enter credentials", "user/pass")]),
            ],
        };

        let plan = build_plan(&catalog, "TC0002").unwrap();
        assert_eq!(plan.current_testid, "TC0002");
        assert_eq!(plan.pretestid_steps.len(), 1);
        assert!(plan.pretestid_steps.contains_key("TC0001"));
        assert_eq!(
            plan.current_bdd_steps.get("Enter credentials").unwrap(),
            "user/pass"
        );
    }

    #[test]
    fn prereq_cycle_terminates() {
        let catalog = MemCatalog {
            cases: vec![
                case("TC0001", Some("TC0002"), &[("a", "")]),
                case("TC0002", Some("TC0001"), &[("b", "")]),
            ],
        };

        let plan = build_plan(&catalog, "TC0002").unwrap();
        assert_eq!(plan.pretestid_steps.len(), 1);
        assert_eq!(plan.current_bdd_steps.get("b").unwrap(), "");
    }

    #[test]
    fn step_arg_length_mismatch_is_plan_build_error() {
        let catalog = MemCatalog {
            cases: vec![(
                TestCaseInfo {
                    testcaseid: "TC0001".into(),
                    pretestid: None,
                    projects: vec![],
                },
                StepRow {
                    steps: vec!["a".into(), "b".into()],
                    args: vec!["only one".into()],
                },
            )],
        };

        match build_plan(&catalog, "TC0001") {
            Err(SessionError::PlanBuild(msg)) => assert!(msg.contains("step count")),
            other => panic!("expected PlanBuild error, got {:?}", other.map(|p| p.to_json())),
        }
    }

    #[test]
    fn duplicate_steps_within_case_collapse_by_identity() {
        let catalog = MemCatalog {
            cases: vec![case(
                "TC0001",
                None,
                &[("Click", "save"), ("Click", "submit")],
            )],
        };

        // Same (test case, step) identity: last write wins, order preserved.
        let plan = build_plan(&catalog, "TC0001").unwrap();
        assert_eq!(plan.current_bdd_steps.len(), 1);
        assert_eq!(plan.current_bdd_steps.get("Click").unwrap(), "submit");
    }

    #[test]
    fn edited_plan_requires_canonical_keys() {
        let good = serde_json::json!({
            "pretestid_steps": {},
            "current_testid": "TC0009",
            "current_bdd_steps": {"Go": "home"}
        });
        assert!(TestPlan::from_edit(&good).is_some());

        let bad = serde_json::json!({
            "pretestid - steps": {},
            "current testid": "TC0009"
        });
        assert!(TestPlan::from_edit(&bad).is_none());
    }

    #[test]
    fn authorize_rejects_missing_token_and_foreign_project() {
        let tc = TestCaseInfo {
            testcaseid: "TC0001".into(),
            pretestid: None,
            projects: vec!["PJ0002".into()],
        };
        let catalog = MemCatalog { cases: vec![] };

        match authorize(&catalog, None, &tc) {
            Err(SessionError::Authorization(msg)) => {
                assert!(msg.contains("token missing"))
            }
            _ => panic!("expected authorization error"),
        }
    }
}
