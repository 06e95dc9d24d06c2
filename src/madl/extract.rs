//! extract.rs
//!
//! Turns a successful execution into a durable reusable method: the LLM
//! summarizes the script into method metadata, which is embedded and
//! upserted into the index. Everything here is best-effort telemetry of the
//! happy path; failures are reported to the caller for logging only.

use serde::Deserialize;

use crate::llm::prompt::extraction_prompt;
use crate::llm::Completion;
use crate::logger::{LogCategory, LogLevel, SessionLog};
use crate::madl::engine::ReuseEngine;
use crate::madl::method::MethodRecord;
use crate::plan::TestPlan;

#[derive(Debug, Deserialize)]
struct ExtractedMetadata {
    #[serde(default)]
    method_name: String,
    #[serde(default)]
    intent: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    semantic_description: String,
    #[serde(default)]
    parameters: String,
    #[serde(default)]
    return_type: String,
    #[serde(default)]
    example: String,
    #[serde(default)]
    class_name: String,
    #[serde(default)]
    file_path: String,
}

/// Extract metadata from a successful script and store it. Returns Err for
/// the caller to log under STORAGE; never fails the session.
pub fn store_successful_execution(
    engine: &ReuseEngine,
    llm: &dyn Completion,
    testcase_id: &str,
    script: &str,
    plan: &TestPlan,
    log: &SessionLog,
) -> Result<String, String> {
    let record = extract_method_metadata(llm, testcase_id, script, plan, log)?;
    let key = record.identity_key();
    engine.store(&record)?;
    Ok(key)
}

fn extract_method_metadata(
    llm: &dyn Completion,
    testcase_id: &str,
    script: &str,
    plan: &TestPlan,
    log: &SessionLog,
) -> Result<MethodRecord, String> {
    let successful_actions: Vec<serde_json::Value> = log
        .entries()
        .iter()
        .filter(|e| {
            matches!(e.level, LogLevel::Success | LogLevel::Action)
                && e.category == LogCategory::Execution
                && e.code.is_some()
        })
        .map(|e| {
            serde_json::json!({
                "action": e.code,
                "message": e.message,
                "details": e.details,
            })
        })
        .collect();

    let prompt = extraction_prompt(
        testcase_id,
        script,
        &plan.to_json(),
        &serde_json::to_string(&successful_actions).unwrap_or_else(|_| "[]".into()),
    );

    let response = llm.complete(&prompt.system, &prompt.user)?;

    let json_str =
        json_substring(&response).ok_or("no JSON found in metadata extraction response")?;
    let meta: ExtractedMetadata =
        serde_json::from_str(json_str).map_err(|e| format!("invalid metadata JSON: {}", e))?;

    let method_name = if meta.method_name.is_empty() {
        format!("auto_{}", testcase_id.to_lowercase())
    } else {
        meta.method_name
    };
    let class_name = if meta.class_name.is_empty() {
        "AutomationHelper".to_string()
    } else {
        meta.class_name
    };
    let file_path = if meta.file_path.is_empty() {
        "generated_methods.py".to_string()
    } else {
        meta.file_path
    };

    Ok(MethodRecord {
        full_signature: format!("{}.{}()", class_name, method_name),
        method_name,
        class_name,
        file_path,
        intent: meta.intent,
        semantic_description: meta.semantic_description,
        keywords: meta.keywords,
        parameters: meta.parameters,
        return_type: meta.return_type,
        example: meta.example,
        method_code: Some(script.to_string()),
        stored_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// The model is asked for bare JSON but may wrap it in prose; take the
/// outermost brace pair.
fn json_substring(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&s[start..=end])
}
