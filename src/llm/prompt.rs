use crate::madl::method::ScoredMethod;

#[derive(Debug, Clone)]
pub struct LlmPrompt {
    pub system: String,
    pub user: String,
}

/* ============================================================
   Script generation
   ============================================================ */

pub fn generation_prompt(
    testcase_id: &str,
    script_type: &str,
    script_lang: &str,
    plan_json: &str,
    selected_methods: &[ScoredMethod],
) -> LlmPrompt {
    let system = "You are a test automation expert. Generate only executable \
                  Python code with no markdown."
        .to_string();

    let mut user = String::new();

    user.push_str(&format!(
        "Generate a test script for test case ID: {}\n",
        testcase_id
    ));
    user.push_str(&format!(
        "Script type: {}, Language: {}\n",
        script_type, script_lang
    ));
    user.push_str(&format!("Test plan JSON: {}\n", plan_json));

    if !selected_methods.is_empty() {
        user.push_str("\n# AVAILABLE REUSABLE METHODS (from MADL):\n");
        for m in selected_methods {
            user.push_str(&format!(
                "- {}: {}\n",
                m.record.full_signature, m.record.intent
            ));
            user.push_str(&format!("  Example: {}\n", m.record.example));
        }
    }

    user.push_str(
        "\nRequirements:\n\
         - If AVAILABLE REUSABLE METHODS are provided, USE them where applicable\n\
         - Include comments above each action describing the step\n\
         - Don't use pytest\n\
         - Wrap each action in a try-catch block\n\
         - Add print statements with timestamps before and after each action\n\
         - Format: 'Running action: <step> at <timestamp>' and 'Action completed: <step> at <timestamp>'\n\
         - If an action fails, print 'Action <step> failed at <timestamp> due to: <error>'\n\
         - Use appropriate imports and syntax for the chosen script type and language\n\
         - Handle actions like 'Enter credentials' with arguments in 'user/pass' format, split by '/'\n\
         - Output ONLY the code, no additional explanations or markdown\n",
    );

    LlmPrompt { system, user }
}

/* ============================================================
   Self-healing
   ============================================================ */

pub fn healing_prompt(plan_json: &str, script: &str, failure_logs: &str) -> LlmPrompt {
    let system = "You are an expert test automation engineer. Return only valid \
                  Python code."
        .to_string();

    let mut user = String::new();

    user.push_str(
        "You are an expert test automation engineer.\n\
         Self-heal the failing script using all the provided data.\n\n",
    );

    user.push_str("============================================================\n");
    user.push_str("TEST PLAN (BDD)\n");
    user.push_str(plan_json);
    user.push_str("\n============================================================\n\n");

    user.push_str("============================================================\n");
    user.push_str("ORIGINAL GENERATED SCRIPT\n");
    user.push_str(script);
    user.push_str("\n============================================================\n\n");

    user.push_str("============================================================\n");
    user.push_str("EXECUTION LOGS (THE FAILURE)\n");
    user.push_str(failure_logs);
    user.push_str("\n============================================================\n\n");

    user.push_str(
        "RULES:\n\
         1. Identify the root cause of failure.\n\
         2. Fix incorrect selectors / waits / navigation / logic.\n\
         3. Maintain SAME LOG FORMAT:\n\
         - \"Running action:\"\n\
         - \"Action completed:\"\n\
         - \"failed due to:\"\n\
         4. Follow all BDD steps from the test plan.\n\
         5. Output ONLY the corrected final Python script.\n\
         6. NO markdown, NO code fences, ONLY raw Python code.\n",
    );

    LlmPrompt { system, user }
}

/* ============================================================
   Reusable-method metadata extraction
   ============================================================ */

pub fn extraction_prompt(
    testcase_id: &str,
    script: &str,
    plan_json: &str,
    successful_actions: &str,
) -> LlmPrompt {
    let system = "You are a test automation expert. Extract metadata and return \
                  only valid JSON."
        .to_string();

    let mut user = String::new();

    user.push_str(
        "Analyze this successful test script and identify reusable methods/components.\n\n",
    );
    user.push_str(&format!("TEST CASE ID: {}\n\n", testcase_id));
    user.push_str(&format!("SCRIPT:\n{}\n\n", script));
    user.push_str(&format!("SUCCESSFUL ACTIONS:\n{}\n\n", successful_actions));
    user.push_str(&format!("TEST PLAN:\n{}\n\n", plan_json));

    user.push_str(
        "Please extract:\n\
         1. Method Name: What would be a good name for this reusable method?\n\
         2. Intent: What is the high-level purpose?\n\
         3. Keywords: Important keywords (list 5-10)\n\
         4. Semantic Description: Detailed description of what this method does\n\
         5. Parameters: Extracted parameters (if any)\n\
         6. Return Type: What does it return?\n\
         7. Example: Usage example\n\n\
         Format as JSON:\n\
         {\n\
             \"method_name\": \"...\",\n\
             \"intent\": \"...\",\n\
             \"keywords\": [...],\n\
             \"semantic_description\": \"...\",\n\
             \"parameters\": \"...\",\n\
             \"return_type\": \"...\",\n\
             \"example\": \"...\",\n\
             \"class_name\": \"AutomationHelper\",\n\
             \"file_path\": \"generated_methods.py\"\n\
         }\n",
    );

    LlmPrompt { system, user }
}
