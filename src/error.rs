use std::fmt;

/// Session-fatal error taxonomy. Everything here is caught at the
/// orchestrator boundary, logged, and surfaced to the caller before
/// teardown. Reuse-store failures are deliberately absent: they are logged
/// under STORAGE and never change the session outcome.
#[derive(Clone, Debug)]
pub enum SessionError {
    /// Missing/unknown credential, or no access to the test case's project.
    Authorization(String),
    /// Unknown test case.
    NotFound(String),
    /// Malformed request input (e.g. unsupported script type).
    InvalidInput(String),
    /// Catalog collaborator failed while assembling the plan.
    PlanBuild(String),
    /// Generation collaborator failed or produced an empty script.
    Generation(String),
    /// Repair collaborator failed; carries the original failure message.
    Healing(String),
    /// Execution-record store rejected the insert.
    Persistence(String),
    /// Execution engine fault (temp file, spawn). Not a script failure.
    Engine(String),
    /// The caller went away mid-session. Torn down silently.
    Disconnected,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Authorization(msg) => write!(f, "{}", msg),
            SessionError::NotFound(msg) => write!(f, "{}", msg),
            SessionError::InvalidInput(msg) => write!(f, "{}", msg),
            SessionError::PlanBuild(msg) => write!(f, "Failed to build test plan: {}", msg),
            SessionError::Generation(msg) => write!(f, "Script generation failed: {}", msg),
            SessionError::Healing(msg) => write!(f, "{}", msg),
            SessionError::Persistence(msg) => {
                write!(f, "Failed to persist execution record: {}", msg)
            }
            SessionError::Engine(msg) => write!(f, "Execution engine error: {}", msg),
            SessionError::Disconnected => write!(f, "client disconnected"),
        }
    }
}

impl std::error::Error for SessionError {}
