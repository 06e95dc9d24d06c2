pub mod client;
pub mod codeblock;
pub mod prompt;

/// Completion collaborator contract. One call, system message plus user
/// prompt in, raw text out. Script generation, healing, and method metadata
/// extraction all go through this seam.
pub trait Completion: Send + Sync {
    fn complete(&self, system_message: &str, prompt: &str) -> Result<String, String>;
}
