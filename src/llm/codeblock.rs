//! codeblock.rs
//!
//! Markdown fence extraction for model output. Models are told to return
//! raw code, but fenced responses still happen; the rules here are explicit
//! so they can be tested: take the content between the first pair of triple
//! backticks (or the whole text when unfenced), drop the fence info string,
//! trim.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractError {
    ContentEmpty,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::ContentEmpty => write!(f, "script content empty after cleaning code fences"),
        }
    }
}

impl std::error::Error for ExtractError {}

pub fn extract_code_block(raw: &str) -> Result<String, ExtractError> {
    let trimmed = raw.trim();

    let content = match trimmed.find("```") {
        None => trimmed,
        Some(start) => {
            let after = &trimmed[start + 3..];
            let block = match after.find("```") {
                Some(end) => &after[..end],
                None => after,
            };
            // Everything on the opening fence line is the info string
            // (e.g. "python"), not content.
            match block.find('\n') {
                Some(nl) => &block[nl + 1..],
                None => "",
            }
        }
    };

    let content = content.trim();
    if content.is_empty() {
        return Err(ExtractError::ContentEmpty);
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfenced_text_passes_through_trimmed() {
        let out = extract_code_block("  print('hi')\n").unwrap();
        assert_eq!(out, "print('hi')");
    }

    #[test]
    fn language_tag_line_is_dropped() {
        let raw = "```python\nimport sys\nprint(sys.argv)\n```";
        let out = extract_code_block(raw).unwrap();
        assert_eq!(out, "import sys\nprint(sys.argv)");
    }

    #[test]
    fn bare_fence_keeps_code() {
        let raw = "```\nprint('ok')\n```";
        assert_eq!(extract_code_block(raw).unwrap(), "print('ok')");
    }

    #[test]
    fn prose_before_fence_is_ignored() {
        let raw = "Here is the script:\n```python\nx = 1\n```\nhope it helps";
        assert_eq!(extract_code_block(raw).unwrap(), "x = 1");
    }

    #[test]
    fn unterminated_fence_takes_rest() {
        let raw = "```python\nx = 1\ny = 2";
        assert_eq!(extract_code_block(raw).unwrap(), "x = 1\ny = 2");
    }

    #[test]
    fn empty_input_is_content_empty() {
        assert_eq!(extract_code_block("   \n"), Err(ExtractError::ContentEmpty));
        assert_eq!(
            extract_code_block("```python\n```"),
            Err(ExtractError::ContentEmpty)
        );
    }
}
