//! Fenced code block extraction for LLM responses

use thiserror::Error;

const FENCE: &str = "```";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FenceError {
    #[error("opening fence is not followed by a newline")]
    UnterminatedOpening,

    #[error("invalid fence info string: {0:?}")]
    InvalidTag(String),

    #[error("opening fence has no matching closing fence")]
    MissingClosing,

    #[error("fenced block is empty")]
    Empty,
}

/// Return the interior of a response wrapped in a code fence.
///
/// Text that does not start with a fence is returned trimmed. A fence may carry
/// a language tag (```` ```json ````) or be bare. An opening fence without a
/// matching closing fence is an error, not a passthrough.
pub fn strip_code_fence(text: &str) -> Result<&str, FenceError> {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix(FENCE) else {
        return Ok(trimmed);
    };

    let (tag, body) = after_open
        .split_once('\n')
        .ok_or(FenceError::UnterminatedOpening)?;

    let tag = tag.trim();
    if !tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
    {
        return Err(FenceError::InvalidTag(tag.to_string()));
    }

    let interior = body
        .trim_end()
        .strip_suffix(FENCE)
        .ok_or(FenceError::MissingClosing)?
        .trim();

    if interior.is_empty() {
        return Err(FenceError::Empty);
    }

    Ok(interior)
}
