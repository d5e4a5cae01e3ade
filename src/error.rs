//! Shared error-handling helpers used across every module.

use anyhow::{Context, Result};

/// Extension trait for `Result` types, adding consistent "Failed to ..." context.
pub trait ResultExt<T> {
    /// Add context with a standard "Failed to" prefix.
    fn context_op(self, operation: &str) -> Result<T>;

    /// Add context with file path information.
    fn context_path(self, operation: &str, path: &std::path::Path) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context_op(self, operation: &str) -> Result<T> {
        self.context(format!("Failed to {}", operation))
    }

    fn context_path(self, operation: &str, path: &std::path::Path) -> Result<T> {
        self.context(format!("Failed to {} at '{}'", operation, path.display()))
    }
}

/// Error taxonomy for conditions that must be reported to the user but must
/// never abort the interactive loop (SPEC_FULL §7).
#[derive(Debug, thiserror::Error)]
pub enum BishError {
    #[error("unknown control directive: {0}")]
    UnknownDirective(String),
    #[error("unknown macro: @/{0}")]
    UnknownMacro(String),
    #[error("unknown subagent: {0}")]
    UnknownSubagent(String),
    #[error("Error communicating with LLM: {0}")]
    LlmTransport(String),
    #[error("interrupted")]
    Interrupted,
    #[error("configuration error: {0}")]
    Config(String),
}

impl BishError {
    /// Whether this error is an `@?`/signal-style non-fatal interruption.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, BishError::Interrupted)
    }
}
