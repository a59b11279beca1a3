use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Single structured error shape shared by every ragbench layer.
///
/// `code` is a stable SCREAMING_SNAKE identifier prefixed by subsystem
/// (`CHUNKS_`, `INDEX_`, `LLM_`, ...). `retryable` marks transport failures
/// that may succeed on a later attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach `path=...; err=...` details, the format used for all file errors.
    pub fn with_path(self, path: &Path, err: impl fmt::Display) -> Self {
        self.with_details(format!("path={}; err={}", path.display(), err))
    }

    /// Re-label an error raised by a lower layer under the caller's code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.code.starts_with(prefix)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(d) = self.details.as_deref() {
            write!(f, " ({d})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}
