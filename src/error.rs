//! App error type for the conversion pipeline.

use std::fmt;
use std::path::PathBuf;

use crate::queue::JobStatus;

/// Which input of a job is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Audio,
    CoverImage,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Audio => f.write_str("Audio file"),
            InputKind::CoverImage => f.write_str("Cover image"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{tool} not found at {}", path.display())]
    ToolNotFound { tool: String, path: PathBuf },

    #[error("{kind} not found: {}", path.display())]
    InputNotFound { kind: InputKind, path: PathBuf },

    #[error("Failed to run FFmpeg: {0}")]
    LaunchFailure(String),

    #[error("FFmpeg exited with code {code}:\n{stderr_tail}")]
    NonZeroExit { code: i32, stderr_tail: String },

    #[error("Output file was not created: {}", path.display())]
    OutputMissing { path: PathBuf },

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid job transition: {from:?} -> {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    NotReady(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn tool_not_found(tool: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::ToolNotFound {
            tool: tool.into(),
            path: path.into(),
        }
    }

    pub fn input_not_found(kind: InputKind, path: impl Into<PathBuf>) -> Self {
        Self::InputNotFound {
            kind,
            path: path.into(),
        }
    }

    pub fn non_zero_exit(code: i32, stderr_tail: impl Into<String>) -> Self {
        Self::NonZeroExit {
            code,
            stderr_tail: stderr_tail.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Encoder exit code, when the error came from a finished encoder process.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Unexpected(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}
