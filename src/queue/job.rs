//! Job record and its status state machine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ffmpeg::ConversionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Converting,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Forward transitions only. Going back to `Queued` happens through
    /// [`Job::reset_for_retry`].
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Converting)
                | (Self::Queued, Self::Cancelled)
                | (Self::Converting, Self::Completed)
                | (Self::Converting, Self::Failed)
                | (Self::Converting, Self::Cancelled)
        )
    }

    /// Terminal status a finished conversion maps to.
    pub fn for_result(result: &ConversionResult) -> Self {
        if result.success {
            Self::Completed
        } else if result.cancelled {
            Self::Cancelled
        } else {
            Self::Failed
        }
    }
}

/// One queued audio-to-video conversion.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub audio_path: PathBuf,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Job {
    pub fn new(audio_path: impl Into<PathBuf>) -> Self {
        Self {
            audio_path: audio_path.into(),
            status: JobStatus::Queued,
            progress: 0.0,
            output_path: None,
            error_detail: None,
        }
    }

    pub fn audio_path(&self) -> &Path {
        &self.audio_path
    }

    pub fn transition(&mut self, next: JobStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Progress only moves forward, and only while converting.
    pub fn set_progress(&mut self, fraction: f64) {
        if self.status != JobStatus::Converting || !fraction.is_finite() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction > self.progress {
            self.progress = fraction;
        }
    }

    /// Move a converting job to the terminal state described by `result`.
    pub fn record_result(&mut self, result: &ConversionResult) -> Result<(), AppError> {
        self.transition(JobStatus::for_result(result))?;
        self.apply_outcome(result);
        Ok(())
    }

    /// Copy output path or error detail from `result` without touching the status.
    pub fn apply_outcome(&mut self, result: &ConversionResult) {
        if result.success {
            self.progress = 1.0;
            if let Some(path) = &result.output_path {
                self.output_path = Some(path.clone());
            }
            self.error_detail = None;
        } else if !result.cancelled {
            self.error_detail = result.error_message.clone();
        }
    }

    /// Mark a job that will never get a result as failed. Terminal jobs are left alone.
    pub fn abandon(&mut self, detail: &str) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.error_detail = Some(detail.to_string());
    }

    /// Back to `Queued` for another attempt. Completed jobs keep their output.
    pub fn reset_for_retry(&mut self) -> Result<(), AppError> {
        match self.status {
            JobStatus::Queued | JobStatus::Failed | JobStatus::Cancelled => {
                self.status = JobStatus::Queued;
                self.progress = 0.0;
                self.error_detail = None;
                self.output_path = None;
                Ok(())
            }
            other => Err(AppError::InvalidTransition {
                from: other,
                to: JobStatus::Queued,
            }),
        }
    }
}
