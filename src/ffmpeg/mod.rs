mod builder;
pub mod discovery;
pub mod duration;
mod error;
mod progress;
mod runner;

pub use builder::{build_conversion_args, format_args_for_display_multiline};
pub use discovery::{Toolchain, locate_tool};
pub use duration::{DurationProbe, ToolDurationProbe};
pub use error::{FfmpegErrorPayload, STDERR_TAIL_CHARS, parse_ffmpeg_error, stderr_tail};
pub use progress::{ProgressLine, parse_progress_line};
pub use runner::Converter;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_VIDEO_BITRATE: &str = "4000k";
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";
pub const DEFAULT_OUTPUT_EXTENSION: &str = ".mpg";
/// How long a cancelled encoder gets to quit before it is killed.
pub const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound for a caller-supplied termination timeout.
pub const MAX_TERMINATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Encoding parameters shared by every job in a batch.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    /// FFmpeg bitrate string, e.g. "4000k".
    pub video_bitrate: Option<String>,
    pub audio_bitrate: Option<String>,
    pub output_extension: Option<String>,
    pub termination_timeout_ms: Option<u64>,
}

impl ConversionSettings {
    /// Target resolution, rounded down to even dimensions (yuv420p needs both even).
    pub fn effective_resolution(&self) -> (u32, u32) {
        let even = |v: u32| (v & !1).max(2);
        (
            even(self.width.unwrap_or(DEFAULT_WIDTH)),
            even(self.height.unwrap_or(DEFAULT_HEIGHT)),
        )
    }

    pub fn effective_fps(&self) -> u32 {
        self.fps.unwrap_or(DEFAULT_FPS).clamp(1, 120)
    }

    pub fn effective_video_bitrate(&self) -> &str {
        self.video_bitrate
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_VIDEO_BITRATE)
    }

    pub fn effective_audio_bitrate(&self) -> &str {
        self.audio_bitrate
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_AUDIO_BITRATE)
    }

    /// Output extension with a leading dot.
    pub fn effective_output_extension(&self) -> String {
        let ext = self
            .output_extension
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty() && *e != ".")
            .unwrap_or(DEFAULT_OUTPUT_EXTENSION);
        if ext.starts_with('.') {
            ext.to_lowercase()
        } else {
            format!(".{}", ext.to_lowercase())
        }
    }

    pub fn effective_termination_timeout(&self) -> Duration {
        self.termination_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TERMINATION_TIMEOUT)
            .min(MAX_TERMINATION_TIMEOUT)
    }
}

/// Outcome of one job, reported once when the job reaches a terminal state.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub cancelled: bool,
}

impl ConversionResult {
    pub fn completed(output_path: PathBuf) -> Self {
        Self {
            success: true,
            output_path: Some(output_path),
            error_message: None,
            exit_code: None,
            cancelled: false,
        }
    }

    pub fn cancelled() -> Self {
        Self::from(AppError::Cancelled)
    }
}

impl From<AppError> for ConversionResult {
    fn from(e: AppError) -> Self {
        Self {
            success: false,
            output_path: None,
            exit_code: e.exit_code(),
            cancelled: e.is_cancelled(),
            error_message: Some(e.to_string()),
        }
    }
}

impl From<Result<PathBuf, AppError>> for ConversionResult {
    fn from(result: Result<PathBuf, AppError>) -> Self {
        match result {
            Ok(path) => Self::completed(path),
            Err(e) => e.into(),
        }
    }
}

/// Path to string for FFmpeg args or logging.
pub fn path_to_string(path: &(impl AsRef<std::path::Path> + ?Sized)) -> String {
    path.as_ref().to_string_lossy().to_string()
}
