//! Locates the FFmpeg and ffprobe executables.
//!
//! Lookup order per tool: environment override, bundled copy in `<exe dir>/bin`,
//! then the process PATH. When nothing is found the bundled path is returned anyway
//! so the converter can report exactly where it expected the tool.

use std::path::{Path, PathBuf};

pub const FFMPEG_ENV: &str = "AUDIO2VIDEO_FFMPEG";
pub const FFPROBE_ENV: &str = "AUDIO2VIDEO_FFPROBE";

/// Directory holding bundled tools, next to the running executable.
pub fn bundled_tool_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("bin")))
        .unwrap_or_else(|| PathBuf::from("bin"))
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name.trim_end_matches(".exe"))
    } else {
        name.to_string()
    }
}

/// Resolve `name` against an explicit bundled directory, then PATH.
/// Returns the bundled (possibly non-existent) path as last resort.
pub fn locate_tool_in(name: &str, bundled_dir: &Path) -> PathBuf {
    let bundled = bundled_dir.join(executable_name(name));
    if bundled.is_file() {
        log::debug!(
            target: "audio2video::ffmpeg::discovery",
            "{} found as bundled binary: {}",
            name,
            bundled.display()
        );
        return bundled;
    }

    if let Ok(p) = which::which(name) {
        log::debug!(
            target: "audio2video::ffmpeg::discovery",
            "{} found in PATH: {}",
            name,
            p.display()
        );
        return p;
    }

    log::warn!(
        target: "audio2video::ffmpeg::discovery",
        "{} not found in {} or PATH",
        name,
        bundled_dir.display()
    );
    bundled
}

/// Resolve a tool, honoring `env_var` when it points at an existing file.
pub fn locate_tool(name: &str, env_var: &str) -> PathBuf {
    if let Some(p) = std::env::var_os(env_var).map(PathBuf::from) {
        if p.is_file() {
            log::debug!(
                target: "audio2video::ffmpeg::discovery",
                "{} path from {} env: {}",
                name,
                env_var,
                p.display()
            );
            return p;
        }
        log::warn!(
            target: "audio2video::ffmpeg::discovery",
            "{} is set but {} does not exist; falling back",
            env_var,
            p.display()
        );
    }
    locate_tool_in(name, &bundled_tool_dir())
}

/// Encoder and probe executables used for one batch.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Toolchain {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn discover() -> Self {
        Self {
            ffmpeg: locate_tool("ffmpeg", FFMPEG_ENV),
            ffprobe: locate_tool("ffprobe", FFPROBE_ENV),
        }
    }

    pub fn has_ffmpeg(&self) -> bool {
        self.ffmpeg.is_file()
    }

    pub fn has_ffprobe(&self) -> bool {
        self.ffprobe.is_file()
    }
}
