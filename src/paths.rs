//! Output naming, output folder creation and input extension allow-lists.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Audio containers plus video containers that usually carry an audio track.
pub const SUPPORTED_AUDIO_EXTENSIONS: &[&str] = &[
    "m4a", "mp3", "wav", "aac", "flac", "ogg", "wma", "opus", "aiff", "aif", "mp2", "mp4",
    "webm", "mkv", "avi",
];

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff", "tif"];

fn has_extension_in(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}

pub fn is_supported_audio_file(path: &Path) -> bool {
    has_extension_in(path, SUPPORTED_AUDIO_EXTENSIONS)
}

pub fn is_supported_image_file(path: &Path) -> bool {
    has_extension_in(path, SUPPORTED_IMAGE_EXTENSIONS)
}

/// File stem used to name the output video. Falls back to "output" for nameless paths.
pub fn output_base_name(audio_path: &Path) -> String {
    audio_path
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string())
}

fn normalize_extension(extension: &str) -> String {
    if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{}", extension)
    }
}

/// `folder/base.ext`, or `folder/base (N).ext` with the smallest N that is free.
///
/// A path is taken when it exists on disk or is in `reserved`. The returned path is
/// inserted into `reserved` so later calls within the same batch never reuse it.
pub fn reserve_output_path(
    folder: &Path,
    base_name: &str,
    extension: &str,
    reserved: &mut HashSet<PathBuf>,
) -> PathBuf {
    let base_name = base_name.trim();
    let extension = normalize_extension(extension);
    let is_free = |p: &Path| !p.exists() && !reserved.contains(p);

    let mut candidate = folder.join(format!("{}{}", base_name, extension));
    let mut counter = 1u32;
    while !is_free(&candidate) {
        candidate = folder.join(format!("{} ({}){}", base_name, counter, extension));
        counter += 1;
    }
    reserved.insert(candidate.clone());
    candidate
}

/// Unique output path against the file system only.
pub fn unique_output_path(folder: &Path, base_name: &str, extension: &str) -> PathBuf {
    reserve_output_path(folder, base_name, extension, &mut HashSet::new())
}

/// Create the output folder (and parents). Any failure aborts the batch.
pub fn ensure_output_folder(folder: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(folder).map_err(|e| {
        log::error!(
            target: "audio2video::paths",
            "Could not create output folder {}: {}",
            folder.display(),
            e
        );
        AppError::Io(e)
    })
}

/// Seconds to `HH:MM:SS`. Negative durations render as zero.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "00:00:00".to_string();
    }
    let total = seconds as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
