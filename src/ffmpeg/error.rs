//! Map FFmpeg exit codes and diagnostic output to user-facing messages.
//!
//! Exit codes are from ffmpeg.c: 1 (general), 69 (rate exceeded),
//! 123 (hard exit), 255 (signal). -1 is used for spawn failure.

use serde::Serialize;

/// Characters of the diagnostic stream kept in a failed job's error message.
pub const STDERR_TAIL_CHARS: usize = 500;

/// Payload for job error events. Frontend shows summary; detail is expandable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FfmpegErrorPayload {
    pub summary: String,
    pub detail: String,
}

/// Maps FFmpeg exit code to a short summary. The diagnostic text is passed through as detail.
pub fn parse_ffmpeg_error(stderr: &str, exit_code: Option<i32>) -> FfmpegErrorPayload {
    let summary = match exit_code {
        Some(code) => known_exit_code_summary(code)
            .unwrap_or_else(|| format!("FFmpeg failed (exit code {}).", code)),
        None => first_line_truncated(stderr, 120),
    };
    FfmpegErrorPayload {
        summary,
        detail: stderr.trim().to_string(),
    }
}

fn known_exit_code_summary(code: i32) -> Option<String> {
    match code {
        -1 => Some("FFmpeg not found or failed to start.".into()),
        1 => Some("FFmpeg failed.".into()),
        69 => Some("Encoding rate limit exceeded.".into()),
        123 | 255 => Some("Encoding was stopped.".into()),
        _ => None,
    }
}

const ELLIPSIS: &str = "…";

fn first_line_truncated(stderr: &str, max_chars: usize) -> String {
    let first = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if first.chars().count() <= max_chars {
        first.to_string()
    } else {
        let head: String = first.chars().take(max_chars - 1).collect();
        format!("{}{}", head, ELLIPSIS)
    }
}

/// Last `max_chars` characters of the diagnostic stream, on a char boundary.
pub fn stderr_tail(stderr: &str, max_chars: usize) -> &str {
    let total = stderr.chars().count();
    if total <= max_chars {
        return stderr;
    }
    let skip = total - max_chars;
    match stderr.char_indices().nth(skip) {
        Some((idx, _)) => &stderr[idx..],
        None => "",
    }
}
