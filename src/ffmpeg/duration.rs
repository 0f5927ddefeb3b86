//! Best-effort input duration lookup for progress normalization.
//!
//! ffprobe is asked for the container duration first. When it is missing or prints
//! something unparseable, FFmpeg decodes the input to a null sink and the
//! `Duration: HH:MM:SS.cc` banner is scraped from its diagnostic output. Either way
//! failure means "unknown", never an error.

use regex::Regex;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use super::discovery::Toolchain;
use super::path_to_string;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration: (\d{2}):(\d{2}):(\d{2})\.(\d{2})").expect("invalid duration regex")
});

/// Source of input durations in seconds. `None` means unknown.
pub trait DurationProbe: Send + Sync {
    fn probe_duration_seconds(&self, audio_path: &Path) -> Option<f64>;
}

/// Probes with the external tools of a [`Toolchain`].
#[derive(Debug, Clone)]
pub struct ToolDurationProbe {
    tools: Toolchain,
}

impl ToolDurationProbe {
    pub fn new(tools: Toolchain) -> Self {
        Self { tools }
    }

    fn probe_with_ffprobe(&self, audio_path: &Path) -> Option<f64> {
        if !self.tools.has_ffprobe() {
            return None;
        }
        let path_str = path_to_string(audio_path);
        let mut cmd = Command::new(&self.tools.ffprobe);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
            path_str.as_str(),
        ])
        .stdin(Stdio::null());
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        let output = match cmd.output() {
            Ok(o) => o,
            Err(e) => {
                log::debug!(
                    target: "audio2video::ffmpeg::duration",
                    "ffprobe failed to run for {}: {}",
                    path_str,
                    e
                );
                return None;
            }
        };
        if !output.status.success() {
            return None;
        }
        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    fn probe_with_ffmpeg(&self, audio_path: &Path) -> Option<f64> {
        if !self.tools.has_ffmpeg() {
            return None;
        }
        let path_str = path_to_string(audio_path);
        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.args(["-i", path_str.as_str(), "-f", "null", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        let output = cmd.output().ok()?;
        parse_diagnostic_duration(&String::from_utf8_lossy(&output.stderr))
    }
}

impl DurationProbe for ToolDurationProbe {
    fn probe_duration_seconds(&self, audio_path: &Path) -> Option<f64> {
        let duration = self
            .probe_with_ffprobe(audio_path)
            .or_else(|| self.probe_with_ffmpeg(audio_path));
        log::debug!(
            target: "audio2video::ffmpeg::duration",
            "duration for {}: {:?}",
            audio_path.display(),
            duration
        );
        duration
    }
}

/// ffprobe `nokey=1` output: a bare decimal number of seconds.
pub fn parse_probe_output(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())?
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Scrape `Duration: HH:MM:SS.cc` from FFmpeg's diagnostic stream.
pub fn parse_diagnostic_duration(stderr: &str) -> Option<f64> {
    let caps = DURATION_RE.captures(stderr)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let centis: f64 = caps[4].parse().ok()?;
    let total = hours * 3600.0 + minutes * 60.0 + seconds + centis / 100.0;
    (total > 0.0).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_output_parsed() {
        assert_eq!(parse_probe_output("183.456000\n"), Some(183.456));
    }

    #[test]
    fn probe_output_na_is_unknown() {
        assert_eq!(parse_probe_output("N/A\n"), None);
        assert_eq!(parse_probe_output(""), None);
        assert_eq!(parse_probe_output("0.000000"), None);
    }

    #[test]
    fn diagnostic_duration_parsed() {
        let stderr = "Input #0, mp3, from 'a.mp3':\n  Duration: 01:02:03.45, start: 0.025057, bitrate: 128 kb/s\n";
        let d = parse_diagnostic_duration(stderr).unwrap();
        assert!((d - 3723.45).abs() < 1e-9);
    }

    #[test]
    fn diagnostic_duration_na_is_unknown() {
        assert_eq!(parse_diagnostic_duration("  Duration: N/A, bitrate: N/A"), None);
    }

    #[test]
    fn missing_tools_yield_unknown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let probe = ToolDurationProbe::new(Toolchain::new(
            dir.path().join("ffmpeg"),
            dir.path().join("ffprobe"),
        ));
        assert_eq!(probe.probe_duration_seconds(&dir.path().join("a.mp3")), None);
    }
}
