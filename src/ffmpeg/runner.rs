//! FFmpeg process spawning, progress parsing and cooperative cancellation.
//!
//! One encoder process per job. Progress is read line by line from stdout (pipe:1) on
//! the calling thread, with the cancellation flag polled before every read. stderr is
//! drained on a background thread into a bounded buffer so the encoder never blocks on
//! a full pipe; its tail ends up in the error message of a failed job.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use parking_lot::Mutex;

use super::builder::{build_conversion_args, format_args_for_display_multiline};
use super::discovery::Toolchain;
use super::duration::{DurationProbe, ToolDurationProbe};
use super::error::{STDERR_TAIL_CHARS, stderr_tail};
use super::progress::parse_progress_line;
use super::{ConversionResult, ConversionSettings, path_to_string};
use crate::error::{AppError, InputKind};

/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;
/// Poll interval while waiting for a terminated encoder to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn drain_stderr<R: Read + Send + 'static>(
    reader: R,
    buffer: Arc<Mutex<Vec<u8>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut stream_reader = BufReader::new(reader);
        let mut line_buf = Vec::with_capacity(256);
        while stream_reader.read_until(b'\n', &mut line_buf).unwrap_or(0) > 0 {
            let mut guard = buffer.lock();
            guard.extend_from_slice(&line_buf);
            if guard.len() > MAX_STDERR_BYTES {
                let excess = guard.len() - MAX_STDERR_BYTES;
                guard.drain(..excess);
            }
            drop(guard);
            line_buf.clear();
        }
    })
}

/// Ask FFmpeg to quit (`q` on stdin), wait up to `timeout`, then kill.
fn terminate(child: &mut Child, stdin: Option<ChildStdin>, timeout: Duration) {
    if let Some(mut stdin) = stdin {
        let _ = stdin.write_all(b"q\n");
        let _ = stdin.flush();
    }
    // No representable deadline: skip the wait and kill.
    let deadline = Instant::now().checked_add(timeout);
    while let Some(deadline) = deadline {
        match child.try_wait() {
            Ok(Some(status)) => {
                log::debug!(
                    target: "audio2video::ffmpeg::runner",
                    "FFmpeg exited after quit request: {}",
                    status
                );
                return;
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL_INTERVAL),
            _ => break,
        }
    }
    log::warn!(
        target: "audio2video::ffmpeg::runner",
        "FFmpeg did not exit within {:?}; killing",
        timeout
    );
    let _ = child.kill();
    let _ = child.wait();
}

fn remove_partial_output(output_path: &Path) {
    if !output_path.exists() {
        return;
    }
    match fs::remove_file(output_path) {
        Ok(()) => log::debug!(
            target: "audio2video::ffmpeg::runner",
            "Removed partial output {}",
            output_path.display()
        ),
        Err(e) => log::warn!(
            target: "audio2video::ffmpeg::runner",
            "Could not remove partial output {}: {}",
            output_path.display(),
            e
        ),
    }
}

/// Runs single still-image + audio encodes with a fixed toolchain and settings.
#[derive(Clone)]
pub struct Converter {
    tools: Toolchain,
    settings: ConversionSettings,
    probe: Arc<dyn DurationProbe>,
}

impl Converter {
    pub fn new(tools: Toolchain, settings: ConversionSettings) -> Self {
        let probe = Arc::new(ToolDurationProbe::new(tools.clone()));
        Self {
            tools,
            settings,
            probe,
        }
    }

    /// Replace the duration source (e.g. a cached or library-backed probe).
    pub fn with_duration_probe(mut self, probe: Arc<dyn DurationProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Convert one audio file. Never fails outward: every problem becomes a failed
    /// or cancelled [`ConversionResult`].
    ///
    /// `on_progress` receives non-decreasing fractions in [0, 1]; it runs on the
    /// converting thread and must not block. `is_cancelled` is polled before every
    /// progress line is read.
    pub fn convert<P, C>(
        &self,
        audio_path: &Path,
        cover_image_path: &Path,
        output_path: &Path,
        on_progress: P,
        is_cancelled: C,
    ) -> ConversionResult
    where
        P: FnMut(f64),
        C: Fn() -> bool,
    {
        log::info!(
            target: "audio2video::ffmpeg::runner",
            "Converting {} -> {}",
            audio_path.display(),
            output_path.display()
        );
        let result = self.run(
            audio_path,
            cover_image_path,
            output_path,
            on_progress,
            is_cancelled,
        );
        match &result {
            Ok(path) => log::info!(
                target: "audio2video::ffmpeg::runner",
                "Conversion complete: {}",
                path.display()
            ),
            Err(AppError::Cancelled) => log::warn!(
                target: "audio2video::ffmpeg::runner",
                "Conversion cancelled: {}",
                audio_path.display()
            ),
            Err(e) => log::error!(
                target: "audio2video::ffmpeg::runner",
                "Conversion failed for {}: {}",
                audio_path.display(),
                e
            ),
        }
        result.into()
    }

    fn check_preconditions(
        &self,
        audio_path: &Path,
        cover_image_path: &Path,
    ) -> Result<(), AppError> {
        if !self.tools.has_ffmpeg() {
            return Err(AppError::tool_not_found("FFmpeg", &self.tools.ffmpeg));
        }
        if !audio_path.exists() {
            return Err(AppError::input_not_found(InputKind::Audio, audio_path));
        }
        if !cover_image_path.exists() {
            return Err(AppError::input_not_found(
                InputKind::CoverImage,
                cover_image_path,
            ));
        }
        Ok(())
    }

    fn run<P, C>(
        &self,
        audio_path: &Path,
        cover_image_path: &Path,
        output_path: &Path,
        mut on_progress: P,
        is_cancelled: C,
    ) -> Result<PathBuf, AppError>
    where
        P: FnMut(f64),
        C: Fn() -> bool,
    {
        self.check_preconditions(audio_path, cover_image_path)?;

        let duration = self.probe.probe_duration_seconds(audio_path);

        let args = build_conversion_args(
            &path_to_string(cover_image_path),
            &path_to_string(audio_path),
            &path_to_string(output_path),
            &self.settings,
        );
        log::debug!(
            target: "audio2video::ffmpeg::runner",
            "Spawning FFmpeg: path={}, duration={:?}\n{}",
            self.tools.ffmpeg.display(),
            duration,
            format_args_for_display_multiline(&args)
        );

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::LaunchFailure(e.to_string()))?;

        let stdin = child.stdin.take();
        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AppError::LaunchFailure(
                    "Failed to capture FFmpeg output".to_string(),
                ));
            }
        };

        let stderr_buffer = Arc::new(Mutex::new(Vec::new()));
        let stderr_handle = drain_stderr(stderr, Arc::clone(&stderr_buffer));

        let timeout = self.settings.effective_termination_timeout();
        let mut reader = BufReader::new(stdout);
        let mut line_buf = Vec::with_capacity(256);
        let mut last_fraction = 0.0_f64;
        loop {
            if is_cancelled() {
                log::info!(
                    target: "audio2video::ffmpeg::runner",
                    "Cancellation requested; stopping FFmpeg"
                );
                terminate(&mut child, stdin, timeout);
                remove_partial_output(output_path);
                return Err(AppError::Cancelled);
            }

            line_buf.clear();
            match reader.read_until(b'\n', &mut line_buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    terminate(&mut child, stdin, timeout);
                    return Err(AppError::Unexpected(format!(
                        "Failed to read FFmpeg progress: {}",
                        e
                    )));
                }
            }

            let line = String::from_utf8_lossy(&line_buf);
            if let Some(fraction) = parse_progress_line(&line).fraction(duration) {
                if fraction >= last_fraction {
                    last_fraction = fraction;
                    on_progress(fraction);
                }
            }
        }

        drop(stdin);
        let status = child
            .wait()
            .map_err(|e| AppError::Unexpected(format!("Failed to wait for FFmpeg: {}", e)))?;
        let _ = stderr_handle.join();

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            let stderr_bytes = stderr_buffer.lock().clone();
            let stderr_str = String::from_utf8_lossy(&stderr_bytes);
            let tail = stderr_tail(stderr_str.trim_end(), STDERR_TAIL_CHARS);
            return Err(AppError::non_zero_exit(code, tail));
        }

        if !output_path.exists() {
            return Err(AppError::OutputMissing {
                path: output_path.to_path_buf(),
            });
        }

        Ok(output_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedDuration(Option<f64>);

    impl DurationProbe for FixedDuration {
        fn probe_duration_seconds(&self, _audio_path: &Path) -> Option<f64> {
            self.0
        }
    }

    #[test]
    fn missing_encoder_fails_before_spawn() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audio = dir.path().join("a.mp3");
        let cover = dir.path().join("c.png");
        fs::write(&audio, b"audio").expect("write audio");
        fs::write(&cover, b"image").expect("write cover");
        let missing = dir.path().join("bin").join("ffmpeg");
        let converter = Converter::new(
            Toolchain::new(&missing, dir.path().join("bin").join("ffprobe")),
            ConversionSettings::default(),
        );

        let progress_calls = Cell::new(0);
        let result = converter.convert(
            &audio,
            &cover,
            &dir.path().join("out").join("a.mpg"),
            |_| progress_calls.set(progress_calls.get() + 1),
            || false,
        );

        assert!(!result.success);
        assert!(!result.cancelled);
        let message = result.error_message.expect("error message");
        assert!(message.contains("FFmpeg not found"), "unexpected: {}", message);
        assert!(message.contains(&missing.display().to_string()));
        assert_eq!(progress_calls.get(), 0);
        assert!(
            !dir.path().join("out").exists(),
            "no output folder should be touched when the encoder is missing"
        );
    }

    #[test]
    fn missing_audio_reported_before_cover() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ffmpeg = dir.path().join("ffmpeg");
        fs::write(&ffmpeg, b"").expect("write ffmpeg");
        let converter = Converter::new(
            Toolchain::new(&ffmpeg, dir.path().join("ffprobe")),
            ConversionSettings::default(),
        )
        .with_duration_probe(Arc::new(FixedDuration(None)));

        let result = converter.convert(
            &dir.path().join("missing.mp3"),
            &dir.path().join("missing.png"),
            &dir.path().join("o.mpg"),
            |_| {},
            || false,
        );
        let message = result.error_message.expect("error message");
        assert!(message.starts_with("Audio file not found"), "unexpected: {}", message);
    }

    #[test]
    fn missing_cover_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ffmpeg = dir.path().join("ffmpeg");
        let audio = dir.path().join("a.mp3");
        fs::write(&ffmpeg, b"").expect("write ffmpeg");
        fs::write(&audio, b"audio").expect("write audio");
        let converter = Converter::new(
            Toolchain::new(&ffmpeg, dir.path().join("ffprobe")),
            ConversionSettings::default(),
        );

        let result = converter.convert(
            &audio,
            &dir.path().join("missing.png"),
            &dir.path().join("o.mpg"),
            |_| {},
            || false,
        );
        let message = result.error_message.expect("error message");
        assert!(message.starts_with("Cover image not found"), "unexpected: {}", message);
    }

    #[cfg(unix)]
    #[test]
    fn terminate_with_unbounded_timeout_kills_at_once() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::piped())
            .spawn()
            .expect("spawn sleep");
        let stdin = child.stdin.take();

        let started = Instant::now();
        terminate(&mut child, stdin, Duration::MAX);

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(child.try_wait().expect("try_wait").is_some());
    }
}
