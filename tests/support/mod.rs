#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;

use audio2video_core::ffmpeg::{ConversionSettings, Converter, Toolchain};
use audio2video_core::queue::{BatchEvent, BatchEventEmitter};
use parking_lot::Mutex;

/// How the scripted encoder behaves when asked to convert.
pub enum FakeEncoder {
    /// Write the output, then print each progress line.
    Succeed(Vec<&'static str>),
    /// Print `stderr_noise` filler lines and `reason` to stderr, then exit with `code`.
    Fail {
        code: i32,
        stderr_noise: usize,
        reason: &'static str,
    },
    /// Exit 0 without writing anything.
    NoOutput,
    /// Write a partial output and keep reporting progress until killed.
    Slow,
    /// Write a partial output, report once, then wait for `q` on stdin and exit 0.
    QuitOnRequest,
}

/// What duration lookup sees.
pub enum FakeProbe {
    Seconds(f64),
    /// Probe prints N/A and the diagnostic stream has no usable duration.
    Unknown,
    /// No probe executable; the encoder's diagnostic stream carries `Duration: <value>`.
    DiagnosticOnly(&'static str),
}

/// Shell scripts standing in for ffmpeg/ffprobe, plus scratch space for inputs.
pub struct FakeTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    run_log: PathBuf,
    quit_log: PathBuf,
    dir: tempfile::TempDir,
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}", body)).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    }
}

fn encoder_body(encoder: &FakeEncoder, quit_log: &Path) -> String {
    match encoder {
        FakeEncoder::Succeed(lines) => {
            let mut body = String::from("printf 'video' > \"$last\"\n");
            for line in lines {
                body.push_str(&format!("echo '{}'\nsleep 0.02\n", line));
            }
            body.push_str("exit 0\n");
            body
        }
        FakeEncoder::Fail {
            code,
            stderr_noise,
            reason,
        } => format!(
            "i=0\nwhile [ $i -lt {} ]; do echo 'ffmpeg noise line' >&2; i=$((i+1)); done\n\
             echo '{}' >&2\nexit {}\n",
            stderr_noise, reason, code
        ),
        FakeEncoder::NoOutput => "echo 'progress=end'\nexit 0\n".to_string(),
        FakeEncoder::Slow => "printf 'partial' > \"$last\"\n\
             t=0\n\
             while true; do t=$((t+100000)); echo \"out_time_us=$t\"; sleep 0.05; done\n"
            .to_string(),
        FakeEncoder::QuitOnRequest => format!(
            "printf 'partial' > \"$last\"\n\
             echo 'out_time_us=100000'\n\
             read cmd\n\
             if [ \"$cmd\" = \"q\" ]; then echo \"$last\" >> '{}'; fi\n\
             exit 0\n",
            quit_log.display()
        ),
    }
}

impl FakeTools {
    pub fn new(encoder: FakeEncoder, probe: FakeProbe) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin).expect("create bin dir");
        let ffmpeg = bin.join("ffmpeg");
        let ffprobe = bin.join("ffprobe");
        let run_log = dir.path().join("runs.log");
        let quit_log = dir.path().join("quits.log");

        let banner = match &probe {
            FakeProbe::DiagnosticOnly(value) => format!(
                "echo '  Duration: {}, start: 0.000000, bitrate: 128 kb/s' >&2\n",
                value
            ),
            _ => "echo '  Duration: N/A, bitrate: N/A' >&2\n".to_string(),
        };
        let script = format!(
            "for last; do :; done\n\
             if [ \"$last\" = \"-\" ]; then\n{}exit 0\nfi\n\
             echo \"$last\" >> '{}'\n{}",
            banner,
            run_log.display(),
            encoder_body(&encoder, &quit_log)
        );
        write_script(&ffmpeg, &script);

        match probe {
            FakeProbe::Seconds(secs) => write_script(&ffprobe, &format!("echo '{:.6}'\n", secs)),
            FakeProbe::Unknown => write_script(&ffprobe, "echo 'N/A'\n"),
            FakeProbe::DiagnosticOnly(_) => {}
        }

        Self {
            ffmpeg,
            ffprobe,
            run_log,
            quit_log,
            dir,
        }
    }

    pub fn toolchain(&self) -> Toolchain {
        Toolchain::new(&self.ffmpeg, &self.ffprobe)
    }

    /// Converter with a short termination timeout so cancel tests stay fast.
    pub fn converter(&self) -> Converter {
        Converter::new(
            self.toolchain(),
            ConversionSettings {
                termination_timeout_ms: Some(300),
                ..Default::default()
            },
        )
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Create a placeholder input file (parents included).
    pub fn input(&self, name: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create input dir");
        }
        fs::write(&path, b"data").expect("write input");
        path
    }

    /// Output paths the encoder was launched for, in launch order.
    pub fn runs(&self) -> Vec<String> {
        read_lines(&self.run_log)
    }

    /// Output paths whose encoder received a `q` quit request on stdin.
    pub fn quits(&self) -> Vec<String> {
        read_lines(&self.quit_log)
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Collects batch events in emission order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<BatchEvent>>>,
}

impl EventLog {
    pub fn emitter(&self) -> BatchEventEmitter {
        let events = Arc::clone(&self.events);
        Arc::new(move |e: BatchEvent| events.lock().push(e))
    }

    pub fn events(&self) -> Vec<BatchEvent> {
        self.events.lock().clone()
    }

    pub fn fractions(&self, index: usize) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { index: i, fraction } if i == index => Some(fraction),
                _ => None,
            })
            .collect()
    }
}

/// Real FFmpeg scratch environment for the smoke test.
pub struct IntegrationEnv {
    pub tools: Toolchain,
    dir: tempfile::TempDir,
}

impl IntegrationEnv {
    pub fn new() -> Self {
        let tools = Toolchain::discover();
        assert!(
            tools.has_ffmpeg(),
            "FFmpeg not found at {}",
            tools.ffmpeg.display()
        );
        let dir = tempfile::tempdir().expect("tempdir");
        Self { tools, dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn with_sine_audio(&self, name: &str, duration_secs: u32) -> PathBuf {
        let output_path = self.path(name);
        let status = create_sine_audio(&self.tools.ffmpeg, &output_path, duration_secs)
            .expect("failed to run ffmpeg");
        assert!(status.success(), "ffmpeg failed to create test audio");
        output_path
    }

    pub fn with_cover_image(&self, name: &str) -> PathBuf {
        let output_path = self.path(name);
        let status =
            create_test_image(&self.tools.ffmpeg, &output_path).expect("failed to run ffmpeg");
        assert!(status.success(), "ffmpeg failed to create test image");
        output_path
    }
}

pub fn create_sine_audio(
    ffmpeg: &Path,
    output_path: &Path,
    duration_secs: u32,
) -> std::io::Result<ExitStatus> {
    Command::new(ffmpeg)
        .args([
            "-loglevel",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            &format!("sine=frequency=440:duration={}", duration_secs),
            output_path.to_string_lossy().as_ref(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
}

pub fn create_test_image(ffmpeg: &Path, output_path: &Path) -> std::io::Result<ExitStatus> {
    Command::new(ffmpeg)
        .args([
            "-loglevel",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "testsrc=size=640x480:rate=1",
            "-frames:v",
            "1",
            output_path.to_string_lossy().as_ref(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
}
