use regex::Regex;
use std::sync::LazyLock;

static OUT_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+):(\d{1,2}):(\d{1,2}(?:\.\d+)?)$").expect("invalid out_time regex")
});

/// One line of FFmpeg's `-progress` stream, reduced to what the converter needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressLine {
    /// Encoded media time so far, in seconds.
    Elapsed(f64),
    /// `progress=end`: the encoder has finished writing.
    End,
    /// Unrecognized key or unparseable value.
    Ignored,
}

impl ProgressLine {
    /// Fraction in [0, 1]. Elapsed time only counts when the total duration is known.
    pub fn fraction(self, duration_secs: Option<f64>) -> Option<f64> {
        match self {
            ProgressLine::End => Some(1.0),
            ProgressLine::Elapsed(elapsed) => {
                let total = duration_secs.filter(|d| *d > 0.0)?;
                Some((elapsed / total).clamp(0.0, 1.0))
            }
            ProgressLine::Ignored => None,
        }
    }
}

/// Parse a `key=value` progress line. Malformed values are ignored, never an error.
pub fn parse_progress_line(line: &str) -> ProgressLine {
    let Some((key, value)) = line.trim().split_once('=') else {
        return ProgressLine::Ignored;
    };
    let value = value.trim();
    match key.trim() {
        "out_time_us" => value
            .parse::<i64>()
            .map(|us| ProgressLine::Elapsed(us as f64 / 1_000_000.0))
            .unwrap_or(ProgressLine::Ignored),
        "out_time" => parse_clock(value)
            .map(ProgressLine::Elapsed)
            .unwrap_or(ProgressLine::Ignored),
        "progress" if value == "end" => ProgressLine::End,
        _ => ProgressLine::Ignored,
    }
}

/// `HH:MM:SS.ffffff` to seconds.
fn parse_clock(value: &str) -> Option<f64> {
    let caps = OUT_TIME_RE.captures(value)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
