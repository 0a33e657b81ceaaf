//! ffmpeg `loudnorm` adapter.
//!
//! The measure pass runs `loudnorm` in statistics mode with
//! `print_format=json`; ffmpeg prints the JSON block on stderr after the
//! stream has been consumed. All numeric values arrive as JSON strings.

use crate::error::{ChapterError, ChapterResult};
use crate::loudness::{LoudnessFilter, LoudnessMeasurement, LoudnessTargets};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

/// Loudness filter backed by an ffmpeg subprocess
pub struct FfmpegLoudnessFilter {
    program: String,
}

impl FfmpegLoudnessFilter {
    /// Create a filter using `ffmpeg` from `PATH`
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    /// Create a filter using a specific executable name or path
    pub fn with_program(program: impl Into<String>) -> Self {
        FfmpegLoudnessFilter {
            program: program.into(),
        }
    }

    fn tool_error(&self, message: impl Into<String>) -> ChapterError {
        ChapterError::ExternalTool {
            tool: self.program.clone(),
            message: message.into(),
        }
    }
}

impl Default for FfmpegLoudnessFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoudnessFilter for FfmpegLoudnessFilter {
    fn measure(
        &self,
        input: &Path,
        targets: &LoudnessTargets,
    ) -> ChapterResult<LoudnessMeasurement> {
        let spec = format!("{}:print_format=json", loudnorm_spec(targets, None));

        let output = Command::new(&self.program)
            .args(["-hide_banner", "-nostats", "-i"])
            .arg(input)
            .args(["-af", &spec, "-f", "null", "-"])
            .output()
            .map_err(|e| self.tool_error(e.to_string()))?;

        if !output.status.success() {
            return Err(self.tool_error(format!(
                "loudnorm measurement exited with {}",
                output.status
            )));
        }

        parse_loudnorm_stats(&String::from_utf8_lossy(&output.stderr))
    }
}

/// Build a `loudnorm` filter spec.
///
/// With measured values the filter runs in two-pass linear mode; without
/// them it falls back to single-pass dynamic correction.
pub fn loudnorm_spec(targets: &LoudnessTargets, measured: Option<&LoudnessMeasurement>) -> String {
    let mut spec = format!(
        "loudnorm=I={}:TP={}:LRA={}",
        targets.integrated_lufs, targets.true_peak_dbtp, targets.loudness_range_lu
    );
    if let Some(m) = measured {
        spec.push_str(&format!(
            ":measured_I={}:measured_TP={}:measured_LRA={}:measured_thresh={}:linear=true",
            m.integrated_lufs, m.true_peak_dbtp, m.loudness_range_lu, m.threshold_lufs
        ));
    }
    spec
}

/// Raw loudnorm statistics block as ffmpeg prints it
#[derive(Debug, Deserialize)]
struct LoudnormStats {
    input_i: String,
    input_tp: String,
    input_lra: String,
    input_thresh: String,
}

fn parse_stat(value: &str, field: &str) -> ChapterResult<f64> {
    value.parse().map_err(|_| {
        ChapterError::ExternalTool {
            tool: "ffmpeg".to_string(),
            message: format!("unparseable loudnorm field {field}={value:?}"),
        }
    })
}

/// Extract and parse the loudnorm JSON block from ffmpeg's stderr.
pub(crate) fn parse_loudnorm_stats(stderr: &str) -> ChapterResult<LoudnessMeasurement> {
    // The JSON block is the last braced region of the stderr stream
    let start = stderr.rfind('{');
    let end = stderr.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &stderr[start..=end],
        _ => {
            return Err(ChapterError::ExternalTool {
                tool: "ffmpeg".to_string(),
                message: "no loudnorm statistics block in output".to_string(),
            });
        }
    };

    let stats: LoudnormStats = serde_json::from_str(json).map_err(|e| {
        ChapterError::ExternalTool {
            tool: "ffmpeg".to_string(),
            message: format!("malformed loudnorm statistics: {e}"),
        }
    })?;

    Ok(LoudnessMeasurement {
        integrated_lufs: parse_stat(&stats.input_i, "input_i")?,
        true_peak_dbtp: parse_stat(&stats.input_tp, "input_tp")?,
        loudness_range_lu: parse_stat(&stats.input_lra, "input_lra")?,
        threshold_lufs: parse_stat(&stats.input_thresh, "input_thresh")?,
    })
}
