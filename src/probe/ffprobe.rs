//! ffprobe-based duration prober.

use crate::error::{ChapterError, ChapterResult};
use crate::probe::DurationProber;
use log::debug;
use std::path::Path;
use std::process::Command;

/// Duration prober backed by an ffprobe subprocess
pub struct FfprobeProber {
    program: String,
}

impl FfprobeProber {
    /// Create a prober using `ffprobe` from `PATH`
    pub fn new() -> Self {
        Self::with_program("ffprobe")
    }

    /// Create a prober using a specific executable name or path
    pub fn with_program(program: impl Into<String>) -> Self {
        FfprobeProber {
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

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new()
    }
}

impl DurationProber for FfprobeProber {
    fn probe_duration_ms(&self, path: &Path) -> ChapterResult<u64> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .map_err(|e| self.tool_error(e.to_string()))?;

        if !output.status.success() {
            return Err(self.tool_error(format!(
                "exit status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let seconds: f64 = text
            .trim()
            .parse()
            .map_err(|_| self.tool_error(format!("unparseable duration {:?}", text.trim())))?;
        if seconds <= 0.0 {
            return Err(self.tool_error(format!("non-positive duration {seconds}")));
        }

        let duration_ms = (seconds * 1000.0).round() as u64;
        debug!("probed duration of {:?}: {} ms", path, duration_ms);
        Ok(duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_tool_error() {
        let prober = FfprobeProber::with_program("ffprobe-does-not-exist");
        let result = prober.probe_duration_ms(Path::new("whatever.mp3"));
        assert!(matches!(result, Err(ChapterError::ExternalTool { .. })));
    }
}
