//! ffmpeg-backed audio transcoding.

use crate::error::{ChapterError, ChapterResult};
use log::debug;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

/// Target output container and codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// AAC in an MP4 container
    M4a,
    /// MPEG Layer III
    Mp3,
}

impl OutputFormat {
    /// File extension for the format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::M4a => "m4a",
            OutputFormat::Mp3 => "mp3",
        }
    }

    /// ffmpeg codec arguments for the format
    pub fn codec_args(&self) -> &'static [&'static str] {
        match self {
            OutputFormat::M4a => &["-codec:a", "aac", "-b:a", "192k"],
            OutputFormat::Mp3 => &["-codec:a", "libmp3lame", "-q:a", "2"],
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::M4a => "M4A",
            OutputFormat::Mp3 => "MP3",
        }
    }
}

/// Trait for transcoders
pub trait Transcoder {
    /// Convert the input to the target format, optionally running an audio
    /// filter (e.g. loudness normalization) in the same pass.
    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        format: OutputFormat,
        audio_filter: Option<&str>,
    ) -> ChapterResult<()>;

    /// Remux the audio stream with metadata (chapter stanzas) merged from a
    /// second input. Streams are copied, not re-encoded.
    fn merge_metadata(&self, audio: &Path, metadata: &Path, output: &Path) -> ChapterResult<()>;
}

/// Transcoder backed by an ffmpeg subprocess
pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    /// Create a transcoder using `ffmpeg` from `PATH`
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    /// Create a transcoder using a specific executable name or path
    pub fn with_program(program: impl Into<String>) -> Self {
        FfmpegTranscoder {
            program: program.into(),
        }
    }

    fn run(&self, args: &[OsString]) -> ChapterResult<()> {
        debug!("running {} {:?}", self.program, args);
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| ChapterError::ExternalTool {
                tool: self.program.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ChapterError::ExternalTool {
                tool: self.program.clone(),
                message: format!(
                    "exit status {}: {}",
                    output.status,
                    stderr_tail(&output.stderr)
                ),
            });
        }
        Ok(())
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        format: OutputFormat,
        audio_filter: Option<&str>,
    ) -> ChapterResult<()> {
        self.run(&transcode_args(input, output, format, audio_filter))
    }

    fn merge_metadata(&self, audio: &Path, metadata: &Path, output: &Path) -> ChapterResult<()> {
        self.run(&merge_args(audio, metadata, output))
    }
}

fn os(text: &str) -> OsString {
    OsString::from(text)
}

fn transcode_args(
    input: &Path,
    output: &Path,
    format: OutputFormat,
    audio_filter: Option<&str>,
) -> Vec<OsString> {
    let mut args = vec![os("-hide_banner"), os("-y"), os("-i")];
    args.push(input.as_os_str().to_os_string());
    if let Some(filter) = audio_filter {
        args.push(os("-af"));
        args.push(os(filter));
    }
    for arg in format.codec_args() {
        args.push(os(arg));
    }
    args.push(output.as_os_str().to_os_string());
    args
}

fn merge_args(audio: &Path, metadata: &Path, output: &Path) -> Vec<OsString> {
    vec![
        os("-hide_banner"),
        os("-y"),
        os("-i"),
        audio.as_os_str().to_os_string(),
        os("-i"),
        metadata.as_os_str().to_os_string(),
        os("-map_metadata"),
        os("1"),
        os("-codec"),
        os("copy"),
        output.as_os_str().to_os_string(),
    ]
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("no diagnostic output")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_args() {
        assert_eq!(
            OutputFormat::Mp3.codec_args(),
            &["-codec:a", "libmp3lame", "-q:a", "2"]
        );
        assert_eq!(
            OutputFormat::M4a.codec_args(),
            &["-codec:a", "aac", "-b:a", "192k"]
        );
    }

    #[test]
    fn test_transcode_args_with_filter() {
        let args = transcode_args(
            Path::new("in.wav"),
            Path::new("out.mp3"),
            OutputFormat::Mp3,
            Some("loudnorm=I=-16:TP=-1.5:LRA=11"),
        );
        let args: Vec<&str> = args.iter().filter_map(|a| a.to_str()).collect();

        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-y",
                "-i",
                "in.wav",
                "-af",
                "loudnorm=I=-16:TP=-1.5:LRA=11",
                "-codec:a",
                "libmp3lame",
                "-q:a",
                "2",
                "out.mp3",
            ]
        );
    }

    #[test]
    fn test_transcode_args_without_filter() {
        let args = transcode_args(
            Path::new("in.wav"),
            Path::new("out.m4a"),
            OutputFormat::M4a,
            None,
        );
        let args: Vec<&str> = args.iter().filter_map(|a| a.to_str()).collect();
        assert!(!args.contains(&"-af"));
        assert!(args.contains(&"aac"));
    }

    #[test]
    fn test_merge_args_map_metadata_from_second_input() {
        let args = merge_args(
            Path::new("a.m4a"),
            Path::new("chapters.ffmeta"),
            Path::new("out.m4a"),
        );
        let args: Vec<&str> = args.iter().filter_map(|a| a.to_str()).collect();

        let map_position = args.iter().position(|a| *a == "-map_metadata").unwrap();
        assert_eq!(args[map_position + 1], "1");
        assert!(args.contains(&"copy"));
    }

    #[test]
    fn test_stderr_tail_takes_last_line() {
        let tail = stderr_tail(b"line one\nActual error here\n\n");
        assert_eq!(tail, "Actual error here");
    }

    #[test]
    fn test_missing_program_is_tool_error() {
        let transcoder = FfmpegTranscoder::with_program("ffmpeg-does-not-exist");
        let result = transcoder.transcode(
            Path::new("in.wav"),
            Path::new("out.mp3"),
            OutputFormat::Mp3,
            None,
        );
        assert!(matches!(result, Err(ChapterError::ExternalTool { .. })));
    }
}
