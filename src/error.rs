use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for chapter operations
pub type ChapterResult<T> = Result<T, ChapterError>;

/// Error types for chapter embedding and loudness normalization
#[derive(Error, Debug)]
pub enum ChapterError {
    /// IO error (file operations, disk access)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Input file does not exist
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    /// Label input produced zero usable chapter markers
    #[error("No chapter markers found: {0}")]
    NoChaptersFound(String),

    /// Every resolved interval was zero- or negative-length
    #[error("Degenerate chapter interval: {0}")]
    DegenerateInterval(String),

    /// Chapter payload could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// Existing tag or payload data could not be parsed
    #[error("Tag parse error: {0}")]
    TagParse(String),

    /// Tag container could not be rewritten
    #[error("Tag write error: {0}")]
    TagWrite(String),

    /// External tool (ffmpeg, ffprobe) failed or produced unusable output
    #[error("{tool} failed: {message}")]
    ExternalTool {
        /// Name of the external program
        tool: String,
        /// What went wrong
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
