//! Audio duration probing.

pub mod ffprobe;

pub use ffprobe::FfprobeProber;

use crate::error::ChapterResult;
use std::path::Path;

/// Trait for duration probers
pub trait DurationProber {
    /// Total duration of the audio file in milliseconds.
    fn probe_duration_ms(&self, path: &Path) -> ChapterResult<u64>;
}
