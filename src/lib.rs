#![warn(missing_docs)]

//! # Chapmark: Audio Chapter Embedding Toolkit
//!
//! Derives chapter boundaries from Audacity label exports and embeds them
//! into audio containers, optionally normalizing loudness on the way.
//!
//! ## Features
//!
//! - **Parse** - Audacity tab-separated label files
//! - **Resolve** - markers + total duration into gapless chapter intervals
//! - **Encode** - ID3v2 CHAP/CTOC frames, Nero chapter XML, FFMETADATA
//! - **Normalize** - two-pass EBU R128 loudness with single-pass fallback
//! - **CLI** - end-to-end M4A/MP3 export with embedded chapters
//!
//! ## Quick Start
//!
//! ```ignore
//! use chapmark::chapter::{self, ChapterEvent};
//! use chapmark::encoder::{ChapterEncoder, FfmetaChapterEncoder};
//!
//! let events = vec![
//!     ChapterEvent { start_ms: 0, title: "Intro".into() },
//!     ChapterEvent { start_ms: 10_500, title: "Chapter Two".into() },
//! ];
//! let chapters = chapter::resolve(events, 20_000)?;
//! let payload = FfmetaChapterEncoder.encode(&chapters)?;
//! ```
//!
//! Transcoding, duration probing and loudness measurement are delegated to
//! ffmpeg/ffprobe subprocesses behind the [`transcode::Transcoder`],
//! [`probe::DurationProber`] and [`loudness::LoudnessFilter`] traits.

// Declare modules
/// Chapter timing types and resolution
pub mod chapter;
/// Chapter tag encoder implementations
pub mod encoder;
/// Error types for chapter operations
pub mod error;
/// Audacity label file parsing
pub mod label;
/// Loudness normalization pipeline
pub mod loudness;
/// End-to-end embedding pipeline
pub mod pipeline;
/// Audio duration probing
pub mod probe;
/// Tag container I/O
pub mod tag;
/// Audio transcoding
pub mod transcode;

// Export public types
pub use chapter::{ChapterEvent, ResolvedChapter};
pub use error::{ChapterError, ChapterResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
