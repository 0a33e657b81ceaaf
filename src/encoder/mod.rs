//! Chapter tag encoder implementations.
//!
//! Encoders are pure: resolved chapters in, container-specific payload out.
//! All side effects (tag rewriting, metadata merging) live in [`crate::tag`]
//! and [`crate::pipeline`].

pub mod ffmeta;
pub mod id3;
pub mod nero;

pub use ffmeta::FfmetaChapterEncoder;
pub use id3::Id3ChapterEncoder;
pub use nero::NeroChapterEncoder;

use crate::chapter::ResolvedChapter;
use crate::error::ChapterResult;

/// Opaque, container-specific chapter payload.
pub type EncodedChapterPayload = Vec<u8>;

/// Trait for chapter tag encoders
pub trait ChapterEncoder {
    /// Serialize resolved chapters into a container-specific payload.
    ///
    /// Deterministic: the same chapter list always yields the same bytes.
    fn encode(&self, chapters: &[ResolvedChapter]) -> ChapterResult<EncodedChapterPayload>;
}
