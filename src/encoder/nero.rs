//! Nero-style MP4 chapter XML encoding.

use crate::chapter::ResolvedChapter;
use crate::encoder::{ChapterEncoder, EncodedChapterPayload};
use crate::error::ChapterResult;

/// Nero chapter XML encoder
pub struct NeroChapterEncoder;

impl ChapterEncoder for NeroChapterEncoder {
    fn encode(&self, chapters: &[ResolvedChapter]) -> ChapterResult<EncodedChapterPayload> {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<chapters>\n");
        for chapter in chapters {
            xml.push_str(&format!(
                "  <chapter starttime=\"{}\" title=\"{}\" />\n",
                format_timecode(chapter.start_ms),
                escape_attribute(&chapter.title)
            ));
        }
        xml.push_str("</chapters>");
        Ok(xml.into_bytes())
    }
}

/// Format milliseconds as `HH:MM:SS.mmm`.
///
/// Integer division only, so the timecode never drifts the way naive float
/// formatting can.
pub fn format_timecode(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

fn escape_attribute(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
