//! FFMETADATA chapter block encoding.
//!
//! The payload is merged into an MP4 container via ffmpeg's
//! `-map_metadata` feature. Field order within a `[CHAPTER]` stanza is part
//! of the wire contract and must not change.

use crate::chapter::ResolvedChapter;
use crate::encoder::{ChapterEncoder, EncodedChapterPayload};
use crate::error::{ChapterError, ChapterResult};
use std::fmt::Write;

/// Magic first line of an FFMETADATA document
pub const FFMETADATA_HEADER: &str = ";FFMETADATA1";

/// FFMETADATA chapter encoder
pub struct FfmetaChapterEncoder;

impl ChapterEncoder for FfmetaChapterEncoder {
    fn encode(&self, chapters: &[ResolvedChapter]) -> ChapterResult<EncodedChapterPayload> {
        let mut out = String::new();
        out.push_str(FFMETADATA_HEADER);
        out.push('\n');

        for chapter in chapters {
            // The format is line-based; an embedded newline would corrupt
            // every following stanza
            if chapter.title.contains('\n') || chapter.title.contains('\r') {
                return Err(ChapterError::Encode(format!(
                    "chapter title {:?} contains a newline",
                    chapter.title
                )));
            }
            out.push_str("[CHAPTER]\n");
            out.push_str("TIMEBASE=1/1000\n");
            let _ = writeln!(out, "START={}", chapter.start_ms);
            let _ = writeln!(out, "END={}", chapter.end_ms);
            let _ = writeln!(out, "title={}", chapter.title);
        }

        Ok(out.into_bytes())
    }
}

/// Parse chapter stanzas back out of an FFMETADATA payload.
///
/// Round-trip counterpart of [`FfmetaChapterEncoder`]; only `[CHAPTER]`
/// stanzas are interpreted, global keys are ignored.
pub fn decode(payload: &[u8]) -> ChapterResult<Vec<ResolvedChapter>> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| ChapterError::TagParse(format!("payload is not UTF-8: {e}")))?;
    let mut lines = text.lines();

    if lines.next() != Some(FFMETADATA_HEADER) {
        return Err(ChapterError::TagParse(format!(
            "missing {FFMETADATA_HEADER} header"
        )));
    }

    let mut chapters = Vec::new();
    let mut current: Option<(Option<u64>, Option<u64>, Option<String>)> = None;

    for line in lines {
        if line == "[CHAPTER]" {
            if let Some(stanza) = current.take() {
                chapters.push(finish_stanza(stanza)?);
            }
            current = Some((None, None, None));
            continue;
        }
        let Some(stanza) = current.as_mut() else {
            continue;
        };
        if let Some(value) = line.strip_prefix("START=") {
            stanza.0 = Some(parse_ms(value)?);
        } else if let Some(value) = line.strip_prefix("END=") {
            stanza.1 = Some(parse_ms(value)?);
        } else if let Some(value) = line.strip_prefix("title=") {
            stanza.2 = Some(value.to_string());
        }
    }
    if let Some(stanza) = current.take() {
        chapters.push(finish_stanza(stanza)?);
    }

    Ok(chapters)
}

fn parse_ms(value: &str) -> ChapterResult<u64> {
    value
        .parse()
        .map_err(|e| ChapterError::TagParse(format!("bad chapter time {value:?}: {e}")))
}

fn finish_stanza(
    (start, end, title): (Option<u64>, Option<u64>, Option<String>),
) -> ChapterResult<ResolvedChapter> {
    match (start, end, title) {
        (Some(start_ms), Some(end_ms), Some(title)) => Ok(ResolvedChapter {
            start_ms,
            end_ms,
            title,
        }),
        _ => Err(ChapterError::TagParse(
            "incomplete [CHAPTER] stanza".to_string(),
        )),
    }
}
