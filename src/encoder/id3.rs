//! ID3v2 CHAP/CTOC chapter frame encoding.
//!
//! Produces a blob of ID3v2.3 frames: one CHAP frame per chapter, each
//! carrying an embedded TIT2 title subframe, followed by a single top-level
//! ordered CTOC frame listing every chapter element id. The blob is spliced
//! into a tag by [`crate::tag::replace_id3_chapters`].

use crate::chapter::ResolvedChapter;
use crate::encoder::{ChapterEncoder, EncodedChapterPayload};
use crate::error::{ChapterError, ChapterResult};

/// ID3v2 text encoding byte for UTF-8
const ENCODING_UTF8: u8 = 0x03;
/// Sentinel for the unused byte-offset fields of a CHAP frame
const OFFSET_UNUSED: u32 = 0xFFFF_FFFF;
/// CTOC flag: entry is a root of the chapter hierarchy
const CTOC_TOP_LEVEL: u8 = 0x02;
/// CTOC flag: child entries must be played in listed order
const CTOC_ORDERED: u8 = 0x01;
/// Element id of the single table-of-contents frame
const TOC_ELEMENT_ID: &str = "toc";
/// Title carried by the table-of-contents frame
const TOC_TITLE: &str = "Table of Contents";

/// ID3v2 chapter frame encoder
pub struct Id3ChapterEncoder;

impl ChapterEncoder for Id3ChapterEncoder {
    fn encode(&self, chapters: &[ResolvedChapter]) -> ChapterResult<EncodedChapterPayload> {
        let mut out = Vec::new();
        let mut child_ids = Vec::with_capacity(chapters.len());

        for (index, chapter) in chapters.iter().enumerate() {
            // Ids are stable within one encoding call but carry no meaning
            // across calls
            let element_id = format!("chp{index}");
            chap_frame(&element_id, chapter)?.write_to(&mut out);
            child_ids.push(element_id);
        }

        ctoc_frame(TOC_ELEMENT_ID, &child_ids)?.write_to(&mut out);
        Ok(out)
    }
}

/// One raw ID3v2 frame split out of a frames blob.
pub(crate) struct RawFrame {
    /// Four-character frame id, e.g. `CHAP`
    pub id: [u8; 4],
    /// Frame status/format flags, preserved verbatim
    pub flags: [u8; 2],
    /// Frame body
    pub body: Vec<u8>,
}

impl RawFrame {
    fn new(id: [u8; 4], body: Vec<u8>) -> Self {
        RawFrame {
            id,
            flags: [0, 0],
            body,
        }
    }

    /// Serialize with an ID3v2.3 frame header (plain big-endian size).
    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id);
        out.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.flags);
        out.extend_from_slice(&self.body);
    }
}

/// Split a frames blob into raw frames.
///
/// `version` is the ID3v2 major version of the surrounding tag; it decides
/// the frame size encoding (plain big-endian in v2.3, syncsafe in v2.4).
/// Stops at the first padding byte.
pub(crate) fn split_frames(blob: &[u8], version: u8) -> ChapterResult<Vec<RawFrame>> {
    let mut frames = Vec::new();
    let mut pos = 0usize;

    while pos + 10 <= blob.len() {
        if blob[pos] == 0 {
            // Padding
            break;
        }

        let id = [blob[pos], blob[pos + 1], blob[pos + 2], blob[pos + 3]];
        if !id
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(ChapterError::TagParse(format!(
                "invalid frame id {:?} at offset {}",
                String::from_utf8_lossy(&id),
                pos
            )));
        }

        let raw_size = [blob[pos + 4], blob[pos + 5], blob[pos + 6], blob[pos + 7]];
        let size = if version >= 4 {
            decode_syncsafe(raw_size)? as usize
        } else {
            u32::from_be_bytes(raw_size) as usize
        };
        let flags = [blob[pos + 8], blob[pos + 9]];
        pos += 10;

        if pos + size > blob.len() {
            return Err(ChapterError::TagParse(format!(
                "truncated {} frame ({} bytes declared, {} available)",
                String::from_utf8_lossy(&id),
                size,
                blob.len() - pos
            )));
        }

        frames.push(RawFrame {
            id,
            flags,
            body: blob[pos..pos + size].to_vec(),
        });
        pos += size;
    }

    Ok(frames)
}

/// Decode a 28-bit syncsafe integer.
pub(crate) fn decode_syncsafe(bytes: [u8; 4]) -> ChapterResult<u32> {
    if bytes.iter().any(|&b| b & 0x80 != 0) {
        return Err(ChapterError::TagParse(
            "syncsafe integer with high bit set".to_string(),
        ));
    }
    Ok(((bytes[0] as u32) << 21)
        | ((bytes[1] as u32) << 14)
        | ((bytes[2] as u32) << 7)
        | bytes[3] as u32)
}

/// Encode a 28-bit syncsafe integer.
pub(crate) fn encode_syncsafe(value: u32) -> [u8; 4] {
    [
        ((value >> 21) & 0x7f) as u8,
        ((value >> 14) & 0x7f) as u8,
        ((value >> 7) & 0x7f) as u8,
        (value & 0x7f) as u8,
    ]
}

fn text_frame(id: [u8; 4], text: &str) -> RawFrame {
    let mut body = Vec::with_capacity(1 + text.len());
    body.push(ENCODING_UTF8);
    body.extend_from_slice(text.as_bytes());
    RawFrame::new(id, body)
}

fn chapter_time(ms: u64, what: &str) -> ChapterResult<u32> {
    u32::try_from(ms).map_err(|_| {
        ChapterError::Encode(format!("chapter {what} {ms} ms exceeds the CHAP frame range"))
    })
}

fn chap_frame(element_id: &str, chapter: &ResolvedChapter) -> ChapterResult<RawFrame> {
    let start = chapter_time(chapter.start_ms, "start")?;
    let end = chapter_time(chapter.end_ms, "end")?;

    let mut body = Vec::new();
    body.extend_from_slice(element_id.as_bytes());
    body.push(0);
    body.extend_from_slice(&start.to_be_bytes());
    body.extend_from_slice(&end.to_be_bytes());
    body.extend_from_slice(&OFFSET_UNUSED.to_be_bytes());
    body.extend_from_slice(&OFFSET_UNUSED.to_be_bytes());
    text_frame(*b"TIT2", &chapter.title).write_to(&mut body);

    Ok(RawFrame::new(*b"CHAP", body))
}

fn ctoc_frame(element_id: &str, child_ids: &[String]) -> ChapterResult<RawFrame> {
    let count = u8::try_from(child_ids.len()).map_err(|_| {
        ChapterError::Encode(format!(
            "{} chapters exceed the CTOC entry limit of 255",
            child_ids.len()
        ))
    })?;

    let mut body = Vec::new();
    body.extend_from_slice(element_id.as_bytes());
    body.push(0);
    body.push(CTOC_TOP_LEVEL | CTOC_ORDERED);
    body.push(count);
    for child in child_ids {
        body.extend_from_slice(child.as_bytes());
        body.push(0);
    }
    text_frame(*b"TIT2", TOC_TITLE).write_to(&mut body);

    Ok(RawFrame::new(*b"CTOC", body))
}

fn read_nul_string(body: &[u8]) -> ChapterResult<(String, &[u8])> {
    let nul = body
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ChapterError::TagParse("unterminated element id".to_string()))?;
    let id = String::from_utf8(body[..nul].to_vec())
        .map_err(|e| ChapterError::TagParse(format!("element id is not UTF-8: {e}")))?;
    Ok((id, &body[nul + 1..]))
}

fn embedded_title(subframes: &[u8]) -> ChapterResult<String> {
    for frame in split_frames(subframes, 3)? {
        if &frame.id != b"TIT2" || frame.body.is_empty() {
            continue;
        }
        if frame.body[0] != ENCODING_UTF8 {
            return Err(ChapterError::TagParse(format!(
                "unexpected TIT2 encoding byte {:#04x}",
                frame.body[0]
            )));
        }
        return String::from_utf8(frame.body[1..].to_vec())
            .map_err(|e| ChapterError::TagParse(format!("TIT2 text is not UTF-8: {e}")));
    }
    Err(ChapterError::TagParse(
        "no TIT2 subframe found".to_string(),
    ))
}

/// Decode CHAP frames from a payload back into resolved chapters.
///
/// Used for round-trip verification; tolerates non-chapter frames in the
/// blob and returns chapters in frame order.
pub fn decode(payload: &[u8]) -> ChapterResult<Vec<ResolvedChapter>> {
    let mut chapters = Vec::new();

    for frame in split_frames(payload, 3)? {
        if &frame.id != b"CHAP" {
            continue;
        }
        let (_, rest) = read_nul_string(&frame.body)?;
        if rest.len() < 16 {
            return Err(ChapterError::TagParse("CHAP frame too short".to_string()));
        }
        let start_ms = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as u64;
        let end_ms = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as u64;
        // Bytes 8..16 are the unused byte offsets
        let title = embedded_title(&rest[16..])?;

        chapters.push(ResolvedChapter {
            start_ms,
            end_ms,
            title,
        });
    }

    Ok(chapters)
}

/// A decoded table-of-contents frame.
#[derive(Debug, PartialEq, Eq)]
pub struct TableOfContents {
    /// Raw CTOC flag byte (top-level, ordered)
    pub flags: u8,
    /// Child element ids in presentation order
    pub child_ids: Vec<String>,
    /// Embedded TIT2 title
    pub title: String,
}

/// Decode the CTOC frame from a payload, if present.
pub fn decode_toc(payload: &[u8]) -> ChapterResult<Option<TableOfContents>> {
    for frame in split_frames(payload, 3)? {
        if &frame.id != b"CTOC" {
            continue;
        }
        let (_, rest) = read_nul_string(&frame.body)?;
        if rest.len() < 2 {
            return Err(ChapterError::TagParse("CTOC frame too short".to_string()));
        }
        let flags = rest[0];
        let count = rest[1] as usize;
        let mut rest = &rest[2..];
        let mut child_ids = Vec::with_capacity(count);
        for _ in 0..count {
            let (child, remaining) = read_nul_string(rest)?;
            child_ids.push(child);
            rest = remaining;
        }
        let title = embedded_title(rest)?;

        return Ok(Some(TableOfContents {
            flags,
            child_ids,
            title,
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapters() -> Vec<ResolvedChapter> {
        vec![
            ResolvedChapter {
                start_ms: 0,
                end_ms: 10_500,
                title: "Intro".to_string(),
            },
            ResolvedChapter {
                start_ms: 10_500,
                end_ms: 20_000,
                title: "Chapter Two".to_string(),
            },
        ]
    }

    #[test]
    fn test_round_trip() {
        let payload = Id3ChapterEncoder.encode(&chapters()).unwrap();
        let decoded = decode(&payload).unwrap();
        assert_eq!(decoded, chapters());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = Id3ChapterEncoder.encode(&chapters()).unwrap();
        let b = Id3ChapterEncoder.encode(&chapters()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_toc_is_top_level_ordered() {
        let payload = Id3ChapterEncoder.encode(&chapters()).unwrap();
        let toc = decode_toc(&payload).unwrap().unwrap();

        assert_eq!(toc.flags, CTOC_TOP_LEVEL | CTOC_ORDERED);
        assert_eq!(toc.child_ids, vec!["chp0", "chp1"]);
        assert_eq!(toc.title, "Table of Contents");
    }

    #[test]
    fn test_unicode_title_survives() {
        let list = vec![ResolvedChapter {
            start_ms: 0,
            end_ms: 1000,
            title: "Überblick 第一章".to_string(),
        }];
        let payload = Id3ChapterEncoder.encode(&list).unwrap();
        assert_eq!(decode(&payload).unwrap(), list);
    }

    #[test]
    fn test_start_past_u32_range_is_rejected() {
        let list = vec![ResolvedChapter {
            start_ms: u64::from(u32::MAX) + 1,
            end_ms: u64::from(u32::MAX) + 2,
            title: "Too far".to_string(),
        }];
        assert!(matches!(
            Id3ChapterEncoder.encode(&list),
            Err(ChapterError::Encode(_))
        ));
    }

    #[test]
    fn test_syncsafe_round_trip() {
        for value in [0u32, 1, 127, 128, 0x0FFF_FFFF] {
            assert_eq!(decode_syncsafe(encode_syncsafe(value)).unwrap(), value);
        }
    }

    #[test]
    fn test_split_frames_stops_at_padding() {
        let mut blob = Vec::new();
        text_frame(*b"TIT2", "hello").write_to(&mut blob);
        blob.extend_from_slice(&[0u8; 32]);

        let frames = split_frames(&blob, 3).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].id, b"TIT2");
    }

    #[test]
    fn test_split_frames_rejects_truncated() {
        let mut blob = Vec::new();
        text_frame(*b"TIT2", "hello").write_to(&mut blob);
        blob.truncate(blob.len() - 2);

        assert!(matches!(
            split_frames(&blob, 3),
            Err(ChapterError::TagParse(_))
        ));
    }
}
