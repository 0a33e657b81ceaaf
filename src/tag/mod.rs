//! ID3v2 tag container I/O.
//!
//! The one mutating operation on a tag container lives here: strip every
//! existing CHAP/CTOC frame, splice in a freshly encoded payload, keep all
//! other frames verbatim, and atomically replace the file. Encoding itself
//! is pure and lives in [`crate::encoder::id3`].

use crate::encoder::EncodedChapterPayload;
use crate::encoder::id3::{RawFrame, decode_syncsafe, encode_syncsafe, split_frames};
use crate::error::{ChapterError, ChapterResult};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

const HEADER_LEN: usize = 10;
const FLAG_UNSYNC: u8 = 0x80;
const FLAG_EXTENDED: u8 = 0x40;
const FLAG_FOOTER: u8 = 0x10;

/// Replace all chapter frames in the file's ID3v2 tag with the payload.
///
/// Reads any existing tag (v2.3 or v2.4), drops CHAP and CTOC frames,
/// keeps everything else, and writes the result back as an ID3v2.3 tag via
/// a temporary sibling file and an atomic rename. Running this twice with
/// the same payload is a no-op: the operation is a full replace, never an
/// append.
pub fn replace_id3_chapters(path: &Path, payload: &EncodedChapterPayload) -> ChapterResult<()> {
    let data = fs::read(path)?;
    let (mut frames, audio_start) = read_tag(&data)?;

    let before = frames.len();
    frames.retain(|frame| &frame.id != b"CHAP" && &frame.id != b"CTOC");
    if before > frames.len() {
        debug!("removed {} existing chapter frames", before - frames.len());
    }

    let mut body = Vec::new();
    for frame in &frames {
        frame.write_to(&mut body);
    }
    body.extend_from_slice(payload);

    if body.len() >= 1 << 28 {
        return Err(ChapterError::TagWrite(
            "tag exceeds the maximum ID3v2 size".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + (data.len() - audio_start));
    out.extend_from_slice(b"ID3\x03\x00\x00");
    out.extend_from_slice(&encode_syncsafe(body.len() as u32));
    out.extend_from_slice(&body);
    out.extend_from_slice(&data[audio_start..]);

    let tmp = tmp_path(path);
    fs::write(&tmp, &out)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Sibling path for the temporary file, so the rename stays on one
/// filesystem.
fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Parse an existing ID3v2 tag.
///
/// Returns the frames to retain and the byte offset where the audio stream
/// begins. A file without a tag yields no frames and offset zero.
fn read_tag(data: &[u8]) -> ChapterResult<(Vec<RawFrame>, usize)> {
    if data.len() < HEADER_LEN || &data[..3] != b"ID3" {
        return Ok((Vec::new(), 0));
    }

    let version = data[3];
    if !(3..=4).contains(&version) {
        return Err(ChapterError::TagParse(format!(
            "unsupported ID3v2.{version} tag"
        )));
    }
    let flags = data[5];
    if flags & FLAG_UNSYNC != 0 {
        return Err(ChapterError::TagParse(
            "unsynchronised tags are not supported".to_string(),
        ));
    }

    let size = decode_syncsafe([data[6], data[7], data[8], data[9]])? as usize;
    let tag_end = (HEADER_LEN + size).min(data.len());

    let mut frames_start = HEADER_LEN;
    if flags & FLAG_EXTENDED != 0 {
        if frames_start + 4 > tag_end {
            return Err(ChapterError::TagParse(
                "truncated extended header".to_string(),
            ));
        }
        let raw = [data[10], data[11], data[12], data[13]];
        // The v2.4 size field includes itself, the v2.3 one excludes it
        let skip = if version == 4 {
            decode_syncsafe(raw)? as usize
        } else {
            u32::from_be_bytes(raw) as usize + 4
        };
        frames_start += skip;
        if frames_start > tag_end {
            return Err(ChapterError::TagParse(
                "extended header overruns the tag".to_string(),
            ));
        }
    }

    let frames = split_frames(&data[frames_start..tag_end], version)?;

    let audio_start = if version == 4 && flags & FLAG_FOOTER != 0 {
        (tag_end + HEADER_LEN).min(data.len())
    } else {
        tag_end
    };

    Ok((frames, audio_start))
}
