//! Audacity label file parsing.
//!
//! Audacity exports labels as tab-separated lines of `start`, `end`, `title`.
//! Only the start time and the title are used: end times are derived by the
//! resolver, since labels edited by hand are often non-contiguous.

use crate::chapter::ChapterEvent;
use crate::error::{ChapterError, ChapterResult};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Parse Audacity label text into unresolved chapter events.
///
/// Blank lines and lines with fewer than three tab-separated fields are
/// skipped silently. Field 0 is the start time in float seconds, field 1 is
/// ignored, fields 2 onward (rejoined with tabs) form the title. Zero usable
/// events is a [`ChapterError::NoChaptersFound`] error, never a valid empty
/// list.
pub fn parse_labels<R: Read>(reader: R) -> ChapterResult<Vec<ChapterEvent>> {
    let mut events = Vec::new();
    let mut lines_seen = 0usize;
    let mut skipped = 0usize;

    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        lines_seen += 1;

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            skipped += 1;
            debug!("skipping label line {}: fewer than 3 fields", index + 1);
            continue;
        }

        let start_sec: f64 = match fields[0].trim().parse() {
            Ok(v) if v >= 0.0 => v,
            _ => {
                skipped += 1;
                debug!(
                    "skipping label line {}: unusable start time {:?}",
                    index + 1,
                    fields[0]
                );
                continue;
            }
        };

        // A title may itself contain literal tabs
        let title = fields[2..].join("\t");

        events.push(ChapterEvent {
            start_ms: (start_sec * 1000.0).round() as u64,
            title,
        });
    }

    if events.is_empty() {
        let message = if lines_seen == 0 {
            "label input is empty".to_string()
        } else {
            format!("none of {lines_seen} label lines were parseable ({skipped} skipped)")
        };
        return Err(ChapterError::NoChaptersFound(message));
    }

    debug!("parsed {} chapter markers ({} lines skipped)", events.len(), skipped);
    Ok(events)
}

/// Parse an Audacity label file from disk.
pub fn parse_label_file<P: AsRef<Path>>(path: P) -> ChapterResult<Vec<ChapterEvent>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ChapterError::InputNotFound(path.to_path_buf()));
    }
    parse_labels(File::open(path)?)
}
