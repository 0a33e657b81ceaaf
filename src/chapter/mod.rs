//! Chapter timing types and resolution.
//!
//! The resolver owns the conversion from unordered start markers into a
//! gapless, ordered interval list. End times are always derived from the
//! following marker (or the total duration), never read from input.

use crate::error::{ChapterError, ChapterResult};
use log::warn;

/// An unresolved chapter start marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterEvent {
    /// Chapter start position in milliseconds
    pub start_ms: u64,
    /// Chapter title, verbatim from the label line
    pub title: String,
}

/// A resolved chapter interval.
///
/// Invariant: `start_ms < end_ms`, and in a resolved list the end of each
/// chapter equals the start of the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChapter {
    /// Start position in milliseconds (inclusive)
    pub start_ms: u64,
    /// End position in milliseconds (exclusive)
    pub end_ms: u64,
    /// Chapter title
    pub title: String,
}

impl ResolvedChapter {
    /// Interval length in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Resolve start markers into a gapless, ordered chapter list.
///
/// Markers at or past `total_duration_ms` are dropped with a warning before
/// any end time is derived, so they can never stretch a neighbour past the
/// track end. The survivors are stably sorted by start time; each chapter
/// ends where the next one starts, the last at `total_duration_ms`, and
/// zero-length intervals (duplicate start times) are dropped with a warning.
/// If nothing survives, the whole resolution fails with
/// [`ChapterError::DegenerateInterval`].
///
/// Note that audio before the first marker is not represented: if the first
/// marker starts at 12s, the first 12s belong to no chapter.
pub fn resolve(
    mut events: Vec<ChapterEvent>,
    total_duration_ms: u64,
) -> ChapterResult<Vec<ResolvedChapter>> {
    if events.is_empty() {
        return Err(ChapterError::NoChaptersFound("empty event list".to_string()));
    }
    let candidate_count = events.len();

    // Markers at or past the track end must go before end times are
    // derived, or their start would leak into the previous chapter's end
    events.retain(|event| {
        if event.start_ms >= total_duration_ms {
            warn!(
                "dropping out-of-range marker {:?} (start {} ms, duration {} ms)",
                event.title, event.start_ms, total_duration_ms
            );
            false
        } else {
            true
        }
    });

    // Stable sort keeps the original input order for equal start times
    events.sort_by_key(|e| e.start_ms);

    let mut chapters = Vec::with_capacity(events.len());
    for i in 0..events.len() {
        let end_ms = if i + 1 < events.len() {
            events[i + 1].start_ms
        } else {
            total_duration_ms
        };
        let event = &events[i];

        if end_ms <= event.start_ms {
            warn!(
                "dropping degenerate chapter {:?} (start {} ms, end {} ms)",
                event.title, event.start_ms, end_ms
            );
            continue;
        }

        chapters.push(ResolvedChapter {
            start_ms: event.start_ms,
            end_ms,
            title: event.title.clone(),
        });
    }

    if chapters.is_empty() {
        return Err(ChapterError::DegenerateInterval(format!(
            "all {candidate_count} markers produced zero-length intervals against a duration of {total_duration_ms} ms"
        )));
    }

    Ok(chapters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(start_ms: u64, title: &str) -> ChapterEvent {
        ChapterEvent {
            start_ms,
            title: title.to_string(),
        }
    }

    #[test]
    fn test_resolve_two_markers() {
        let events = vec![event(0, "Intro"), event(10_500, "Chapter Two")];
        let chapters = resolve(events, 20_000).unwrap();

        assert_eq!(
            chapters,
            vec![
                ResolvedChapter {
                    start_ms: 0,
                    end_ms: 10_500,
                    title: "Intro".to_string()
                },
                ResolvedChapter {
                    start_ms: 10_500,
                    end_ms: 20_000,
                    title: "Chapter Two".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_resolve_sorts_unordered_input() {
        let events = vec![event(5000, "B"), event(0, "A"), event(9000, "C")];
        let chapters = resolve(events, 12_000).unwrap();

        let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_resolve_is_gapless() {
        let events = vec![event(1000, "A"), event(4000, "B"), event(7500, "C")];
        let chapters = resolve(events, 10_000).unwrap();

        for pair in chapters.windows(2) {
            assert_eq!(pair[0].end_ms, pair[1].start_ms);
        }
        assert_eq!(chapters.last().unwrap().end_ms, 10_000);
    }

    #[test]
    fn test_resolve_drops_marker_past_duration() {
        let events = vec![event(0, "Keep"), event(30_000, "Past the end")];
        let chapters = resolve(events, 20_000).unwrap();

        // The out-of-range marker is dropped before end derivation; the
        // survivor runs to the track end, not to the dropped start time
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Keep");
        assert_eq!(chapters[0].end_ms, 20_000);
    }

    #[test]
    fn test_resolve_drops_every_out_of_range_marker() {
        let events = vec![
            event(0, "A"),
            event(30_000, "B"),
            event(31_000, "C"),
        ];
        let chapters = resolve(events, 20_000).unwrap();

        // Neither out-of-range marker may survive or leak its start time
        assert_eq!(
            chapters,
            vec![ResolvedChapter {
                start_ms: 0,
                end_ms: 20_000,
                title: "A".to_string()
            }]
        );
    }

    #[test]
    fn test_resolve_marker_at_exact_duration_is_dropped() {
        let events = vec![event(0, "Body"), event(20_000, "At the edge")];
        let chapters = resolve(events, 20_000).unwrap();

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].end_ms, 20_000);
    }

    #[test]
    fn test_resolve_last_chapter_always_ends_at_duration() {
        let events = vec![event(1000, "A"), event(50_000, "B"), event(4000, "C")];
        let chapters = resolve(events, 10_000).unwrap();

        assert_eq!(chapters.last().unwrap().end_ms, 10_000);
        for chapter in &chapters {
            assert!(chapter.end_ms <= 10_000);
            assert!(chapter.start_ms < chapter.end_ms);
        }
    }

    #[test]
    fn test_resolve_duplicate_start_keeps_later() {
        let events = vec![event(0, "First"), event(0, "Second")];
        let chapters = resolve(events, 5000).unwrap();

        // The earlier duplicate becomes a zero-length interval and is dropped
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Second");
    }

    #[test]
    fn test_resolve_zero_duration_is_degenerate() {
        let events = vec![event(0, "Only")];
        let result = resolve(events, 0);

        assert!(matches!(result, Err(ChapterError::DegenerateInterval(_))));
    }

    #[test]
    fn test_resolve_empty_events() {
        let result = resolve(Vec::new(), 10_000);
        assert!(matches!(result, Err(ChapterError::NoChaptersFound(_))));
    }

    #[test]
    fn test_leading_gap_is_not_a_chapter() {
        // Current behavior: time before the first marker belongs to no chapter
        let events = vec![event(12_000, "Late start")];
        let chapters = resolve(events, 20_000).unwrap();

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].start_ms, 12_000);
    }
}
