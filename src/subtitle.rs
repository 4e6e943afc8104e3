use serde::Serialize;

use crate::captions::{parse_multilingual_text, CaptionLanguage};
use crate::timecode::{cue_timing_regex, seconds_from_parts};

/// One timed subtitle entry as consumed by the renderer. `raw_text` keeps the
/// inline `(code)` language tags untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtitleSegment {
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub raw_text: String,
}

impl SubtitleSegment {
    /// Text of one language track, scanned out of `raw_text` with the same tag
    /// rules as the caption editor.
    pub fn track(&self, language: CaptionLanguage) -> Option<String> {
        parse_multilingual_text(&self.raw_text)
            .remove(&language)
            .flatten()
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time.unwrap_or(0.0) && time <= self.end_time.unwrap_or(0.0)
    }
}

/// Lenient SRT parse into render segments.
///
/// A timing line sets the open segment's start/end, a blank line closes it
/// (kept only when it collected text), and every other line is appended to the
/// text with a trailing space. A purely numeric line is the cue index, and is
/// skipped, only when the next non-blank line is a timing line; otherwise it is
/// caption text. An unterminated final segment is still emitted.
pub fn parse_srt(content: &str) -> Vec<SubtitleSegment> {
    let lines = content.lines().collect::<Vec<_>>();
    let mut segments = Vec::new();
    let mut current = empty_segment();

    for (index, line) in lines.iter().enumerate() {
        if let Some(caps) = cue_timing_regex().captures(line) {
            current.start_time = Some(seconds_from_parts(&caps[1], &caps[2], &caps[3], &caps[4]));
            current.end_time = Some(seconds_from_parts(&caps[5], &caps[6], &caps[7], &caps[8]));
        } else if line.trim().is_empty() {
            if !current.raw_text.is_empty() {
                segments.push(std::mem::replace(&mut current, empty_segment()));
            } else {
                current = empty_segment();
            }
        } else if !is_sequence_index(&lines, index) {
            current.raw_text.push_str(line);
            current.raw_text.push(' ');
        }
    }

    if !current.raw_text.trim().is_empty() {
        segments.push(current);
    }

    segments
}

fn empty_segment() -> SubtitleSegment {
    SubtitleSegment {
        start_time: None,
        end_time: None,
        raw_text: String::new(),
    }
}

/// True when `lines[index]` is a lone integer followed (after any blank lines)
/// by a cue timing line.
pub(crate) fn is_sequence_index(lines: &[&str], index: usize) -> bool {
    let Some(line) = lines.get(index) else {
        return false;
    };
    let trimmed = line.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    lines[index + 1..]
        .iter()
        .find(|next| !next.trim().is_empty())
        .is_some_and(|next| next.contains("-->"))
}

/// First segment, in list order, whose closed `[start, end]` range holds `time`.
/// Ties on a shared boundary resolve to the earlier segment.
pub fn subtitle_at_time(segments: &[SubtitleSegment], time: f64) -> Option<&SubtitleSegment> {
    if !time.is_finite() {
        return None;
    }
    segments.iter().find(|segment| segment.contains(time))
}
