use std::sync::OnceLock;

use regex::Regex;

/// Matches one `HH:MM:SS,mmm --> HH:MM:SS,mmm` cue timing line.
pub fn cue_timing_regex() -> &'static Regex {
    static CUE_TIMING_RE: OnceLock<Regex> = OnceLock::new();
    CUE_TIMING_RE.get_or_init(|| {
        Regex::new(r"(\d{2}):(\d{2}):(\d{2}),(\d{3}) --> (\d{2}):(\d{2}):(\d{2}),(\d{3})")
            .expect("cue timing regex should compile")
    })
}

/// Converts the four numeric captures of one side of a cue timing line into seconds.
/// Captures that fail to parse count as 0.
pub fn seconds_from_parts(hours: &str, minutes: &str, seconds: &str, millis: &str) -> f64 {
    let part = |raw: &str| raw.trim().parse::<u32>().map(f64::from).unwrap_or(0.0);
    part(hours) * 3600.0 + part(minutes) * 60.0 + part(seconds) + part(millis) / 1000.0
}

/// Lenient `HH:MM:SS,mmm` parser. Missing or garbled fields are treated as 0,
/// and `.` is accepted in place of the millisecond comma.
pub fn parse_timecode(raw: &str) -> f64 {
    let raw = raw.trim();
    let (clock, millis) = match raw.split_once(|c: char| c == ',' || c == '.') {
        Some((clock, millis)) => (clock, millis),
        None => (raw, "0"),
    };

    let mut fields = clock.rsplit(':');
    let seconds = fields.next().unwrap_or("0");
    let minutes = fields.next().unwrap_or("0");
    let hours = fields.next().unwrap_or("0");

    seconds_from_parts(hours, minutes, seconds, millis)
}

/// Formats seconds as `HH:MM:SS,mmm`, flooring every field. Negative and
/// non-finite inputs clamp to zero.
pub fn format_timecode(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    // Round to whole milliseconds first so 2.5 never renders as 2,499.
    let total_millis = (seconds * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::{cue_timing_regex, format_timecode, parse_timecode};

    #[test]
    fn parses_full_timecode() {
        assert!((parse_timecode("01:02:03,450") - 3723.45).abs() < 1e-9);
    }

    #[test]
    fn parse_is_lenient_about_missing_fields() {
        assert_eq!(parse_timecode(""), 0.0);
        assert_eq!(parse_timecode("05"), 5.0);
        assert!((parse_timecode("00:01.5") - 60.005).abs() < 1e-9);
        assert_eq!(parse_timecode("aa:bb:cc,ddd"), 0.0);
    }

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(format_timecode(0.0), "00:00:00,000");
        assert_eq!(format_timecode(2.5), "00:00:02,500");
        assert_eq!(format_timecode(3723.45), "01:02:03,450");
        assert_eq!(format_timecode(-4.0), "00:00:00,000");
    }

    #[test]
    fn cue_regex_captures_both_sides() {
        let caps = cue_timing_regex()
            .captures("00:00:01,000 --> 00:00:02,500")
            .expect("cue line should match");
        assert_eq!(&caps[4], "000");
        assert_eq!(&caps[8], "500");
    }
}
