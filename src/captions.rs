use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error_codes::CodedError;
use crate::subtitle::{is_sequence_index, SubtitleSegment};
use crate::timecode::{format_timecode, parse_timecode};

/// The closed set of caption tracks a subtitle file may carry. Declaration
/// order is the order tracks are written back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CaptionLanguage {
    #[serde(rename = "yue")]
    Cantonese,
    #[serde(rename = "zh")]
    Mandarin,
    #[serde(rename = "wuu_SH")]
    Shanghainese,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "yue_TISA")]
    Taishanese,
    #[serde(rename = "wuu_TE")]
    Teochew,
    #[serde(rename = "min_NAN")]
    Hokkien,
}

impl CaptionLanguage {
    pub const ALL: [CaptionLanguage; 7] = [
        Self::Cantonese,
        Self::Mandarin,
        Self::Shanghainese,
        Self::English,
        Self::Taishanese,
        Self::Teochew,
        Self::Hokkien,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::Cantonese => "yue",
            Self::Mandarin => "zh",
            Self::Shanghainese => "wuu_SH",
            Self::English => "en",
            Self::Taishanese => "yue_TISA",
            Self::Teochew => "wuu_TE",
            Self::Hokkien => "min_NAN",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cantonese => "Cantonese",
            Self::Mandarin => "Mandarin",
            Self::Shanghainese => "Shanghainese",
            Self::English => "English",
            Self::Taishanese => "Taishanese",
            Self::Teochew => "Teochew",
            Self::Hokkien => "Hokkien",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|language| language.code() == code.trim())
            .ok_or_else(|| {
                anyhow!(CodedError::usage(
                    "UNKNOWN_LANGUAGE_CODE",
                    format!("unknown caption language code '{code}'"),
                )
                .with_details(json!({
                    "provided": code,
                    "allowed": Self::ALL.iter().map(|l| l.code()).collect::<Vec<_>>(),
                })))
            })
    }

    fn tag(self) -> String {
        format!("({})", self.code())
    }
}

impl fmt::Display for CaptionLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Per-language caption text. A language missing from the map is an absent
/// track; an empty string is a present but empty track. Serialised as a full
/// map over every language with `null` for absent tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<CaptionLanguage, Option<String>>",
    into = "BTreeMap<CaptionLanguage, Option<String>>"
)]
pub struct CaptionText(BTreeMap<CaptionLanguage, String>);

impl CaptionText {
    pub fn get(&self, language: CaptionLanguage) -> Option<&str> {
        self.0.get(&language).map(String::as_str)
    }

    pub fn set(&mut self, language: CaptionLanguage, text: Option<String>) {
        match text {
            Some(text) => {
                self.0.insert(language, text);
            }
            None => {
                self.0.remove(&language);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Present tracks in language order.
    pub fn iter(&self) -> impl Iterator<Item = (CaptionLanguage, &str)> {
        self.0.iter().map(|(language, text)| (*language, text.as_str()))
    }
}

impl From<BTreeMap<CaptionLanguage, Option<String>>> for CaptionText {
    fn from(map: BTreeMap<CaptionLanguage, Option<String>>) -> Self {
        Self(
            map.into_iter()
                .filter_map(|(language, text)| text.map(|text| (language, text)))
                .collect(),
        )
    }
}

impl From<CaptionText> for BTreeMap<CaptionLanguage, Option<String>> {
    fn from(text: CaptionText) -> Self {
        CaptionLanguage::ALL
            .into_iter()
            .map(|language| (language, text.0.get(&language).cloned()))
            .collect()
    }
}

/// Editable caption entry. Times stay in their `HH:MM:SS,mmm` string form so
/// they survive an edit/save cycle byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionSegment {
    pub start_time: String,
    pub end_time: String,
    pub text: CaptionText,
}

impl CaptionSegment {
    pub fn start_seconds(&self) -> f64 {
        parse_timecode(&self.start_time)
    }

    pub fn end_seconds(&self) -> f64 {
        parse_timecode(&self.end_time)
    }

    /// Raw inline-tagged text as the renderer expects it, e.g. `(yue)你好(en)Hello`.
    pub fn tagged_text(&self) -> String {
        self.text
            .iter()
            .map(|(language, text)| format!("{}{}", language.tag(), text))
            .collect()
    }
}

/// Scans every supported language out of inline-tagged text. A language's span
/// runs from its `(code)` tag to the next tag of any other language, or to the
/// end of the text, and is trimmed. Languages without a tag come back as `None`.
pub fn parse_multilingual_text(full_text: &str) -> BTreeMap<CaptionLanguage, Option<String>> {
    CaptionLanguage::ALL
        .into_iter()
        .map(|language| (language, extract_track(full_text, language)))
        .collect()
}

fn extract_track(full_text: &str, language: CaptionLanguage) -> Option<String> {
    let tag = language.tag();
    let start = full_text.find(&tag)? + tag.len();
    let rest = &full_text[start..];
    let end = CaptionLanguage::ALL
        .into_iter()
        .filter(|other| *other != language)
        .filter_map(|other| rest.find(&other.tag()))
        .min()
        .unwrap_or(rest.len());
    Some(rest[..end].trim().to_owned())
}

/// Parses SRT text into editable captions.
pub fn convert_srt_to_captions(content: &str) -> Vec<CaptionSegment> {
    let lines = content.split('\n').collect::<Vec<_>>();
    let mut captions = Vec::new();
    let mut current: Option<CaptionSegment> = None;
    let mut text_lines: Vec<&str> = Vec::new();

    for (index, raw_line) in lines.iter().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if is_sequence_index(&lines, index) {
            close_caption(&mut captions, current.take(), &mut text_lines);
            current = Some(new_caption());
        } else if line.contains("-->") {
            let caption = current.get_or_insert_with(new_caption);
            let (start, end) = line.split_once("-->").unwrap_or((line, ""));
            caption.start_time = start.trim().to_owned();
            caption.end_time = end.trim().to_owned();
        } else {
            current.get_or_insert_with(new_caption);
            text_lines.push(line);
        }
    }

    close_caption(&mut captions, current, &mut text_lines);
    captions
}

fn new_caption() -> CaptionSegment {
    CaptionSegment {
        start_time: String::new(),
        end_time: String::new(),
        text: CaptionText::default(),
    }
}

fn close_caption(
    captions: &mut Vec<CaptionSegment>,
    caption: Option<CaptionSegment>,
    text_lines: &mut Vec<&str>,
) {
    if let Some(mut caption) = caption {
        if !text_lines.is_empty() {
            caption.text = CaptionText::from(parse_multilingual_text(&text_lines.join("\n")));
            captions.push(caption);
        }
    }
    text_lines.clear();
}

/// Serialises captions back to SRT, one `(code) text` line per present track.
pub fn convert_captions_to_srt(captions: &[CaptionSegment]) -> String {
    let mut out = String::new();
    for (index, caption) in captions.iter().enumerate() {
        out.push_str(&format!("{}\n", index + 1));
        out.push_str(&format!("{} --> {}\n", caption.start_time, caption.end_time));
        for (language, text) in caption.text.iter() {
            out.push_str(&format!("({}) {}\n", language.code(), text));
        }
        out.push('\n');
    }
    out
}

/// Moves every caption by `offset_seconds`, clamping both ends at zero.
pub fn shift_captions(captions: &[CaptionSegment], offset_seconds: f64) -> Vec<CaptionSegment> {
    if !offset_seconds.is_finite() {
        return captions.to_vec();
    }
    captions
        .iter()
        .map(|caption| CaptionSegment {
            start_time: format_timecode((caption.start_seconds() + offset_seconds).max(0.0)),
            end_time: format_timecode((caption.end_seconds() + offset_seconds).max(0.0)),
            text: caption.text.clone(),
        })
        .collect()
}

/// Inserts a zero-length caption at `index` (clamped to the list length) that
/// carries `language` as an empty track and nothing else.
pub fn insert_caption(
    captions: &mut Vec<CaptionSegment>,
    index: usize,
    end_time: &str,
    language: CaptionLanguage,
) {
    let mut text = CaptionText::default();
    text.set(language, Some(String::new()));
    let caption = CaptionSegment {
        start_time: end_time.to_owned(),
        end_time: end_time.to_owned(),
        text,
    };
    captions.insert(index.min(captions.len()), caption);
}

/// Marks `language` absent. The caption's last present track is never
/// removed, because a caption without tracks is dropped from SRT output.
/// Returns whether a track was removed.
pub fn remove_language(caption: &mut CaptionSegment, language: CaptionLanguage) -> bool {
    if caption.text.get(language).is_none() || caption.text.iter().count() == 1 {
        return false;
    }
    caption.text.set(language, None);
    true
}

/// Editable captions to render segments, in list order.
pub fn captions_to_segments(captions: &[CaptionSegment]) -> Vec<SubtitleSegment> {
    captions
        .iter()
        .map(|caption| SubtitleSegment {
            start_time: Some(caption.start_seconds()),
            end_time: Some(caption.end_seconds()),
            raw_text: caption.tagged_text(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caption(start: &str, end: &str, tracks: &[(CaptionLanguage, &str)]) -> CaptionSegment {
        let mut text = CaptionText::default();
        for (language, value) in tracks {
            text.set(*language, Some((*value).to_owned()));
        }
        CaptionSegment {
            start_time: start.to_owned(),
            end_time: end.to_owned(),
            text,
        }
    }

    #[test]
    fn end_to_end_single_caption() {
        let captions =
            convert_srt_to_captions("1\n00:00:00,000 --> 00:00:02,500\n(yue)你好(en)Hello\n\n");
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].start_time, "00:00:00,000");
        assert_eq!(captions[0].end_time, "00:00:02,500");
        assert_eq!(captions[0].text.get(CaptionLanguage::Cantonese), Some("你好"));
        assert_eq!(captions[0].text.get(CaptionLanguage::English), Some("Hello"));
        assert_eq!(captions[0].text.get(CaptionLanguage::Mandarin), None);
    }

    #[test]
    fn tags_sharing_a_prefix_do_not_collide() {
        let parsed = parse_multilingual_text("(yue_TISA)台山(yue)廣東");
        assert_eq!(parsed[&CaptionLanguage::Taishanese].as_deref(), Some("台山"));
        assert_eq!(parsed[&CaptionLanguage::Cantonese].as_deref(), Some("廣東"));
    }

    #[test]
    fn multiline_tracks_are_joined() {
        let captions =
            convert_srt_to_captions("1\n00:00:01,000 --> 00:00:02,000\n(yue) 第一\n(en) first\nline\n");
        assert_eq!(captions[0].text.get(CaptionLanguage::English), Some("first\nline"));
    }

    #[test]
    fn srt_round_trip_is_idempotent() {
        let captions = vec![
            caption(
                "00:00:00,000",
                "00:00:02,500",
                &[(CaptionLanguage::Cantonese, "你好"), (CaptionLanguage::English, "Hello")],
            ),
            caption("00:00:03,000", "00:00:04,000", &[(CaptionLanguage::Mandarin, "")]),
        ];
        let srt = convert_captions_to_srt(&captions);
        assert_eq!(convert_srt_to_captions(&srt), captions);
    }

    #[test]
    fn serialises_absent_tracks_as_null() {
        let captions = vec![caption("00:00:00,000", "00:00:01,000", &[(CaptionLanguage::English, "hi")])];
        let value = serde_json::to_value(&captions).expect("captions serialise");
        assert_eq!(value[0]["startTime"], "00:00:00,000");
        assert_eq!(value[0]["text"]["en"], "hi");
        assert!(value[0]["text"]["yue"].is_null());
        let back: Vec<CaptionSegment> = serde_json::from_value(value).expect("captions deserialise");
        assert_eq!(back, captions);
    }

    #[test]
    fn shift_clamps_at_zero() {
        let captions = vec![caption("00:00:01,000", "00:00:03,000", &[(CaptionLanguage::English, "x")])];
        let shifted = shift_captions(&captions, -2.0);
        assert_eq!(shifted[0].start_time, "00:00:00,000");
        assert_eq!(shifted[0].end_time, "00:00:01,000");
    }

    #[test]
    fn insert_caption_adds_single_empty_track() {
        let mut captions = vec![caption("00:00:00,000", "00:00:01,000", &[(CaptionLanguage::English, "x")])];
        insert_caption(&mut captions, 1, "00:00:01,000", CaptionLanguage::Cantonese);
        assert_eq!(captions.len(), 2);
        assert_eq!(captions[1].start_time, "00:00:01,000");
        assert_eq!(captions[1].text.get(CaptionLanguage::Cantonese), Some(""));
        assert_eq!(captions[1].text.iter().count(), 1);

        assert!(!remove_language(&mut captions[0], CaptionLanguage::English));
        assert!(!remove_language(&mut captions[1], CaptionLanguage::Cantonese));
        assert_eq!(captions[1].text.get(CaptionLanguage::Cantonese), Some(""));
        assert_eq!(convert_srt_to_captions(&convert_captions_to_srt(&captions)), captions);
    }

    #[test]
    fn remove_language_drops_one_of_several_tracks() {
        let mut bilingual = caption(
            "00:00:00,000",
            "00:00:01,000",
            &[(CaptionLanguage::Cantonese, "你好"), (CaptionLanguage::English, "Hello")],
        );
        assert!(!remove_language(&mut bilingual, CaptionLanguage::Mandarin));
        assert!(remove_language(&mut bilingual, CaptionLanguage::English));
        assert_eq!(bilingual.text.get(CaptionLanguage::English), None);
        assert!(!remove_language(&mut bilingual, CaptionLanguage::Cantonese));
        assert_eq!(bilingual.text.get(CaptionLanguage::Cantonese), Some("你好"));
    }

    #[test]
    fn captions_become_tagged_segments() {
        let captions = vec![caption(
            "00:00:01,000",
            "00:00:02,000",
            &[(CaptionLanguage::English, "Hello"), (CaptionLanguage::Cantonese, "你好")],
        )];
        let segments = captions_to_segments(&captions);
        assert_eq!(segments[0].raw_text, "(yue)你好(en)Hello");
        assert_eq!(segments[0].start_time, Some(1.0));
    }

    #[test]
    fn unknown_language_code_is_a_usage_error() {
        let error = CaptionLanguage::from_code("fr").expect_err("fr is not supported");
        let coded = crate::error_codes::find_coded_error(&error).expect("coded error");
        assert_eq!(coded.code, "UNKNOWN_LANGUAGE_CODE");
    }
}
