use std::fmt;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use pinyin::ToPinyin;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::dictionary::{CustomTransliterations, JyutpingDictionary};
use crate::error_codes::CodedError;
use crate::radicals::radical_ideograph;

/// Label for characters outside the romanized language; they are shown verbatim.
pub const FOREIGN_LABEL: &str = "EN";
/// Label for Chinese characters no table could resolve.
pub const UNKNOWN_LABEL: &str = "?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RomanizationMode {
    #[default]
    Jyutping,
    Pinyin,
}

impl RomanizationMode {
    pub fn from_keyword(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jyutping" | "yue" | "cantonese" => Ok(Self::Jyutping),
            "pinyin" | "zh" | "mandarin" => Ok(Self::Pinyin),
            _ => Err(anyhow!(CodedError::usage(
                "INVALID_ROMANIZATION_MODE",
                format!("invalid romanization mode '{value}'"),
            )
            .with_details(json!({
                "provided": value,
                "allowed": ["jyutping", "pinyin"]
            })))),
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Jyutping => "jyutping",
            Self::Pinyin => "pinyin",
        }
    }
}

/// One label per input character, in input order. Serialises to the
/// comma-joined form the alignment mapper consumes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RomanizedText {
    labels: Vec<String>,
}

impl RomanizedText {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn to_label_string(&self) -> String {
        self.labels.join(",")
    }
}

impl fmt::Display for RomanizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_label_string())
    }
}

impl FromIterator<String> for RomanizedText {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().collect(),
        }
    }
}

/// Han-script test used to tell Chinese characters from everything else.
pub fn is_chinese_char(character: char) -> bool {
    static HAN_RE: OnceLock<Regex> = OnceLock::new();
    let re = HAN_RE.get_or_init(|| Regex::new(r"\p{Han}").expect("han regex should compile"));
    let mut buf = [0_u8; 4];
    re.is_match(character.encode_utf8(&mut buf))
}

/// Per-character romanization over a jyutping dictionary plus the pinyin
/// tables. Owns no per-call state, so one engine serves every frame.
#[derive(Debug, Clone)]
pub struct RomanizationEngine {
    jyutping: JyutpingDictionary,
}

impl Default for RomanizationEngine {
    fn default() -> Self {
        Self::new(JyutpingDictionary::bundled())
    }
}

impl RomanizationEngine {
    pub fn new(jyutping: JyutpingDictionary) -> Self {
        Self { jyutping }
    }

    pub fn jyutping_dictionary(&self) -> &JyutpingDictionary {
        &self.jyutping
    }

    /// Custom map when it has entries, otherwise the dictionary for `mode`.
    pub fn transliterate(
        &self,
        text: &str,
        mode: RomanizationMode,
        custom: &CustomTransliterations,
    ) -> RomanizedText {
        if !custom.is_empty() {
            return to_custom(text, custom);
        }
        match mode {
            RomanizationMode::Jyutping => self.to_jyutping(text),
            RomanizationMode::Pinyin => to_pinyin(text),
        }
    }

    pub fn to_jyutping(&self, text: &str) -> RomanizedText {
        text.chars()
            .map(|character| {
                let resolved = self.jyutping.lookup(character).or_else(|| {
                    radical_ideograph(character).and_then(|ideograph| self.jyutping.lookup(ideograph))
                });
                match resolved {
                    Some(label) => label.to_owned(),
                    None if is_chinese_char(character) => {
                        debug!(character = %character, "no jyutping reading");
                        UNKNOWN_LABEL.to_owned()
                    }
                    None => FOREIGN_LABEL.to_owned(),
                }
            })
            .collect()
    }
}

/// Pinyin with trailing tone numbers. Non-Chinese characters are labelled
/// foreign without a lookup.
pub fn to_pinyin(text: &str) -> RomanizedText {
    text.chars()
        .map(|character| {
            if !is_chinese_char(character) {
                return FOREIGN_LABEL.to_owned();
            }
            let ideograph = radical_ideograph(character).unwrap_or(character);
            match ideograph.to_pinyin() {
                Some(pinyin) => pinyin.with_tone_num_end().to_owned(),
                None => {
                    debug!(character = %character, "no pinyin reading");
                    UNKNOWN_LABEL.to_owned()
                }
            }
        })
        .collect()
}

/// Custom map lookup, bypassing the dictionaries. Unmapped characters get `?`.
pub fn to_custom(text: &str, custom: &CustomTransliterations) -> RomanizedText {
    text.chars()
        .map(|character| match custom.lookup(character) {
            Some(label) => label.to_owned(),
            None => {
                debug!(character = %character, "no custom transliteration");
                UNKNOWN_LABEL.to_owned()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RomanizationEngine {
        RomanizationEngine::default()
    }

    #[test]
    fn jyutping_keeps_one_label_per_character() {
        let text = "你好 world!";
        let romanized = engine().to_jyutping(text);
        assert_eq!(romanized.len(), text.chars().count());
        assert_eq!(
            romanized.to_label_string(),
            "nei5,hou2,EN,EN,EN,EN,EN,EN,EN"
        );
    }

    #[test]
    fn jyutping_marks_unresolved_chinese_as_unknown() {
        // U+9F98 is a rare ideograph missing from the bundled table.
        let romanized = engine().to_jyutping("\u{9F98}");
        assert_eq!(romanized.labels(), &["?".to_owned()]);
    }

    #[test]
    fn pinyin_marks_unreadable_chinese_as_unknown() {
        // Both are Han ideographs the pinyin tables carry no reading for.
        let romanized = to_pinyin("\u{9FEF}\u{2A6D6}");
        assert_eq!(romanized.labels(), &["?".to_owned(), "?".to_owned()]);
    }

    #[test]
    fn jyutping_falls_back_through_radical_table() {
        // KANGXI RADICAL MAN looks like 人 but is a separate code point.
        let romanized = engine().to_jyutping("\u{2F08}");
        assert_eq!(romanized.labels(), &["jan4".to_owned()]);
    }

    #[test]
    fn pinyin_labels_non_chinese_as_foreign() {
        let romanized = to_pinyin("a 1,");
        assert!(romanized.labels().iter().all(|label| label == FOREIGN_LABEL));
    }

    #[test]
    fn pinyin_never_labels_chinese_as_foreign() {
        let romanized = to_pinyin("中文\u{2F08}");
        assert_eq!(romanized.labels()[0], "zhong1");
        assert_eq!(romanized.labels()[1], "wen2");
        assert_eq!(romanized.labels()[2], "ren2");
        for label in romanized.labels() {
            assert_ne!(label, FOREIGN_LABEL);
        }
    }

    #[test]
    fn custom_mode_bypasses_dictionary() {
        let custom =
            CustomTransliterations::from_json_str(r#"{"你": ["lei5", "nei5"]}"#, "custom").unwrap();
        let romanized = engine().transliterate("你好", RomanizationMode::Jyutping, &custom);
        assert_eq!(romanized.to_label_string(), "lei5,?");
    }

    #[test]
    fn empty_custom_map_uses_selected_mode() {
        let custom = CustomTransliterations::default();
        let romanized = engine().transliterate("好", RomanizationMode::Pinyin, &custom);
        assert_eq!(romanized.to_label_string(), "hao3");
    }

    #[test]
    fn han_class_covers_radicals_and_excludes_kana() {
        assert!(is_chinese_char('好'));
        assert!(is_chinese_char('\u{2F08}'));
        assert!(!is_chinese_char('あ'));
        assert!(!is_chinese_char('A'));
    }

    #[test]
    fn mode_keywords_parse() {
        assert_eq!(RomanizationMode::from_keyword("Pinyin").unwrap(), RomanizationMode::Pinyin);
        assert!(RomanizationMode::from_keyword("wade-giles").is_err());
    }
}
