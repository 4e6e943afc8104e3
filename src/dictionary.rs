use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;

use crate::error_codes::CodedError;

const BUNDLED_JYUTPING: &str = include_str!("../assets/dictionaries/jyutping.tsv");

/// Character to jyutping readings, most common reading first.
#[derive(Debug, Clone, Default)]
pub struct JyutpingDictionary {
    entries: HashMap<char, Vec<String>>,
}

impl JyutpingDictionary {
    /// The table compiled into the binary.
    pub fn bundled() -> Self {
        // The bundled table is checked by the unit tests below.
        Self::from_tsv_str(BUNDLED_JYUTPING, "bundled jyutping table").unwrap_or_default()
    }

    /// Loads a `.tsv` (`char<TAB>reading [reading...]`) or `.json`
    /// (`{"字": "zi6"}` or `{"字": ["zi6"]}`) dictionary file. TSV files may
    /// also be Unihan readings data (`U+5B57<TAB>kCantonese<TAB>zi6`).
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read dictionary {}", path.display()))?;
        let source = path.display().to_string();
        if is_json_path(path) {
            let entries = parse_candidate_json(&contents, &source)?;
            Ok(Self { entries })
        } else {
            Self::from_tsv_str(&contents, &source)
        }
    }

    pub fn from_tsv_str(contents: &str, source: &str) -> Result<Self> {
        let mut entries = HashMap::new();
        for (line_index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, readings) = line.split_once('\t').ok_or_else(|| {
                invalid_line(source, line_index + 1, line, "expected character<TAB>readings")
            })?;
            let key = key.trim();
            let (character, readings) = if let Some(hex) = key.strip_prefix("U+") {
                let character = u32::from_str_radix(hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| invalid_line(source, line_index + 1, line, "bad code point"))?;
                // Unihan files carry every reading field; only kCantonese is jyutping.
                match readings.split_once('\t') {
                    Some(("kCantonese", value)) => (character, value),
                    Some(_) => continue,
                    None => {
                        return Err(invalid_line(source, line_index + 1, line, "expected field<TAB>value"))
                    }
                }
            } else {
                let character = single_char(key)
                    .ok_or_else(|| invalid_line(source, line_index + 1, line, "key must be one character"))?;
                (character, readings)
            };
            let readings = readings
                .split(|c: char| c == ' ' || c == ',')
                .map(str::trim)
                .filter(|reading| !reading.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>();
            if readings.is_empty() {
                return Err(invalid_line(source, line_index + 1, line, "no readings"));
            }
            entries.entry(character).or_insert(readings);
        }
        Ok(Self { entries })
    }

    /// Entries from `other` win over entries already present.
    pub fn merge(&mut self, other: JyutpingDictionary) {
        self.entries.extend(other.entries);
    }

    pub fn lookup(&self, character: char) -> Option<&str> {
        self.entries
            .get(&character)
            .and_then(|readings| readings.first())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// User-supplied character to romanization mapping. Characters may carry
/// several candidates; the first one is used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomTransliterations {
    entries: HashMap<char, Vec<String>>,
}

impl CustomTransliterations {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read custom transliterations {}", path.display()))?;
        Self::from_json_str(&contents, &path.display().to_string())
    }

    pub fn from_json_str(contents: &str, source: &str) -> Result<Self> {
        Ok(Self {
            entries: parse_candidate_json(contents, source)?,
        })
    }

    pub fn insert(&mut self, character: char, candidates: Vec<String>) {
        self.entries.insert(character, candidates);
    }

    pub fn lookup(&self, character: char) -> Option<&str> {
        self.entries
            .get(&character)
            .and_then(|candidates| candidates.first())
            .map(String::as_str)
            .filter(|candidate| !candidate.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn parse_candidate_json(contents: &str, source: &str) -> Result<HashMap<char, Vec<String>>> {
    let raw: HashMap<String, OneOrMany> = serde_json::from_str(contents)
        .map_err(|error| anyhow!("failed to parse json in {source}: {error}"))?;

    let mut entries = HashMap::with_capacity(raw.len());
    for (key, value) in raw {
        let character = single_char(&key).ok_or_else(|| {
            anyhow!(CodedError::usage(
                "INVALID_DICTIONARY_KEY",
                format!("{source}: key '{key}' must be exactly one character"),
            )
            .with_details(json!({ "source": source, "key": key })))
        })?;
        let candidates = match value {
            OneOrMany::One(candidate) => vec![candidate],
            OneOrMany::Many(candidates) => candidates,
        };
        entries.insert(character, candidates);
    }
    Ok(entries)
}

fn single_char(raw: &str) -> Option<char> {
    let mut chars = raw.chars();
    let first = chars.next()?;
    chars.next().is_none().then_some(first)
}

fn is_json_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn invalid_line(source: &str, line_number: usize, line: &str, reason: &str) -> anyhow::Error {
    anyhow!(CodedError::usage(
        "INVALID_DICTIONARY_LINE",
        format!("{source}:{line_number}: {reason}"),
    )
    .with_details(json!({ "source": source, "line": line_number, "text": line })))
}

#[cfg(test)]
mod tests {
    use super::{CustomTransliterations, JyutpingDictionary, BUNDLED_JYUTPING};

    #[test]
    fn bundled_table_parses_cleanly() {
        let dictionary = JyutpingDictionary::from_tsv_str(BUNDLED_JYUTPING, "bundled")
            .expect("bundled table should parse");
        assert!(dictionary.len() > 500);
        assert_eq!(dictionary.lookup('你'), Some("nei5"));
        assert_eq!(dictionary.lookup('好'), Some("hou2"));
        assert_eq!(dictionary.lookup('識'), Some("sik1"));
    }

    #[test]
    fn bundled_table_covers_a_full_lyric_line() {
        let dictionary = JyutpingDictionary::bundled();
        let line = "海闊天空風雨裡追趕霧裡分不清影蹤";
        let missing: Vec<char> = line
            .chars()
            .filter(|c| dictionary.lookup(*c).is_none())
            .collect();
        assert!(missing.is_empty(), "no reading for {missing:?}");
        assert_eq!(dictionary.lookup('闊'), Some("fut3"));
        assert_eq!(dictionary.lookup('蹤'), Some("zung1"));
        assert!(dictionary.len() > 2500);
    }

    #[test]
    fn unihan_readings_keep_only_cantonese_fields() {
        let unihan = "# Unihan_Readings.txt\n\
U+6D77\tkCantonese\thoi2\n\
U+6D77\tkMandarin\thǎi\n\
U+884C\tkCantonese\thang4 haang4\n";
        let dictionary = JyutpingDictionary::from_tsv_str(unihan, "Unihan_Readings.txt").unwrap();
        assert_eq!(dictionary.len(), 2);
        assert_eq!(dictionary.lookup('海'), Some("hoi2"));
        assert_eq!(dictionary.lookup('行'), Some("hang4"));

        let error = JyutpingDictionary::from_tsv_str("U+ZZZZ\tkCantonese\tx\n", "u.txt")
            .expect_err("bad code point should fail");
        assert!(error.to_string().contains("u.txt:1"));
    }

    #[test]
    fn first_reading_wins() {
        let dictionary = JyutpingDictionary::from_tsv_str("行\thang4 haang4\n", "test").unwrap();
        assert_eq!(dictionary.lookup('行'), Some("hang4"));
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let error = JyutpingDictionary::from_tsv_str("# header\n好 hou2\n", "dict.tsv")
            .expect_err("space separated key should fail");
        assert!(error.to_string().contains("dict.tsv:2"));
    }

    #[test]
    fn merge_prefers_later_entries() {
        let mut base = JyutpingDictionary::from_tsv_str("行\thang4\n", "a").unwrap();
        base.merge(JyutpingDictionary::from_tsv_str("行\thaang4\n", "b").unwrap());
        assert_eq!(base.lookup('行'), Some("haang4"));
    }

    #[test]
    fn custom_map_accepts_string_or_candidate_list() {
        let custom = CustomTransliterations::from_json_str(
            r#"{"你": "lei5", "好": ["hou2", "hou3"], "空": ""}"#,
            "custom.json",
        )
        .unwrap();
        assert_eq!(custom.lookup('你'), Some("lei5"));
        assert_eq!(custom.lookup('好'), Some("hou2"));
        assert_eq!(custom.lookup('空'), None);
        assert_eq!(custom.lookup('我'), None);
    }

    #[test]
    fn custom_map_rejects_multi_char_keys() {
        assert!(CustomTransliterations::from_json_str(r#"{"你好": "x"}"#, "c.json").is_err());
    }
}
