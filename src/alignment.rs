use serde::Serialize;

use crate::romanization::{RomanizedText, FOREIGN_LABEL};

/// One renderable cell: a romanization label over its display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RomanizationUnit {
    pub label: String,
    pub display_text: String,
}

impl RomanizationUnit {
    pub fn new(label: impl Into<String>, display_text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            display_text: display_text.into(),
        }
    }

    fn foreign(display_text: impl Into<String>) -> Self {
        Self::new(FOREIGN_LABEL, display_text)
    }

    pub fn is_foreign(&self) -> bool {
        self.label == FOREIGN_LABEL
    }

    /// Spaces and empty units take a thin gap instead of a drawn cell.
    pub fn is_gap(&self) -> bool {
        self.display_text.chars().all(char::is_whitespace)
    }
}

/// Aligns a comma-joined label string against the text it was produced from.
pub fn retrieve_romanization_map(label_string: &str, text: &str) -> Vec<RomanizationUnit> {
    let labels = label_string
        .split(',')
        .filter(|label| !label.is_empty())
        .collect::<Vec<_>>();
    align_labels(&labels, text)
}

pub fn align(romanized: &RomanizedText, text: &str) -> Vec<RomanizationUnit> {
    let labels = romanized
        .labels()
        .iter()
        .map(String::as_str)
        .filter(|label| !label.is_empty())
        .collect::<Vec<_>>();
    align_labels(&labels, text)
}

/// Walks labels and characters in lockstep. Runs of foreign-labelled
/// characters collapse into one unit, spaces become their own gap unit, and
/// text left over after the labels run out becomes one trailing foreign unit.
/// Labels beyond the end of the text are ignored.
fn align_labels(labels: &[&str], text: &str) -> Vec<RomanizationUnit> {
    let characters = text.chars().collect::<Vec<_>>();
    let mut units = Vec::with_capacity(labels.len());
    let mut foreign_run = String::new();
    let mut consumed = 0;

    for (label, character) in labels.iter().zip(characters.iter()) {
        if character.is_whitespace() {
            flush_foreign_run(&mut units, &mut foreign_run);
            units.push(RomanizationUnit::foreign(character.to_string()));
        } else if *label == FOREIGN_LABEL {
            foreign_run.push(*character);
        } else {
            flush_foreign_run(&mut units, &mut foreign_run);
            units.push(RomanizationUnit::new(*label, character.to_string()));
        }
        consumed += 1;
    }
    flush_foreign_run(&mut units, &mut foreign_run);

    if consumed < characters.len() {
        let leftover = characters[consumed..].iter().collect::<String>();
        units.push(RomanizationUnit::foreign(leftover));
    }

    units
}

fn flush_foreign_run(units: &mut Vec<RomanizationUnit>, foreign_run: &mut String) {
    if foreign_run.is_empty() {
        return;
    }
    units.push(RomanizationUnit::foreign(std::mem::take(foreign_run)));
}
