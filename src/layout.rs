use crate::alignment::RomanizationUnit;
use crate::romanization::FOREIGN_LABEL;

pub const UNITS_PER_ROW: usize = 5;
/// Cell edge at a size multiplier of 2, the unit scale all sizes derive from.
pub const BASE_CELL_SIZE: f32 = 70.0;
/// Cells advance slightly less than they draw, so neighbours overlap.
const CELL_ADVANCE_TRIM: f32 = 5.0;
pub const ROW_SPACING: f32 = 0.0;

const LABEL_FONT_SIZE: f32 = 16.0;
const CHARACTER_FONT_SIZE: f32 = 32.0;
const ENGLISH_FONT_SIZE: f32 = 24.0;
const ENGLISH_LINE_HEIGHT: f32 = 28.0;
const LABEL_OFFSET: f32 = 15.0;

pub const ENGLISH_PADDING_X: f32 = 0.0;
pub const ENGLISH_PADDING_Y: f32 = 8.0;
pub const ENGLISH_MAX_WIDTH_RATIO: f32 = 0.8;
/// Gap between the English block and the first grid row.
pub const SPACING_BETWEEN_TEXT_AND_CHARS: f32 = 20.0;

pub type GridRow = Vec<RomanizationUnit>;

/// Positional chunking, no width awareness: rows of five, last row shorter.
pub fn chunk_into_rows(units: &[RomanizationUnit]) -> Vec<GridRow> {
    units.chunks(UNITS_PER_ROW).map(<[_]>::to_vec).collect()
}

/// Every size the compositor needs, derived from one size multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub render_multiplier: f32,
    /// Horizontal and vertical advance between cells.
    pub cell_advance: f32,
    /// Edge of the white square drawn for each cell.
    pub cell_size: f32,
    pub label_font_size: f32,
    pub character_font_size: f32,
    pub label_offset: f32,
    pub english_font_size: f32,
    pub english_line_height: f32,
}

impl GridGeometry {
    pub fn new(size_multiplier: f32) -> Self {
        let render_multiplier = size_multiplier / 2.0;
        Self {
            render_multiplier,
            cell_advance: BASE_CELL_SIZE * size_multiplier / 2.0 - CELL_ADVANCE_TRIM,
            cell_size: BASE_CELL_SIZE * render_multiplier,
            label_font_size: LABEL_FONT_SIZE * render_multiplier,
            character_font_size: CHARACTER_FONT_SIZE * render_multiplier,
            label_offset: LABEL_OFFSET * render_multiplier,
            english_font_size: ENGLISH_FONT_SIZE * render_multiplier,
            english_line_height: ENGLISH_LINE_HEIGHT * render_multiplier,
        }
    }

    pub fn gap_width(&self) -> f32 {
        self.cell_advance / 3.0
    }

    pub fn unit_width(&self, unit: &RomanizationUnit) -> f32 {
        if unit.is_gap() {
            self.gap_width()
        } else {
            self.cell_advance
        }
    }

    pub fn row_width(&self, row: &[RomanizationUnit]) -> f32 {
        row.iter().map(|unit| self.unit_width(unit)).sum()
    }

    pub fn row_start_x(&self, row: &[RomanizationUnit], surface_width: f32) -> f32 {
        (surface_width - self.row_width(row)) / 2.0
    }

    pub fn row_y(&self, top_y: f32, row_index: usize) -> f32 {
        top_y + row_index as f32 * (self.cell_advance + ROW_SPACING)
    }

    /// Cells to draw for every row, gaps already skipped.
    pub fn place_rows<'a>(
        &self,
        rows: &'a [GridRow],
        surface_width: f32,
        top_y: f32,
    ) -> Vec<PlacedCell<'a>> {
        let mut cells = Vec::new();
        for (row_index, row) in rows.iter().enumerate() {
            let y = self.row_y(top_y, row_index);
            let mut x = self.row_start_x(row, surface_width);
            for unit in row {
                if !unit.is_gap() {
                    cells.push(PlacedCell { unit, x, y });
                }
                x += self.unit_width(unit);
            }
        }
        cells
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedCell<'a> {
    pub unit: &'a RomanizationUnit,
    pub x: f32,
    pub y: f32,
}

/// Greedy word wrap on single spaces. A word wider than `max_width` still
/// gets a line of its own.
pub fn wrap_words<F>(text: &str, max_width: f32, mut measure: F) -> Vec<String>
where
    F: FnMut(&str) -> f32,
{
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split(' ') {
        let candidate = if current.is_empty() {
            word.to_owned()
        } else {
            format!("{current} {word}")
        };
        if measure(&candidate) > max_width && !current.is_empty() {
            lines.push(std::mem::replace(&mut current, word.to_owned()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub fn tone_glyph(tone: u32) -> &'static str {
    match tone {
        1 => "ˉ¹",
        2 => "ˊ²",
        3 => "˗₃",
        4 => "ˎ₄",
        5 => "ˏ₅",
        6 => "ˍ₆",
        _ => "",
    }
}

/// Text drawn above a cell's character. Foreign units show nothing; otherwise
/// the first tone digit becomes its contour glyph unless raw numbers are kept.
pub fn display_label(label: &str, use_tone_numbers: bool) -> String {
    if label == FOREIGN_LABEL {
        return String::new();
    }
    if use_tone_numbers {
        return label.to_owned();
    }
    match label.char_indices().find(|(_, c)| matches!(c, '1'..='9')) {
        Some((index, digit)) => {
            let tone = digit.to_digit(10).unwrap_or_default();
            let mut drawn = String::with_capacity(label.len() + 4);
            drawn.push_str(&label[..index]);
            drawn.push_str(tone_glyph(tone));
            drawn.push_str(&label[index + digit.len_utf8()..]);
            drawn
        }
        None => label.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(label: &str, text: &str) -> RomanizationUnit {
        RomanizationUnit::new(label, text)
    }

    #[test]
    fn twelve_units_chunk_into_five_five_two() {
        let units = (0..12).map(|i| unit("si1", &i.to_string())).collect::<Vec<_>>();
        let rows = chunk_into_rows(&units);
        assert_eq!(rows.iter().map(Vec::len).collect::<Vec<_>>(), vec![5, 5, 2]);
        assert_eq!(rows[2][1].display_text, "11");
    }

    #[test]
    fn empty_sequence_has_no_rows() {
        assert!(chunk_into_rows(&[]).is_empty());
    }

    #[test]
    fn geometry_scales_with_multiplier() {
        let geometry = GridGeometry::new(2.0);
        assert_eq!(geometry.render_multiplier, 1.0);
        assert_eq!(geometry.cell_advance, 65.0);
        assert_eq!(geometry.cell_size, 70.0);
        assert_eq!(geometry.label_font_size, 16.0);
        assert_eq!(geometry.character_font_size, 32.0);
        assert_eq!(geometry.english_line_height, 28.0);

        let half = GridGeometry::new(1.0);
        assert_eq!(half.cell_advance, 30.0);
        assert_eq!(half.cell_size, 35.0);
    }

    #[test]
    fn gaps_take_a_third_and_rows_center() {
        let geometry = GridGeometry::new(2.0);
        let row = vec![unit("hou2", "好"), unit("EN", " "), unit("EN", "world")];
        let width = geometry.row_width(&row);
        assert!((width - (65.0 + 65.0 / 3.0 + 65.0)).abs() < 1e-4);
        assert!((geometry.row_start_x(&row, 1080.0) - (1080.0 - width) / 2.0).abs() < 1e-4);
    }

    #[test]
    fn placed_cells_skip_gaps_and_stack_rows() {
        let geometry = GridGeometry::new(2.0);
        let rows = vec![
            vec![unit("a1", "一"), unit("EN", " "), unit("b2", "二")],
            vec![unit("c3", "三")],
        ];
        let cells = geometry.place_rows(&rows, 1000.0, 100.0);
        assert_eq!(cells.len(), 3);
        let start = geometry.row_start_x(&rows[0], 1000.0);
        assert_eq!(cells[0].x, start);
        assert!((cells[1].x - (start + 65.0 + 65.0 / 3.0)).abs() < 1e-4);
        assert_eq!(cells[1].y, 100.0);
        assert_eq!(cells[2].y, 165.0);
    }

    #[test]
    fn wrap_is_greedy_against_measured_width() {
        let measure = |line: &str| line.chars().count() as f32 * 10.0;
        let lines = wrap_words("the quick brown fox jumps", 100.0, measure);
        assert_eq!(lines, vec!["the quick", "brown fox", "jumps"]);
    }

    #[test]
    fn overlong_word_keeps_its_own_line() {
        let measure = |line: &str| line.chars().count() as f32 * 10.0;
        let lines = wrap_words("a extraordinarily b", 50.0, measure);
        assert_eq!(lines, vec!["a", "extraordinarily", "b"]);
    }

    #[test]
    fn tone_digit_becomes_contour_glyph() {
        assert_eq!(display_label("sik1", false), "sikˉ¹");
        assert_eq!(display_label("hou2", false), "houˊ²");
        assert_eq!(display_label("ngo5", false), "ngoˏ₅");
        assert_eq!(display_label("zhong1", false), "zhongˉ¹");
    }

    #[test]
    fn labels_without_digit_or_foreign_are_untouched() {
        assert_eq!(display_label("m", false), "m");
        assert_eq!(display_label("?", false), "?");
        assert_eq!(display_label("EN", false), "");
        assert_eq!(display_label("EN", true), "");
    }

    #[test]
    fn tone_numbers_mode_keeps_raw_label() {
        assert_eq!(display_label("sik1", true), "sik1");
    }

    #[test]
    fn out_of_table_digit_is_dropped() {
        assert_eq!(display_label("ab9", false), "ab");
    }
}
