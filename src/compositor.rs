use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use sha2::{Digest, Sha256};
use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

use crate::alignment::align;
use crate::background::{draw_scaled, paint_background, pixmap_from_rgba, BackgroundImages, Placement};
use crate::captions::CaptionLanguage;
use crate::dictionary::CustomTransliterations;
use crate::layout::{
    chunk_into_rows, display_label, wrap_words, GridGeometry, ENGLISH_MAX_WIDTH_RATIO,
    ENGLISH_PADDING_X, ENGLISH_PADDING_Y, SPACING_BETWEEN_TEXT_AND_CHARS,
};
use crate::overlay_config::{OverlayConfig, VideoPosition};
use crate::romanization::{RomanizationEngine, RomanizationMode};
use crate::subtitle::SubtitleSegment;
use crate::text::{TextLook, TextPainter, VerticalAnchor};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

/// One decoded video sample: straight RGBA plus its presentation time.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Seconds from the start of the decoded (trimmed) stream.
    pub timestamp: f64,
}

impl VideoFrame {
    pub fn to_pixmap(&self) -> Result<Pixmap> {
        pixmap_from_rgba(self.rgba.clone(), self.width, self.height)
    }
}

/// Everything a draw call reads besides the surface and the segment. All
/// borrowed: the compositor never mutates session state.
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    pub config: &'a OverlayConfig,
    pub engine: &'a RomanizationEngine,
    pub custom: &'a CustomTransliterations,
    pub images: &'a BackgroundImages,
}

/// Where the video sample lands on the output surface. Landscape keeps the
/// sample at native scale, centered. Portrait shrinks samples wider than the
/// surface to its width, then aligns vertically per `position`.
pub fn video_placement(
    sample_width: u32,
    sample_height: u32,
    surface_width: u32,
    surface_height: u32,
    landscape: bool,
    position: VideoPosition,
) -> Placement {
    let (sw, sh) = (sample_width as f32, sample_height as f32);
    let (w, h) = (surface_width as f32, surface_height as f32);
    let align_y = |drawn_height: f32| match position {
        VideoPosition::Top => 0.0,
        VideoPosition::Center => (h - drawn_height) / 2.0,
        VideoPosition::Bottom => h - drawn_height,
    };

    if !landscape && sw > w {
        let drawn_height = sh * (w / sw);
        return Placement {
            x: 0.0,
            y: align_y(drawn_height),
            width: w,
            height: drawn_height,
        };
    }

    Placement {
        x: -(sw - w) / 2.0,
        y: align_y(sh),
        width: sw,
        height: sh,
    }
}

/// Full draw for one instant: background, video sample, then the caption
/// overlay for `segment` when there is one.
pub fn compose_frame(
    pixmap: &mut Pixmap,
    sample: Option<&Pixmap>,
    segment: Option<&SubtitleSegment>,
    context: &FrameContext<'_>,
    painter: &mut dyn TextPainter,
) -> Result<()> {
    pixmap.fill(Color::TRANSPARENT);
    paint_background(pixmap, context.config, context.images);

    if let Some(sample) = sample {
        let placement = video_placement(
            sample.width(),
            sample.height(),
            pixmap.width(),
            pixmap.height(),
            context.config.landscape_mode,
            context.config.video_position,
        );
        draw_scaled(pixmap, sample, placement);
    }

    match segment {
        Some(segment) => draw_caption_overlay(pixmap, segment, context, painter),
        None => Ok(()),
    }
}

/// English block then the romanization grid, stacked from the configured
/// vertical position. Missing tracks skip their element.
pub fn draw_caption_overlay(
    pixmap: &mut Pixmap,
    segment: &SubtitleSegment,
    context: &FrameContext<'_>,
    painter: &mut dyn TextPainter,
) -> Result<()> {
    let config = context.config;
    let geometry = GridGeometry::new(config.size_multiplier);
    let chinese_track = match config.romanization {
        RomanizationMode::Jyutping => CaptionLanguage::Cantonese,
        RomanizationMode::Pinyin => CaptionLanguage::Mandarin,
    };
    let chinese = segment.track(chinese_track).unwrap_or_default();
    let english = segment.track(CaptionLanguage::English).unwrap_or_default();

    let mut top_y = config.vertical_position;
    if !english.is_empty() {
        top_y = draw_english_block(pixmap, &english, top_y, &geometry, painter)?;
    }
    if chinese.is_empty() {
        return Ok(());
    }

    let romanized = context
        .engine
        .transliterate(&chinese, config.romanization, context.custom);
    let units = align(&romanized, &chinese);
    let rows = chunk_into_rows(&units);
    let half_cell = geometry.cell_size / 2.0;
    let label_look = TextLook::new(geometry.label_font_size, VerticalAnchor::Middle, BLACK);
    let character_look = TextLook::new(geometry.character_font_size, VerticalAnchor::Middle, BLACK);

    for cell in geometry.place_rows(&rows, pixmap.width() as f32, top_y) {
        fill_rect(pixmap, cell.x, cell.y, geometry.cell_size, geometry.cell_size, WHITE);
        let center_x = cell.x + half_cell;
        let label = display_label(&cell.unit.label, config.use_tone_numbers);
        if !label.is_empty() {
            painter.draw_centered(
                pixmap,
                &label,
                center_x,
                cell.y + half_cell - geometry.label_offset,
                label_look,
            )?;
        }
        painter.draw_centered(
            pixmap,
            &cell.unit.display_text,
            center_x,
            cell.y + half_cell + geometry.label_offset,
            character_look,
        )?;
    }
    Ok(())
}

/// Wrapped English lines on a white panel. Returns the top of the grid.
fn draw_english_block(
    pixmap: &mut Pixmap,
    english: &str,
    top_y: f32,
    geometry: &GridGeometry,
    painter: &mut dyn TextPainter,
) -> Result<f32> {
    let font_size = geometry.english_font_size;
    let width = pixmap.width() as f32;
    let lines = wrap_words(english, width * ENGLISH_MAX_WIDTH_RATIO, |line| {
        painter.measure(line, font_size)
    });
    let longest = lines
        .iter()
        .map(|line| painter.measure(line, font_size))
        .fold(0.0_f32, f32::max);
    let text_height = lines.len() as f32 * geometry.english_line_height;

    let panel_width = longest + ENGLISH_PADDING_X * 2.0;
    fill_rect(
        pixmap,
        width / 2.0 - panel_width / 2.0,
        top_y,
        panel_width,
        text_height + ENGLISH_PADDING_Y * 2.0,
        WHITE,
    );

    let look = TextLook::new(font_size, VerticalAnchor::Top, BLACK);
    for (index, line) in lines.iter().enumerate() {
        let line_y = top_y + ENGLISH_PADDING_Y + index as f32 * geometry.english_line_height;
        painter.draw_centered(pixmap, line, width / 2.0, line_y, look)?;
    }

    Ok(top_y + text_height + ENGLISH_PADDING_Y * 2.0 + SPACING_BETWEEN_TEXT_AND_CHARS)
}

fn fill_rect(pixmap: &mut Pixmap, x: f32, y: f32, width: f32, height: f32, color: [u8; 4]) {
    let Some(rect) = Rect::from_xywh(x, y, width, height) else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = false;
    pixmap.fill_rect(rect, &paint, Transform::identity(), None);
}

pub fn new_surface(width: u32, height: u32) -> Result<Pixmap> {
    Pixmap::new(width, height).ok_or_else(|| anyhow!("failed to allocate {width}x{height} surface"))
}

/// sha256 of the premultiplied RGBA bytes, hex encoded.
pub fn frame_digest(pixmap: &Pixmap) -> String {
    let digest = Sha256::digest(pixmap.data());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Straight-alpha RGBA bytes for encoders and image writers.
pub fn demultiplied_rgba(pixmap: &Pixmap) -> Vec<u8> {
    pixmap
        .pixels()
        .iter()
        .flat_map(|pixel| {
            let color = pixel.demultiply();
            [color.red(), color.green(), color.blue(), color.alpha()]
        })
        .collect()
}

pub fn save_png(pixmap: &Pixmap, path: &Path) -> Result<()> {
    let image = RgbaImage::from_raw(pixmap.width(), pixmap.height(), demultiplied_rgba(pixmap))
        .ok_or_else(|| {
            anyhow!(
                "failed to construct image buffer for {}x{} RGBA frame",
                pixmap.width(),
                pixmap.height()
            )
        })?;
    image
        .save(path)
        .with_context(|| format!("failed to write png {}", path.display()))
}
