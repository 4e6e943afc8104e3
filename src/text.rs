use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use fontdue::layout::{
    CoordinateSystem, GlyphRasterConfig, HorizontalAlign, Layout, LayoutSettings, TextStyle,
    VerticalAlign, WrapStyle,
};
use fontdue::{Font, FontSettings};
use tiny_skia::Pixmap;
use tracing::debug;

/// CJK-capable system fonts, tried in order when no font is configured.
pub const CJK_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/opentype/noto/NotoSerifCJK-Regular.ttc",
    "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
    "/usr/share/fonts/truetype/wqy/wqy-zenhei.ttc",
    "/usr/share/fonts/truetype/arphic/uming.ttc",
    "/System/Library/Fonts/PingFang.ttc",
    "/System/Library/Fonts/STHeiti Medium.ttc",
    "/Library/Fonts/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\msyh.ttc",
];

/// Fallback for tone contour marks and sub/superscript digits, which many
/// CJK fonts lack.
pub const SYMBOL_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\seguisym.ttf",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAnchor {
    /// `y` is the top of the line box.
    Top,
    /// `y` is the middle of the em box.
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextLook {
    pub font_size: f32,
    pub anchor: VerticalAnchor,
    pub color: [u8; 4],
}

impl TextLook {
    pub fn new(font_size: f32, anchor: VerticalAnchor, color: [u8; 4]) -> Self {
        Self {
            font_size,
            anchor,
            color,
        }
    }
}

/// Text measuring and drawing as the compositor needs it: single lines,
/// horizontally centered.
pub trait TextPainter {
    fn measure(&mut self, text: &str, font_size: f32) -> f32;

    fn draw_centered(
        &mut self,
        pixmap: &mut Pixmap,
        text: &str,
        center_x: f32,
        y: f32,
        look: TextLook,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct GlyphBitmap {
    pub width: usize,
    pub height: usize,
    pub bitmap: Vec<u8>,
}

/// fontdue-backed painter over a primary font plus fallbacks. Each character
/// is set in the first font that has a glyph for it.
pub struct FontPainter {
    fonts: Vec<Font>,
    glyph_cache: HashMap<GlyphRasterConfig, GlyphBitmap>,
}

impl FontPainter {
    pub fn from_fonts(fonts: Vec<Font>) -> Result<Self> {
        if fonts.is_empty() {
            bail!("font painter needs at least one font");
        }
        Ok(Self {
            fonts,
            glyph_cache: HashMap::new(),
        })
    }

    pub fn from_path(font_path: &Path) -> Result<Self> {
        Self::from_fonts(vec![load_font(font_path)?])
    }

    /// Configured font when given, otherwise the first CJK system font found.
    /// A symbol font is appended as fallback whenever one is installed.
    pub fn discover(font_path: Option<&Path>) -> Result<Self> {
        let primary = match font_path {
            Some(path) => path.to_path_buf(),
            None => first_existing(CJK_FONT_CANDIDATES).ok_or_else(|| {
                anyhow!(
                    "no CJK font found; pass --font or set font_path (tried {})",
                    CJK_FONT_CANDIDATES.join(", ")
                )
            })?,
        };
        let mut fonts = vec![load_font(&primary)?];
        debug!(font = %primary.display(), "loaded primary font");

        if let Some(symbol_path) = first_existing(SYMBOL_FONT_CANDIDATES) {
            match load_font(&symbol_path) {
                Ok(font) => {
                    debug!(font = %symbol_path.display(), "loaded fallback font");
                    fonts.push(font);
                }
                Err(error) => debug!(error = %error, "skipping fallback font"),
            }
        }
        Self::from_fonts(fonts)
    }

    fn font_index_for(&self, character: char) -> usize {
        self.fonts
            .iter()
            .position(|font| font.lookup_glyph_index(character) != 0)
            .unwrap_or(0)
    }

    /// Splits `text` into runs that share a font.
    fn font_runs<'t>(&self, text: &'t str) -> Vec<(usize, &'t str)> {
        let mut runs = Vec::new();
        let mut run_start = 0;
        let mut run_font = None;
        for (offset, character) in text.char_indices() {
            let font_index = self.font_index_for(character);
            match run_font {
                Some(current) if current != font_index => {
                    runs.push((current, &text[run_start..offset]));
                    run_start = offset;
                    run_font = Some(font_index);
                }
                None => run_font = Some(font_index),
                _ => {}
            }
        }
        if let Some(current) = run_font {
            runs.push((current, &text[run_start..]));
        }
        runs
    }

    fn line_box_height(&self, font_size: f32) -> f32 {
        self.fonts[0]
            .horizontal_line_metrics(font_size)
            .map(|metrics| metrics.ascent - metrics.descent)
            .unwrap_or(font_size)
    }
}

impl TextPainter for FontPainter {
    fn measure(&mut self, text: &str, font_size: f32) -> f32 {
        text.chars()
            .map(|character| {
                self.fonts[self.font_index_for(character)]
                    .metrics(character, font_size)
                    .advance_width
            })
            .sum()
    }

    fn draw_centered(
        &mut self,
        pixmap: &mut Pixmap,
        text: &str,
        center_x: f32,
        y: f32,
        look: TextLook,
    ) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        let left = center_x - self.measure(text, look.font_size) / 2.0;
        let top = match look.anchor {
            VerticalAnchor::Top => y,
            VerticalAnchor::Middle => y - self.line_box_height(look.font_size) / 2.0,
        };

        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x: left,
            y: top,
            max_width: None,
            max_height: None,
            horizontal_align: HorizontalAlign::Left,
            vertical_align: VerticalAlign::Top,
            line_height: 1.0,
            wrap_style: WrapStyle::Letter,
            wrap_hard_breaks: false,
        });
        for (font_index, run) in self.font_runs(text) {
            layout.append(self.fonts.as_slice(), &TextStyle::new(run, look.font_size, font_index));
        }

        let (width, height) = (pixmap.width(), pixmap.height());
        let frame = pixmap.data_mut();
        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let font = &self.fonts[glyph.font_index];
            let glyph_bitmap = self.glyph_cache.entry(glyph.key).or_insert_with(|| {
                let (_, bitmap) = font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    bitmap,
                }
            });

            blend_glyph(
                frame,
                width,
                height,
                glyph.x.round() as i32,
                glyph.y.round() as i32,
                glyph_bitmap,
                look.color,
            );
        }
        Ok(())
    }
}

/// Deterministic painter without font files. Every character advances
/// `advance_ratio * font_size`; non-space characters are drawn as solid
/// blocks one em tall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedAdvancePainter {
    pub advance_ratio: f32,
}

impl Default for FixedAdvancePainter {
    fn default() -> Self {
        Self { advance_ratio: 0.5 }
    }
}

impl TextPainter for FixedAdvancePainter {
    fn measure(&mut self, text: &str, font_size: f32) -> f32 {
        text.chars().count() as f32 * font_size * self.advance_ratio
    }

    fn draw_centered(
        &mut self,
        pixmap: &mut Pixmap,
        text: &str,
        center_x: f32,
        y: f32,
        look: TextLook,
    ) -> Result<()> {
        let advance = look.font_size * self.advance_ratio;
        let mut x = center_x - self.measure(text, look.font_size) / 2.0;
        let top = match look.anchor {
            VerticalAnchor::Top => y,
            VerticalAnchor::Middle => y - look.font_size / 2.0,
        };
        let (width, height) = (pixmap.width(), pixmap.height());
        let block_width = advance.round().max(1.0) as usize;
        let block_height = look.font_size.round().max(1.0) as usize;
        let block = GlyphBitmap {
            width: block_width,
            height: block_height,
            bitmap: vec![255; block_width * block_height],
        };
        for character in text.chars() {
            if !character.is_whitespace() {
                blend_glyph(
                    pixmap.data_mut(),
                    width,
                    height,
                    x.round() as i32,
                    top.round() as i32,
                    &block,
                    look.color,
                );
            }
            x += advance;
        }
        Ok(())
    }
}

pub fn load_font(font_path: &Path) -> Result<Font> {
    let font_bytes = std::fs::read(font_path)
        .with_context(|| format!("failed to read font file {}", font_path.display()))?;
    Font::from_bytes(font_bytes, FontSettings::default())
        .map_err(|error| anyhow!("failed to parse font {}: {error}", font_path.display()))
}

fn first_existing(candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.is_file())
}

/// Blends an 8-bit coverage mask into a premultiplied RGBA buffer.
pub fn blend_glyph(
    frame: &mut [u8],
    frame_width: u32,
    frame_height: u32,
    x: i32,
    y: i32,
    glyph: &GlyphBitmap,
    color: [u8; 4],
) {
    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= frame_height as i32 {
            continue;
        }

        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= frame_width as i32 {
                continue;
            }

            let mask = glyph.bitmap[row * glyph.width + col];
            if mask == 0 {
                continue;
            }

            let alpha = ((u16::from(mask) * u16::from(color[3])) / 255) as u8;
            let idx = ((py as u32 * frame_width + px as u32) * 4) as usize;
            blend_pixel(frame, idx, [color[0], color[1], color[2], alpha]);
        }
    }
}

/// Source-over of a straight-alpha colour onto a premultiplied pixel.
pub fn blend_pixel(frame: &mut [u8], idx: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    if alpha == 0 {
        return;
    }

    let inv_alpha = 255_u16.saturating_sub(alpha);

    for channel in 0..3 {
        let dst = u16::from(frame[idx + channel]);
        let src_c = u16::from(src[channel]);
        frame[idx + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    let dst_alpha = u16::from(frame[idx + 3]);
    frame[idx + 3] = (alpha + (dst_alpha * inv_alpha + 127) / 255).min(255) as u8;
}
