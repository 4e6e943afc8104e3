use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use anyhow::{anyhow, Context, Result};
use image::ImageReader;
use serde_json::json;
use tiny_skia::{Color, FilterQuality, IntSize, Pixmap, PixmapPaint, Transform};
use tracing::{debug, error, warn};

use crate::error_codes::CodedError;
use crate::overlay_config::{BackgroundMode, OverlayConfig};

/// Parses `#rrggbb` or `#rrggbbaa` (leading `#` optional) into straight RGBA.
pub fn parse_hex_colour(value: &str) -> Result<[u8; 4]> {
    let hex = value.trim().trim_start_matches('#');
    let invalid = || {
        anyhow!(CodedError::usage(
            "INVALID_COLOUR",
            format!("invalid colour '{value}', expected #rrggbb or #rrggbbaa"),
        )
        .with_details(json!({ "provided": value })))
    };
    if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |index: usize| u8::from_str_radix(&hex[index..index + 2], 16).map_err(|_| invalid());
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok([channel(0)?, channel(2)?, channel(4)?, alpha])
}

/// Destination rectangle for an image drawn into a target box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scales the image to cover the canvas while keeping its aspect ratio,
/// centering the overflow on the cropped axis.
pub fn cover_fit(image_width: u32, image_height: u32, canvas_width: u32, canvas_height: u32) -> Placement {
    let (width, height) = (canvas_width as f32, canvas_height as f32);
    let canvas_aspect = width / height;
    let image_aspect = image_width as f32 / image_height.max(1) as f32;

    if image_aspect > canvas_aspect {
        let draw_width = height * image_aspect;
        Placement {
            x: (width - draw_width) / 2.0,
            y: 0.0,
            width: draw_width,
            height,
        }
    } else {
        let draw_height = width / image_aspect;
        Placement {
            x: 0.0,
            y: (height - draw_height) / 2.0,
            width,
            height: draw_height,
        }
    }
}

pub fn draw_scaled(target: &mut Pixmap, source: &Pixmap, placement: Placement) {
    if source.width() == 0 || source.height() == 0 {
        return;
    }
    let scale_x = placement.width / source.width() as f32;
    let scale_y = placement.height / source.height() as f32;
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    target.draw_pixmap(
        0,
        0,
        source.as_ref(),
        &paint,
        Transform::from_row(scale_x, 0.0, 0.0, scale_y, placement.x, placement.y),
        None,
    );
}

/// Wraps straight-alpha RGBA bytes as a premultiplied pixmap.
pub fn pixmap_from_rgba(mut rgba: Vec<u8>, width: u32, height: u32) -> Result<Pixmap> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(anyhow!(
            "rgba buffer is {} bytes, expected {expected} for {width}x{height}",
            rgba.len()
        ));
    }
    for pixel in rgba.chunks_exact_mut(4) {
        let alpha = u16::from(pixel[3]);
        if alpha == 255 {
            continue;
        }
        for channel in &mut pixel[..3] {
            *channel = ((u16::from(*channel) * alpha + 127) / 255) as u8;
        }
    }
    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| anyhow!("invalid pixmap size {width}x{height}"))?;
    Pixmap::from_vec(rgba, size).ok_or_else(|| anyhow!("failed to wrap {width}x{height} pixmap"))
}

pub fn load_image_pixmap(path: &Path) -> Result<Pixmap> {
    let image = ImageReader::open(path)
        .with_context(|| format!("failed opening {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed sniffing {}", path.display()))?
        .decode()
        .with_context(|| format!("failed decoding {}", path.display()))?
        .into_rgba8();
    let (width, height) = image.dimensions();
    pixmap_from_rgba(image.into_raw(), width, height)
}

#[derive(Debug, Clone)]
enum ImageSlot {
    Loading,
    Ready(Arc<Pixmap>),
    Failed,
}

/// Background images shared between frames. Requests load on a worker
/// thread and the image shows up on the first frame drawn after it lands.
/// A failed load is logged once and never retried.
#[derive(Debug, Clone, Default)]
pub struct BackgroundImages {
    slots: Arc<Mutex<HashMap<PathBuf, ImageSlot>>>,
}

impl BackgroundImages {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<PathBuf, ImageSlot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The image if it has finished loading. The first call for a path
    /// starts the load and returns `None`.
    pub fn get_or_request(&self, path: &Path) -> Option<Arc<Pixmap>> {
        let mut slots = self.slots();
        match slots.get(path) {
            Some(ImageSlot::Ready(pixmap)) => return Some(Arc::clone(pixmap)),
            Some(ImageSlot::Loading | ImageSlot::Failed) => return None,
            None => {}
        }
        slots.insert(path.to_path_buf(), ImageSlot::Loading);
        drop(slots);

        let slots = Arc::clone(&self.slots);
        let path = path.to_path_buf();
        let spawned = thread::Builder::new()
            .name("subgloss-background".to_owned())
            .spawn(move || {
                let slot = load_slot(&path);
                let mut guard = match slots.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard.insert(path, slot);
            });
        if let Err(error) = spawned {
            warn!(error = %error, "failed to spawn background image loader");
        }
        None
    }

    /// Loads on the calling thread so export frames are deterministic.
    pub fn preload_blocking(&self, path: &Path) -> Option<Arc<Pixmap>> {
        match self.slots().get(path) {
            Some(ImageSlot::Ready(pixmap)) => return Some(Arc::clone(pixmap)),
            Some(ImageSlot::Failed) => return None,
            Some(ImageSlot::Loading) | None => {}
        }
        let slot = load_slot(path);
        let ready = match &slot {
            ImageSlot::Ready(pixmap) => Some(Arc::clone(pixmap)),
            _ => None,
        };
        self.slots().insert(path.to_path_buf(), slot);
        ready
    }

    /// Loads every image the config refers to, blocking.
    pub fn preload_config(&self, config: &OverlayConfig) {
        for path in config.background_image_paths() {
            self.preload_blocking(path);
        }
    }

    pub fn is_settled(&self, path: &Path) -> bool {
        matches!(
            self.slots().get(path),
            Some(ImageSlot::Ready(_) | ImageSlot::Failed)
        )
    }
}

fn load_slot(path: &Path) -> ImageSlot {
    match load_image_pixmap(path) {
        Ok(pixmap) => {
            debug!(path = %path.display(), "background image loaded");
            ImageSlot::Ready(Arc::new(pixmap))
        }
        Err(error) => {
            error!(path = %path.display(), error = %format!("{error:#}"), "error loading background image");
            ImageSlot::Failed
        }
    }
}

/// Paints the configured background. Images that are still loading or
/// failed to load leave the canvas untouched.
pub fn paint_background(pixmap: &mut Pixmap, config: &OverlayConfig, images: &BackgroundImages) {
    let (width, height) = (pixmap.width(), pixmap.height());
    match config.background_mode {
        BackgroundMode::None => {}
        BackgroundMode::Colour => match parse_hex_colour(&config.background_colour) {
            Ok([r, g, b, a]) => pixmap.fill(Color::from_rgba8(r, g, b, a)),
            Err(error) => warn!(error = %error, "skipping background colour"),
        },
        BackgroundMode::FullImage => {
            let Some(path) = config.background_image.as_deref() else {
                return;
            };
            if let Some(image) = images.get_or_request(path) {
                let placement = cover_fit(image.width(), image.height(), width, height);
                draw_scaled(pixmap, &image, placement);
            }
        }
        BackgroundMode::DoubleImage => {
            let full = Placement {
                x: 0.0,
                y: 0.0,
                width: width as f32,
                height: height as f32,
            };
            let pair = &config.double_background_images;
            for path in [pair.image1.as_deref(), pair.image2.as_deref()].into_iter().flatten() {
                if let Some(image) = images.get_or_request(path) {
                    draw_scaled(pixmap, &image, full);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::overlay_config::DoubleBackgroundImages;

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * pixmap.width() + x) * 4) as usize;
        let data = pixmap.data();
        [data[idx], data[idx + 1], data[idx + 2], data[idx + 3]]
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32, color: [u8; 4]) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba(color))
            .save(&path)
            .expect("png should save");
        path
    }

    #[test]
    fn hex_colours_parse_with_and_without_alpha() {
        assert_eq!(parse_hex_colour("#ff8000").unwrap(), [255, 128, 0, 255]);
        assert_eq!(parse_hex_colour("00000080").unwrap(), [0, 0, 0, 128]);
        assert!(parse_hex_colour("#fff").is_err());
        assert!(parse_hex_colour("#gggggg").is_err());
    }

    #[test]
    fn wide_image_covers_by_height() {
        let placement = cover_fit(400, 100, 100, 100);
        assert_eq!(placement.height, 100.0);
        assert_eq!(placement.width, 400.0);
        assert_eq!(placement.x, -150.0);
        assert_eq!(placement.y, 0.0);
    }

    #[test]
    fn tall_image_covers_by_width() {
        let placement = cover_fit(100, 400, 200, 100);
        assert_eq!(placement.width, 200.0);
        assert_eq!(placement.height, 800.0);
        assert_eq!(placement.x, 0.0);
        assert_eq!(placement.y, -350.0);
    }

    #[test]
    fn rgba_is_premultiplied() {
        let pixmap = pixmap_from_rgba(vec![200, 100, 0, 128], 1, 1).unwrap();
        assert_eq!(pixel(&pixmap, 0, 0), [100, 50, 0, 128]);
        assert!(pixmap_from_rgba(vec![0; 3], 1, 1).is_err());
    }

    #[test]
    fn colour_mode_fills_canvas() {
        let mut config = OverlayConfig::default();
        config.background_mode = BackgroundMode::Colour;
        config.background_colour = "#102030".to_owned();
        let mut pixmap = Pixmap::new(8, 8).unwrap();
        paint_background(&mut pixmap, &config, &BackgroundImages::new());
        assert_eq!(pixel(&pixmap, 7, 7), [16, 32, 48, 255]);
    }

    #[test]
    fn preloaded_full_image_covers_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "bg.png", 4, 2, [0, 255, 0, 255]);
        let mut config = OverlayConfig::default();
        config.background_mode = BackgroundMode::FullImage;
        config.background_image = Some(path.clone());

        let images = BackgroundImages::new();
        assert!(images.preload_blocking(&path).is_some());
        let mut pixmap = Pixmap::new(10, 10).unwrap();
        paint_background(&mut pixmap, &config, &images);
        for (x, y) in [(5, 5), (0, 9), (9, 0)] {
            let [r, g, b, _] = pixel(&pixmap, x, y);
            assert!(g >= 250 && r <= 5 && b <= 5, "pixel {x},{y} not covered");
        }
    }

    #[test]
    fn second_double_image_draws_over_first() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_png(dir.path(), "a.png", 2, 2, [255, 0, 0, 255]);
        let second = write_png(dir.path(), "b.png", 2, 2, [0, 0, 255, 255]);
        let mut config = OverlayConfig::default();
        config.background_mode = BackgroundMode::DoubleImage;
        config.double_background_images = DoubleBackgroundImages {
            image1: Some(first),
            image2: Some(second),
        };

        let images = BackgroundImages::new();
        images.preload_config(&config);
        let mut pixmap = Pixmap::new(6, 6).unwrap();
        paint_background(&mut pixmap, &config, &images);
        let [r, _, b, _] = pixel(&pixmap, 3, 3);
        assert!(b >= 250 && r <= 5);
    }

    #[test]
    fn async_request_appears_on_later_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "late.png", 2, 2, [0, 0, 0, 255]);
        let images = BackgroundImages::new();
        assert!(images.get_or_request(&path).is_none());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !images.is_settled(&path) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(images.get_or_request(&path).is_some());
    }

    #[test]
    fn missing_image_leaves_canvas_untouched() {
        let mut config = OverlayConfig::default();
        config.background_mode = BackgroundMode::FullImage;
        config.background_image = Some(PathBuf::from("/nonexistent/bg.png"));
        let images = BackgroundImages::new();
        assert!(images.preload_blocking(Path::new("/nonexistent/bg.png")).is_none());

        let mut pixmap = Pixmap::new(4, 4).unwrap();
        paint_background(&mut pixmap, &config, &images);
        assert!(pixmap.data().iter().all(|byte| *byte == 0));
        assert!(images.get_or_request(Path::new("/nonexistent/bg.png")).is_none());
    }
}
