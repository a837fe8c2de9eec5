//! Text watermarking for rendered variants.
//!
//! Text is rasterised into a coverage mask first and then blended onto the
//! image with the configured fill and opacity, so glyph edges keep their
//! anti-aliasing and a translucent fill does not darken the image behind it.
//!
//! Font lookup never fails: a configured font file is tried first, then the
//! system candidates in [`SYSTEM_FONT_CANDIDATES`], and finally a built-in
//! 5x7 bitmap face.

use crate::config::WatermarkConfig;
use crate::constants::{MAX_WATERMARK_FONT_SIZE, SYSTEM_FONT_CANDIDATES};
use ab_glyph::{point, Font, FontVec, GlyphId, OutlinedGlyph, PxScale, ScaleFont};
use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

pub enum FontHandle {
    TrueType { font: FontVec, origin: PathBuf },
    Builtin,
}

impl std::fmt::Debug for FontHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FontHandle::TrueType { origin, .. } => write!(f, "TrueType({})", origin.display()),
            FontHandle::Builtin => write!(f, "Builtin"),
        }
    }
}

impl FontHandle {
    /// Best available font: `requested`, then the system candidates, then the
    /// built-in bitmap face.
    pub fn resolve(requested: Option<&Path>) -> FontHandle {
        let candidates = requested
            .into_iter()
            .map(Path::to_path_buf)
            .chain(SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from));

        for candidate in candidates {
            if let Some(handle) = Self::load(&candidate) {
                tracing::debug!(font = %candidate.display(), "Watermark font resolved");
                return handle;
            }
        }

        if let Some(path) = requested {
            tracing::warn!(
                font = %path.display(),
                "Requested watermark font unavailable, using built-in bitmap font"
            );
        } else {
            tracing::debug!("No system font found, using built-in bitmap font");
        }
        FontHandle::Builtin
    }

    fn load(path: &Path) -> Option<FontHandle> {
        let data = std::fs::read(path).ok()?;
        match FontVec::try_from_vec(data) {
            Ok(font) => Some(FontHandle::TrueType {
                font,
                origin: path.to_path_buf(),
            }),
            Err(e) => {
                tracing::debug!(font = %path.display(), error = %e, "Skipping unreadable font");
                None
            }
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, FontHandle::Builtin)
    }
}

#[derive(Debug)]
pub struct Watermark {
    text: String,
    font: FontHandle,
    font_size: f32,
    inset: u32,
    fill: [u8; 3],
    opacity: f32,
}

impl Watermark {
    /// Builds a watermark from configuration, or `None` when disabled.
    pub fn from_config(config: &WatermarkConfig) -> Option<Self> {
        let text = config.active_text()?;
        Some(Self::with_font(
            text,
            FontHandle::resolve(config.font_path.as_deref()),
            config,
        ))
    }

    pub fn with_font(text: &str, font: FontHandle, config: &WatermarkConfig) -> Self {
        Self {
            text: text.to_string(),
            font,
            font_size: config.font_size,
            inset: config.inset,
            fill: config.fill,
            opacity: config.opacity.clamp(0.0, 1.0),
        }
    }

    /// Size of the inked area of the text in pixels.
    pub fn footprint(&self) -> (u32, u32) {
        match &self.font {
            FontHandle::TrueType { font, .. } => {
                layout_text(font, self.font_size, &self.text).footprint()
            }
            FontHandle::Builtin => builtin::text_size(&self.text, self.builtin_scale()),
        }
    }

    /// Top-left corner of the inked area, anchored bottom-right with the
    /// inset. Clamped to the image origin when the text does not fit.
    pub fn origin(&self, image_width: u32, image_height: u32) -> (i32, i32) {
        self.anchor(self.footprint(), image_width, image_height)
    }

    fn anchor(&self, footprint: (u32, u32), image_width: u32, image_height: u32) -> (i32, i32) {
        let (text_width, text_height) = footprint;
        let x = image_width as i64 - text_width as i64 - self.inset as i64;
        let y = image_height as i64 - text_height as i64 - self.inset as i64;
        (x.max(0) as i32, y.max(0) as i32)
    }

    /// Stamps the text onto a copy of `img`.
    pub fn apply(&self, img: &DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return img.clone();
        }

        let mask = self.coverage_mask(width, height);
        let mut canvas = img.to_rgba8();
        blend_mask(&mut canvas, &mask, self.fill, self.opacity);

        if img.color().has_alpha() {
            DynamicImage::ImageRgba8(canvas)
        } else {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
        }
    }

    fn coverage_mask(&self, width: u32, height: u32) -> GrayImage {
        let mut mask = GrayImage::new(width, height);

        match &self.font {
            FontHandle::TrueType { font, .. } => {
                let layout = layout_text(font, self.font_size, &self.text);
                let (x, y) = self.anchor(layout.footprint(), width, height);
                layout.draw(&mut mask, x, y);
            }
            FontHandle::Builtin => {
                let scale = self.builtin_scale();
                let (x, y) = self.anchor(builtin::text_size(&self.text, scale), width, height);
                builtin::draw(&mut mask, x, y, &self.text, scale);
            }
        }

        mask
    }

    fn builtin_scale(&self) -> u32 {
        // NaN casts to 0 and infinity saturates, both end up in range.
        ((self.font_size / builtin::NOMINAL_SIZE).round() as u32).clamp(1, builtin::MAX_SCALE)
    }
}

/// Glyph outlines on a single baseline and the union of their pixel bounds.
struct TextLayout {
    glyphs: Vec<OutlinedGlyph>,
    ink: Option<ab_glyph::Rect>,
}

fn layout_text(font: &FontVec, size: f32, text: &str) -> TextLayout {
    let scale = PxScale::from(size);
    let scaled = font.as_scaled(scale);
    let mut caret = 0.0f32;
    let mut previous: Option<GlyphId> = None;
    let mut glyphs = Vec::new();
    let mut ink: Option<ab_glyph::Rect> = None;

    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(previous) = previous {
            caret += scaled.kern(previous, id);
        }
        let glyph = id.with_scale_and_position(scale, point(caret, scaled.ascent()));
        caret += scaled.h_advance(id);
        previous = Some(id);

        if let Some(outline) = font.outline_glyph(glyph) {
            let bounds = outline.px_bounds();
            ink = Some(match ink {
                None => bounds,
                Some(ink) => ab_glyph::Rect {
                    min: point(ink.min.x.min(bounds.min.x), ink.min.y.min(bounds.min.y)),
                    max: point(ink.max.x.max(bounds.max.x), ink.max.y.max(bounds.max.y)),
                },
            });
            glyphs.push(outline);
        }
    }

    TextLayout { glyphs, ink }
}

impl TextLayout {
    fn footprint(&self) -> (u32, u32) {
        self.ink
            .map(|ink| (ink.width().ceil() as u32, ink.height().ceil() as u32))
            .unwrap_or((0, 0))
    }

    /// Rasterises the glyphs with the top-left of the ink box at `(x, y)`.
    fn draw(&self, mask: &mut GrayImage, x: i32, y: i32) {
        let Some(ink) = self.ink else {
            return;
        };
        let (width, height) = (mask.width() as i64, mask.height() as i64);

        for glyph in &self.glyphs {
            let bounds = glyph.px_bounds();
            let left = x as i64 + (bounds.min.x - ink.min.x).round() as i64;
            let top = y as i64 + (bounds.min.y - ink.min.y).round() as i64;
            glyph.draw(|gx, gy, coverage| {
                let (px, py) = (left + gx as i64, top + gy as i64);
                if px < 0 || py < 0 || px >= width || py >= height {
                    return;
                }
                let value = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
                let pixel = mask.get_pixel_mut(px as u32, py as u32);
                pixel[0] = pixel[0].max(value);
            });
        }
    }
}

fn blend_mask(canvas: &mut RgbaImage, mask: &GrayImage, fill: [u8; 3], opacity: f32) {
    for (pixel, coverage) in canvas.pixels_mut().zip(mask.pixels()) {
        if coverage[0] == 0 {
            continue;
        }
        let alpha = coverage[0] as f32 / 255.0 * opacity;
        let Rgba([r, g, b, a]) = *pixel;
        let mix = |base: u8, top: u8| -> u8 {
            (base as f32 * (1.0 - alpha) + top as f32 * alpha).round() as u8
        };
        *pixel = Rgba([
            mix(r, fill[0]),
            mix(g, fill[1]),
            mix(b, fill[2]),
            mix(a, 255),
        ]);
    }
}

/// Built-in 5x7 bitmap face. Lowercase letters render as capitals and
/// characters without a glyph render as `?`.
mod builtin {
    use super::*;

    pub const NOMINAL_SIZE: f32 = 8.0;
    pub const MAX_SCALE: u32 = (MAX_WATERMARK_FONT_SIZE / NOMINAL_SIZE) as u32;
    const GLYPH_WIDTH: u32 = 5;
    const GLYPH_HEIGHT: u32 = 7;
    const ADVANCE: u32 = GLYPH_WIDTH + 1;

    pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
        let count = text.chars().count() as u32;
        if count == 0 {
            return (0, 0);
        }
        (
            count.saturating_mul(ADVANCE).saturating_sub(1).saturating_mul(scale),
            GLYPH_HEIGHT.saturating_mul(scale),
        )
    }

    pub fn draw(mask: &mut GrayImage, x: i32, y: i32, text: &str, scale: u32) {
        let offset = |base: i32, steps: u64| -> i32 {
            let position = base as i64 + steps.saturating_mul(scale as u64).min(i32::MAX as u64) as i64;
            position.min(i32::MAX as i64) as i32
        };
        for (index, ch) in text.chars().enumerate() {
            let cell_x = offset(x, index as u64 * ADVANCE as u64);
            if cell_x >= mask.width() as i32 {
                break;
            }
            for (row, bits) in glyph(ch).iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    let rect = Rect::at(offset(cell_x, col as u64), offset(y, row as u64))
                        .of_size(scale, scale);
                    draw_filled_rect_mut(mask, rect, Luma([255u8]));
                }
            }
        }
    }

    fn glyph(ch: char) -> [u8; 7] {
        match ch.to_ascii_uppercase() {
            ' ' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
            'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
            'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
            'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
            'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
            'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
            'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
            'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
            'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
            'I' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x1F],
            'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
            'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
            'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
            'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
            'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
            'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
            'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
            'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
            'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
            'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
            'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
            'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
            'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
            'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
            'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
            'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
            'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
            '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
            '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
            '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
            '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
            '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
            '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
            '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
            '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
            '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
            '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
            '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
            ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
            '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
            '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
            '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
            ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
            '\'' => [0x04, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
            '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
            '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
            ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
            '&' => [0x0C, 0x12, 0x14, 0x08, 0x15, 0x12, 0x0D],
            '@' => [0x0E, 0x11, 0x01, 0x0D, 0x15, 0x15, 0x0E],
            _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn builtin_watermark(text: &str, fill: [u8; 3], opacity: f32) -> Watermark {
        let config = WatermarkConfig {
            text: text.to_string(),
            font_size: 16.0,
            fill,
            opacity,
            ..WatermarkConfig::default()
        };
        Watermark::with_font(text, FontHandle::Builtin, &config)
    }

    fn changed_bounds(before: &DynamicImage, after: &DynamicImage) -> Option<(u32, u32, u32, u32)> {
        let before = before.to_rgb8();
        let after = after.to_rgb8();
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, pixel) in after.enumerate_pixels() {
            if pixel != before.get_pixel(x, y) {
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        bounds
    }

    #[test]
    fn test_resolve_missing_font_falls_back_to_builtin() {
        let handle = FontHandle::resolve(Some(Path::new("/definitely/not/a/font.ttf")));
        // A system font may exist on the host; either way resolution succeeds.
        if let FontHandle::TrueType { origin, .. } = &handle {
            assert_ne!(origin, Path::new("/definitely/not/a/font.ttf"));
        } else {
            assert!(handle.is_builtin());
        }
    }

    #[test]
    fn test_invalid_font_file_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();
        assert!(FontHandle::load(&bogus).is_none());
    }

    #[test]
    fn test_builtin_footprint() {
        let watermark = builtin_watermark("AB", [0, 0, 0], 1.0);
        // scale 2: (2 * 6 - 1) * 2 wide, 7 * 2 tall
        assert_eq!(watermark.footprint(), (22, 14));
        assert_eq!(builtin_watermark("", [0, 0, 0], 1.0).footprint(), (0, 0));
    }

    #[test]
    fn test_watermark_anchored_bottom_right_with_inset() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(200, 120, Rgb([0, 0, 0])));
        let watermark = builtin_watermark("II", [255, 255, 255], 1.0);
        let stamped = watermark.apply(&img);

        assert_eq!(stamped.dimensions(), (200, 120));
        let (x0, y0, x1, y1) = changed_bounds(&img, &stamped).unwrap();
        let (tw, th) = watermark.footprint();
        assert_eq!(x1, 200 - 10 - 1);
        assert_eq!(y1, 120 - 10 - 1);
        assert_eq!(x0, 200 - 10 - tw);
        assert_eq!(y0, 120 - 10 - th);
    }

    #[test]
    fn test_watermark_is_clamped_on_tiny_images() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));
        let watermark = builtin_watermark("WATERMARK", [255, 255, 255], 1.0);
        assert_eq!(watermark.origin(8, 8), (0, 0));
        let stamped = watermark.apply(&img);
        assert_eq!(stamped.dimensions(), (8, 8));
    }

    #[test]
    fn test_opacity_blends_fill() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(100, 60, Rgb([0, 0, 0])));
        let watermark = builtin_watermark("I", [255, 255, 255], 0.5);
        let stamped = watermark.apply(&img).to_rgb8();

        // The bottom row of the glyph is fully covered.
        let pixel = stamped.get_pixel(100 - 10 - 1, 60 - 10 - 1);
        assert!(pixel[0] > 120 && pixel[0] < 135, "got {:?}", pixel);
    }

    #[test]
    fn test_alpha_channel_is_preserved() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 64, Rgba([10, 10, 10, 0])));
        let watermark = builtin_watermark("I", [0, 0, 0], 1.0);
        let stamped = watermark.apply(&img);
        assert!(stamped.color().has_alpha());

        let rgb = DynamicImage::ImageRgb8(image::RgbImage::new(64, 64));
        assert!(!watermark.apply(&rgb).color().has_alpha());
    }

    #[test]
    fn test_truetype_ink_respects_inset() {
        let font = FontHandle::resolve(None);
        if font.is_builtin() {
            return;
        }
        let config = WatermarkConfig {
            fill: [255, 255, 255],
            opacity: 1.0,
            ..WatermarkConfig::default()
        };
        let watermark = Watermark::with_font("Fotographiya", font, &config);
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(400, 200, Rgb([0, 0, 0])));
        let stamped = watermark.apply(&img);

        let (tw, th) = watermark.footprint();
        let (x0, y0, x1, y1) = changed_bounds(&img, &stamped).unwrap();
        assert!(x0 >= 400 - 10 - tw && y0 >= 200 - 10 - th, "ink starts at ({x0}, {y0})");
        assert!(x1 <= 400 - 10 - 1, "ink reaches column {x1}");
        assert!(y1 <= 200 - 10 - 1, "ink reaches row {y1}");
        // Edge pixels of the glyph boxes may carry almost no coverage.
        assert!(x1 >= 400 - 10 - 3 && y1 >= 200 - 10 - 3, "ink ends at ({x1}, {y1})");
    }

    #[test]
    fn test_truetype_footprint_covers_descenders() {
        let font = FontHandle::resolve(None);
        if font.is_builtin() {
            return;
        }
        let config = WatermarkConfig::default();
        let flat = Watermark::with_font("ace", FontHandle::resolve(None), &config).footprint();
        let tall = Watermark::with_font("Agy", font, &config).footprint();
        assert!(tall.1 > flat.1);
    }

    #[test]
    fn test_oversized_font_does_not_panic() {
        for size in [1.0e10, f32::INFINITY, f32::NAN] {
            let config = WatermarkConfig {
                font_size: size,
                ..WatermarkConfig::default()
            };
            let watermark = Watermark::with_font("Fotographiya", FontHandle::Builtin, &config);
            let img = DynamicImage::ImageRgb8(image::RgbImage::new(64, 48));
            assert_eq!(watermark.apply(&img).dimensions(), (64, 48));
            assert_eq!(watermark.origin(64, 48), (0, 0));
        }
    }

    #[test]
    fn test_from_config_disabled() {
        let config = WatermarkConfig {
            enabled: false,
            ..WatermarkConfig::default()
        };
        assert!(Watermark::from_config(&config).is_none());
    }
}
