use std::collections::HashMap;

use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};
use image::RgbaImage;

use crate::scene::Color;

/// Loaded-font cache keyed by family name. A family that fails to resolve is
/// cached as `None` so we only hit font-kit once per name.
pub struct FontBook {
    cache: HashMap<String, Option<FontArc>>,
}

impl FontBook {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Font for `family`, falling back to the platform sans-serif when the
    /// family is unknown. Returns `None` only when no usable font exists at
    /// all (headless CI without fontconfig).
    pub fn get(&mut self, family: &str) -> Option<&FontArc> {
        self.cache
            .entry(family.to_string())
            .or_insert_with(|| load_system_font(family))
            .as_ref()
    }
}

impl Default for FontBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a font by family name from the system, falling back to sans-serif.
fn load_system_font(family: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let source = SystemSource::new();
    let handle = source
        .select_best_match(
            &[
                FamilyName::Title(family.to_string()),
                FamilyName::SansSerif,
            ],
            &Properties::new(),
        )
        .ok()?;

    let font_data = handle.load().ok()?;
    let font_data_copy = font_data.copy_font_data()?;
    let bytes: Vec<u8> = (*font_data_copy).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// Enumerate system font families (family names only, no weight variants).
/// Returns a sorted, deduplicated list of font family names.
pub fn enumerate_system_fonts() -> Vec<String> {
    match font_kit::source::SystemSource::new().all_families() {
        Ok(mut families) => {
            families.sort();
            families.dedup();
            families
        }
        Err(_) => {
            #[cfg(target_os = "linux")]
            {
                vec![
                    "Liberation Sans".to_string(),
                    "DejaVu Sans".to_string(),
                    "Liberation Mono".to_string(),
                ]
            }
            #[cfg(not(target_os = "linux"))]
            {
                vec![
                    "Arial".to_string(),
                    "Impact".to_string(),
                    "Times New Roman".to_string(),
                ]
            }
        }
    }
}

/// Lay out one line left-aligned at x=0, returning positioned glyphs and the
/// line advance width.
fn layout_line(font: &FontArc, line: &str, font_size: f32) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in line.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    (glyphs, cursor_x)
}

/// Measure a (possibly multiline) text block: `(width, height)` of the tight
/// layout box. Empty text measures as a single empty line.
pub fn measure_block(font: &FontArc, text: &str, font_size: f32) -> (f32, f32) {
    let scaled = font.as_scaled(font_size);
    let line_height = scaled.height();

    let mut width = 0.0f32;
    let mut line_count = 0usize;
    for line in text.split('\n') {
        let (_, advance) = layout_line(font, line, font_size);
        width = width.max(advance);
        line_count += 1;
    }

    (width, line_height * line_count.max(1) as f32)
}

/// All glyphs of a multiline block, center-aligned per line, positioned with
/// the block's top-left at the origin. Returns `(glyphs, block_w, block_h)`
/// where each glyph carries its baseline position.
fn layout_block(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32, f32)>, f32, f32) {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();
    let line_height = scaled.height();
    let (block_w, block_h) = measure_block(font, text, font_size);

    let mut all = Vec::new();
    for (line_idx, line) in text.split('\n').enumerate() {
        let (glyphs, advance) = layout_line(font, line, font_size);
        let x_off = (block_w - advance) * 0.5;
        let baseline = line_idx as f32 * line_height + ascent;
        for (id, gx) in glyphs {
            all.push((id, gx + x_off, baseline));
        }
    }

    (all, block_w, block_h)
}

/// Accumulate glyph coverage into a single-channel buffer, offset by
/// `(dx, dy)` pixels. Used once for the fill pass and once per stroke offset.
fn accumulate_coverage(
    font: &FontArc,
    glyphs: &[(GlyphId, f32, f32)],
    font_size: f32,
    coverage: &mut [f32],
    buf_w: u32,
    buf_h: u32,
    dx: f32,
    dy: f32,
) {
    for &(glyph_id, gx, gy) in glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(gx + dx, gy + dy));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|px, py, cov| {
            let ix = px as i32 + bounds.min.x as i32;
            let iy = py as i32 + bounds.min.y as i32;
            if ix >= 0 && iy >= 0 && (ix as u32) < buf_w && (iy as u32) < buf_h {
                let idx = iy as usize * buf_w as usize + ix as usize;
                coverage[idx] = coverage[idx].max(cov);
            }
        });
    }
}

/// Rasterize a text block into a tight RGBA image: stroke underneath, fill on
/// top, per-line center alignment. Returns `None` for text that covers no
/// pixels (empty or whitespace-only).
pub fn rasterize_block(
    font: &FontArc,
    text: &str,
    font_size: f32,
    fill: Color,
    stroke: Color,
    stroke_width: f32,
) -> Option<RgbaImage> {
    let (glyphs, block_w, block_h) = layout_block(font, text, font_size);
    if glyphs.is_empty() {
        return None;
    }

    // Pad for stroke offsets plus hinting overshoot past the layout box.
    let pad = stroke_width.max(0.0).ceil() + 2.0;
    let buf_w = (block_w + pad * 2.0).ceil() as u32;
    let buf_h = (block_h + pad * 2.0).ceil() as u32;
    if buf_w == 0 || buf_h == 0 {
        return None;
    }

    let needed = buf_w as usize * buf_h as usize;
    let mut fill_cov = vec![0.0f32; needed];
    accumulate_coverage(font, &glyphs, font_size, &mut fill_cov, buf_w, buf_h, pad, pad);

    // Stroke as the union of the fill coverage shifted around a ring of
    // offsets. Crude next to a true distance-field outline but matches the
    // heavy-outline thumbnail look and stays dependency-free.
    let mut stroke_cov = vec![0.0f32; needed];
    if stroke_width > 0.0 && stroke[3] > 0 {
        let steps = 16;
        for i in 0..steps {
            let theta = i as f32 / steps as f32 * std::f32::consts::TAU;
            accumulate_coverage(
                font,
                &glyphs,
                font_size,
                &mut stroke_cov,
                buf_w,
                buf_h,
                pad + stroke_width * theta.cos(),
                pad + stroke_width * theta.sin(),
            );
        }
    }

    let mut any = false;
    let mut img = RgbaImage::new(buf_w, buf_h);
    for i in 0..needed {
        let sc = stroke_cov[i];
        let fc = fill_cov[i];
        if sc <= 0.001 && fc <= 0.001 {
            continue;
        }
        any = true;

        // Stroke first, fill composited over it.
        let mut px = [0.0f32; 4];
        if sc > 0.001 {
            let a = stroke[3] as f32 / 255.0 * sc;
            px = [stroke[0] as f32, stroke[1] as f32, stroke[2] as f32, a];
        }
        if fc > 0.001 {
            let a = fill[3] as f32 / 255.0 * fc;
            let inv = 1.0 - a;
            px = [
                fill[0] as f32 * a + px[0] * px[3] * inv,
                fill[1] as f32 * a + px[1] * px[3] * inv,
                fill[2] as f32 * a + px[2] * px[3] * inv,
                a + px[3] * inv,
            ];
            if px[3] > 0.0 {
                px[0] /= px[3];
                px[1] /= px[3];
                px[2] /= px[3];
            }
        }

        let x = (i % buf_w as usize) as u32;
        let y = (i / buf_w as usize) as u32;
        img.put_pixel(
            x,
            y,
            image::Rgba([
                px[0].round().min(255.0) as u8,
                px[1].round().min(255.0) as u8,
                px[2].round().min(255.0) as u8,
                (px[3] * 255.0).round().min(255.0) as u8,
            ]),
        );
    }

    if any { Some(img) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_font() -> Option<FontArc> {
        load_system_font("DejaVu Sans")
    }

    #[test]
    fn measure_grows_with_content() {
        let Some(font) = test_font() else {
            return; // headless environment without fonts
        };
        let (w1, h1) = measure_block(&font, "Hi", 48.0);
        let (w2, h2) = measure_block(&font, "Hello world", 48.0);
        assert!(w2 > w1);
        assert_eq!(h1, h2);

        let (_, h3) = measure_block(&font, "two\nlines", 48.0);
        assert!(h3 > h2 * 1.5);
    }

    #[test]
    fn rasterize_covers_pixels_and_empty_yields_none() {
        let Some(font) = test_font() else {
            return;
        };
        let img = rasterize_block(
            &font,
            "POP",
            48.0,
            [255, 255, 255, 255],
            [0, 0, 0, 255],
            2.0,
        )
        .expect("visible text rasterizes");
        assert!(img.pixels().any(|p| p.0[3] > 0));

        assert!(rasterize_block(&font, "", 48.0, [255; 4], [0, 0, 0, 255], 2.0).is_none());
    }

    #[test]
    fn stroke_extends_past_fill() {
        let Some(font) = test_font() else {
            return;
        };
        let plain = rasterize_block(&font, "O", 64.0, [255; 4], [0, 0, 0, 0], 0.0).unwrap();
        let stroked = rasterize_block(&font, "O", 64.0, [255; 4], [0, 0, 0, 255], 4.0).unwrap();
        let coverage = |img: &RgbaImage| img.pixels().filter(|p| p.0[3] > 0).count();
        assert!(coverage(&stroked) > coverage(&plain));
    }

    #[test]
    fn font_book_caches_lookups() {
        let mut book = FontBook::new();
        let first = book.get("Definitely Not A Real Family 123").cloned();
        let second = book.get("Definitely Not A Real Family 123").cloned();
        // Either both resolve to the sans-serif fallback or both miss.
        assert_eq!(first.is_some(), second.is_some());
    }
}
