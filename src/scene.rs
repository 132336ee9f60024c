// ============================================================================
// SCENE MODEL — ordered object graph over a fixed 1280×720 thumbnail surface
// ============================================================================

use std::cell::OnceCell;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ops::text::{FontBook, measure_block, rasterize_block};

/// Canonical thumbnail dimensions. All scenes render at this size.
pub const SCENE_WIDTH: u32 = 1280;
pub const SCENE_HEIGHT: u32 = 720;

/// RGBA color as stored in snapshots and the persisted state.
pub type Color = [u8; 4];

pub const DEFAULT_BACKGROUND: Color = [30, 64, 175, 255];

/// Errors from scene mutation and serialization.
#[derive(Debug)]
pub enum SceneError {
    /// Mutation attempted before the rendering surface finished initializing.
    SurfaceNotReady,
    Serialize(String),
    Snapshot(String),
    Decode(String),
    Encode(String),
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneError::SurfaceNotReady => {
                write!(f, "Canvas is not ready yet — try again in a moment")
            }
            SceneError::Serialize(e) => write!(f, "Failed to serialize scene: {}", e),
            SceneError::Snapshot(e) => write!(f, "Failed to parse scene snapshot: {}", e),
            SceneError::Decode(e) => write!(f, "Failed to decode image: {}", e),
            SceneError::Encode(e) => write!(f, "Failed to encode image: {}", e),
        }
    }
}

/// Styling applied to text objects. The app keeps a persisted singleton of
/// defaults that is merged into every newly created text object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: f32,
    pub fill: Color,
    pub stroke: Color,
    pub stroke_width: f32,
    pub angle: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: "Impact".to_string(),
            font_size: 48.0,
            fill: [255, 255, 255, 255],
            stroke: [0, 0, 0, 255],
            stroke_width: 2.0,
            angle: 0.0,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TextObject {
    pub id: Uuid,
    /// Center position in scene coordinates.
    pub x: f32,
    pub y: f32,
    pub content: String,
    pub style: TextStyle,
}

impl TextObject {
    /// Fingerprint of everything that affects the rasterized appearance.
    /// Used by the scene view to invalidate its texture cache.
    pub fn fingerprint(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut h = std::collections::hash_map::DefaultHasher::new();
        self.content.hash(&mut h);
        self.style.font_family.hash(&mut h);
        self.style.font_size.to_bits().hash(&mut h);
        self.style.fill.hash(&mut h);
        self.style.stroke.hash(&mut h);
        self.style.stroke_width.to_bits().hash(&mut h);
        h.finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ImageObject {
    pub id: Uuid,
    /// Center position in scene coordinates.
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub angle: f32,
    pub opacity: f32,
    /// Natural (unscaled) pixel dimensions.
    pub width: u32,
    pub height: u32,
    /// False for the full-canvas image inserted by an AI replacement.
    pub selectable: bool,
    /// PNG-encoded source pixels, kept so snapshots are self-contained.
    #[serde(with = "png_base64")]
    pub png: Vec<u8>,
    #[serde(skip)]
    decoded: OnceCell<Option<Arc<RgbaImage>>>,
}

impl ImageObject {
    /// Decoded pixels, cached after the first call. `None` if the PNG payload
    /// is corrupt (logged once).
    pub fn pixels(&self) -> Option<Arc<RgbaImage>> {
        self.decoded
            .get_or_init(|| match image::load_from_memory(&self.png) {
                Ok(img) => Some(Arc::new(img.to_rgba8())),
                Err(e) => {
                    crate::log_err!("Scene image {} failed to decode: {}", self.id, e);
                    None
                }
            })
            .clone()
    }
}

/// Base64 (de)serialization for embedded PNG payloads — keeps snapshot JSON
/// compact compared to a numeric byte array.
mod png_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneObject {
    Text(TextObject),
    Image(ImageObject),
}

impl SceneObject {
    pub fn id(&self) -> Uuid {
        match self {
            SceneObject::Text(t) => t.id,
            SceneObject::Image(i) => i.id,
        }
    }

    pub fn position(&self) -> (f32, f32) {
        match self {
            SceneObject::Text(t) => (t.x, t.y),
            SceneObject::Image(i) => (i.x, i.y),
        }
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        match self {
            SceneObject::Text(t) => {
                t.x = x;
                t.y = y;
            }
            SceneObject::Image(i) => {
                i.x = x;
                i.y = y;
            }
        }
    }

    /// Detached clone with a fresh identity, for copy/paste.
    pub fn clone_with_new_id(&self) -> SceneObject {
        let mut clone = self.clone();
        match &mut clone {
            SceneObject::Text(t) => t.id = Uuid::new_v4(),
            SceneObject::Image(i) => i.id = Uuid::new_v4(),
        }
        clone
    }

    pub fn selectable(&self) -> bool {
        match self {
            SceneObject::Text(_) => true,
            SceneObject::Image(i) => i.selectable,
        }
    }

    /// Axis-aligned display size (rotation ignored — used for hit testing
    /// and selection handles, where the unrotated box is good enough).
    pub fn display_size(&self, fonts: &mut FontBook) -> (f32, f32) {
        match self {
            SceneObject::Text(t) => {
                if let Some(font) = fonts.get(&t.style.font_family) {
                    let (w, h) = measure_block(font, &t.content, t.style.font_size);
                    let pad = t.style.stroke_width * 2.0;
                    (w + pad, h + pad)
                } else {
                    // No usable font — approximate from character count
                    let w = t.content.chars().count() as f32 * t.style.font_size * 0.5;
                    (w, t.style.font_size * 1.2)
                }
            }
            SceneObject::Image(i) => (i.width as f32 * i.scale_x, i.height as f32 * i.scale_y),
        }
    }
}

/// Serialized form of the full scene — this is what snapshots and the
/// persisted editor state contain.
#[derive(Serialize, Deserialize)]
struct SceneDoc {
    background: Color,
    objects: Vec<SceneObject>,
}

/// An immutable, fully serialized copy of the scene at one instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn from_json(json: String) -> Self {
        Snapshot(json)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The editable 2D scene: an ordered collection of drawable objects plus a
/// background color. Painter's order — later objects draw on top.
pub struct Scene {
    pub objects: Vec<SceneObject>,
    pub background: Color,
    surface_ready: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            background: DEFAULT_BACKGROUND,
            surface_ready: false,
        }
    }

    /// Called by the scene view once the drawing surface has produced its
    /// first frame. Mutations that need the surface are rejected before this.
    pub fn mark_surface_ready(&mut self) {
        self.surface_ready = true;
    }

    pub fn is_surface_ready(&self) -> bool {
        self.surface_ready
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn find(&self, id: Uuid) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id() == id)
    }

    pub fn find_mut(&mut self, id: Uuid) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.id() == id)
    }

    /// Remove an object by id. Returns true if something was removed.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.objects.len();
        self.objects.retain(|o| o.id() != id);
        self.objects.len() != before
    }

    /// Remove all objects, preserving the background color.
    pub fn clear_objects(&mut self) {
        self.objects.clear();
    }

    /// Insert a detached object (e.g. a pasted clone). Returns its id.
    pub fn insert(&mut self, obj: SceneObject) -> Uuid {
        let id = obj.id();
        self.objects.push(obj);
        id
    }

    /// Swap an image object's pixels in place, keeping its placement. The
    /// natural dimensions are updated; callers that need the on-screen size
    /// preserved should adjust scale accordingly. Used after background
    /// removal, where dimensions never change.
    pub fn replace_object_pixels(&mut self, id: Uuid, img: RgbaImage) -> Result<(), SceneError> {
        let png = encode_png(&img)?;
        let (w, h) = img.dimensions();
        match self.find_mut(id) {
            Some(SceneObject::Image(obj)) => {
                obj.png = png;
                obj.width = w;
                obj.height = h;
                obj.decoded = {
                    let cell = OnceCell::new();
                    let _ = cell.set(Some(Arc::new(img)));
                    cell
                };
                Ok(())
            }
            _ => Err(SceneError::Decode("object is gone or not an image".to_string())),
        }
    }

    // -- Mutation utilities --------------------------------------------------

    /// Add a new editable text object centered on the scene. Returns its id.
    pub fn add_text(&mut self, content: &str, style: TextStyle) -> Uuid {
        let id = Uuid::new_v4();
        self.objects.push(SceneObject::Text(TextObject {
            id,
            x: SCENE_WIDTH as f32 / 2.0,
            y: SCENE_HEIGHT as f32 / 2.0,
            content: content.to_string(),
            style,
        }));
        id
    }

    /// Add a decoded image centered on the scene, uniformly scaled to fit
    /// within 80% of the scene in both dimensions. Never upscales past 1.0.
    pub fn add_image(&mut self, img: RgbaImage) -> Result<Uuid, SceneError> {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Err(SceneError::Decode("image has zero dimensions".to_string()));
        }
        let max_w = SCENE_WIDTH as f32 * 0.8;
        let max_h = SCENE_HEIGHT as f32 * 0.8;
        let scale = (max_w / w as f32).min(max_h / h as f32).min(1.0);

        let id = Uuid::new_v4();
        self.objects.push(SceneObject::Image(ImageObject {
            id,
            x: SCENE_WIDTH as f32 / 2.0,
            y: SCENE_HEIGHT as f32 / 2.0,
            scale_x: scale,
            scale_y: scale,
            angle: 0.0,
            opacity: 1.0,
            width: w,
            height: h,
            selectable: true,
            png: encode_png(&img)?,
            decoded: {
                let cell = OnceCell::new();
                let _ = cell.set(Some(Arc::new(img)));
                cell
            },
        }));
        Ok(id)
    }

    /// Atomically replace the whole scene with one image stretched to exactly
    /// fill the canonical dimensions. Background color is preserved; the
    /// inserted object is not user-selectable.
    pub fn replace_with_image(&mut self, img: RgbaImage) -> Result<Uuid, SceneError> {
        if !self.surface_ready {
            return Err(SceneError::SurfaceNotReady);
        }
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Err(SceneError::Decode("image has zero dimensions".to_string()));
        }
        let png = encode_png(&img)?;

        self.objects.clear();
        let id = Uuid::new_v4();
        self.objects.push(SceneObject::Image(ImageObject {
            id,
            x: SCENE_WIDTH as f32 / 2.0,
            y: SCENE_HEIGHT as f32 / 2.0,
            scale_x: SCENE_WIDTH as f32 / w as f32,
            scale_y: SCENE_HEIGHT as f32 / h as f32,
            angle: 0.0,
            opacity: 1.0,
            width: w,
            height: h,
            selectable: false,
            png,
            decoded: {
                let cell = OnceCell::new();
                let _ = cell.set(Some(Arc::new(img)));
                cell
            },
        }));
        Ok(id)
    }

    /// Topmost selectable object under the given scene coordinate.
    pub fn hit_test(&self, x: f32, y: f32, fonts: &mut FontBook) -> Option<Uuid> {
        for obj in self.objects.iter().rev() {
            if !obj.selectable() {
                continue;
            }
            let (cx, cy) = obj.position();
            let (w, h) = obj.display_size(fonts);
            if (x - cx).abs() <= w / 2.0 && (y - cy).abs() <= h / 2.0 {
                return Some(obj.id());
            }
        }
        None
    }

    // -- Serialization boundary ----------------------------------------------

    /// Serialize the whole scene (objects + background) to a snapshot.
    pub fn snapshot(&self) -> Result<Snapshot, SceneError> {
        let doc = SceneDoc {
            background: self.background,
            objects: self.objects.clone(),
        };
        serde_json::to_string(&doc)
            .map(Snapshot)
            .map_err(|e| SceneError::Serialize(e.to_string()))
    }

    /// Restore the scene from a snapshot. Parses fully before touching the
    /// scene, so a corrupt snapshot leaves the current state intact.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<(), SceneError> {
        let doc: SceneDoc = serde_json::from_str(&snapshot.0)
            .map_err(|e| SceneError::Snapshot(e.to_string()))?;
        self.background = doc.background;
        self.objects = doc.objects;
        Ok(())
    }

    /// Flatten the current visual state to a raster at native resolution.
    pub fn render_to_image(&self, fonts: &mut FontBook) -> RgbaImage {
        let mut out = RgbaImage::from_pixel(SCENE_WIDTH, SCENE_HEIGHT, Rgba(self.background));

        for obj in &self.objects {
            match obj {
                SceneObject::Image(img_obj) => {
                    let Some(src) = img_obj.pixels() else { continue };
                    let target_w = (img_obj.width as f32 * img_obj.scale_x).round().max(1.0);
                    let target_h = (img_obj.height as f32 * img_obj.scale_y).round().max(1.0);
                    let scaled = image::imageops::resize(
                        src.as_ref(),
                        target_w as u32,
                        target_h as u32,
                        image::imageops::FilterType::Triangle,
                    );
                    composite(
                        &mut out,
                        &scaled,
                        img_obj.x,
                        img_obj.y,
                        img_obj.angle,
                        img_obj.opacity,
                    );
                }
                SceneObject::Text(text_obj) => {
                    let Some(font) = fonts.get(&text_obj.style.font_family) else {
                        crate::log_warn!(
                            "No usable font for family '{}', skipping text object",
                            text_obj.style.font_family
                        );
                        continue;
                    };
                    let Some(raster) = rasterize_block(
                        font,
                        &text_obj.content,
                        text_obj.style.font_size,
                        text_obj.style.fill,
                        text_obj.style.stroke,
                        text_obj.style.stroke_width,
                    ) else {
                        continue;
                    };
                    composite(
                        &mut out,
                        &raster,
                        text_obj.x,
                        text_obj.y,
                        text_obj.style.angle,
                        1.0,
                    );
                }
            }
        }

        out
    }

    /// Flatten and encode as a `data:image/png;base64,...` URL — the form the
    /// enhancement client sends over the wire.
    pub fn to_data_url(&self, fonts: &mut FontBook) -> Result<String, SceneError> {
        let raster = self.render_to_image(fonts);
        let png = encode_png(&raster)?;
        Ok(format!("data:image/png;base64,{}", BASE64.encode(png)))
    }
}

/// PNG-encode an RGBA image (lossless).
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, SceneError> {
    let mut buf = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut buf),
        image::ImageOutputFormat::Png,
    )
    .map_err(|e| SceneError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode a `data:image/...;base64,` URL (or a bare base64 PNG) into pixels.
pub fn decode_data_url(url: &str) -> Result<RgbaImage, SceneError> {
    let payload = match url.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => url,
    };
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| SceneError::Decode(e.to_string()))?;
    image::load_from_memory(&bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| SceneError::Decode(e.to_string()))
}

/// Alpha-composite `src` onto `dst` centered at (cx, cy), with rotation in
/// degrees and a global opacity multiplier.
fn composite(dst: &mut RgbaImage, src: &RgbaImage, cx: f32, cy: f32, angle: f32, opacity: f32) {
    let (sw, sh) = (src.width() as f32, src.height() as f32);
    let (dw, dh) = (dst.width() as i32, dst.height() as i32);
    let opacity = opacity.clamp(0.0, 1.0);

    if angle.abs() < f32::EPSILON {
        // Fast path: axis-aligned blit
        let x0 = (cx - sw / 2.0).round() as i32;
        let y0 = (cy - sh / 2.0).round() as i32;
        for sy in 0..src.height() {
            let dy = y0 + sy as i32;
            if dy < 0 || dy >= dh {
                continue;
            }
            for sx in 0..src.width() {
                let dx = x0 + sx as i32;
                if dx < 0 || dx >= dw {
                    continue;
                }
                let px = *src.get_pixel(sx, sy);
                blend_pixel(dst, dx as u32, dy as u32, px, opacity);
            }
        }
        return;
    }

    // Rotated path: inverse-map every destination pixel in the rotated
    // bounding box back into source space.
    let rad = angle.to_radians();
    let (sin, cos) = rad.sin_cos();
    let half_w = (sw / 2.0 * cos.abs() + sh / 2.0 * sin.abs()).ceil();
    let half_h = (sw / 2.0 * sin.abs() + sh / 2.0 * cos.abs()).ceil();
    let x_min = ((cx - half_w).floor() as i32).max(0);
    let x_max = ((cx + half_w).ceil() as i32).min(dw - 1);
    let y_min = ((cy - half_h).floor() as i32).max(0);
    let y_max = ((cy + half_h).ceil() as i32).min(dh - 1);

    for dy in y_min..=y_max {
        for dx in x_min..=x_max {
            let rel_x = dx as f32 - cx;
            let rel_y = dy as f32 - cy;
            // Rotate backwards into unrotated source space
            let sx = rel_x * cos + rel_y * sin + sw / 2.0;
            let sy = -rel_x * sin + rel_y * cos + sh / 2.0;
            if sx < 0.0 || sy < 0.0 || sx >= sw || sy >= sh {
                continue;
            }
            let px = *src.get_pixel(sx as u32, sy as u32);
            blend_pixel(dst, dx as u32, dy as u32, px, opacity);
        }
    }
}

#[inline]
fn blend_pixel(dst: &mut RgbaImage, x: u32, y: u32, src: Rgba<u8>, opacity: f32) {
    let a = src[3] as f32 / 255.0 * opacity;
    if a <= 0.0 {
        return;
    }
    let under = dst.get_pixel_mut(x, y);
    for c in 0..3 {
        under[c] = (src[c] as f32 * a + under[c] as f32 * (1.0 - a)).round() as u8;
    }
    under[3] = ((a + under[3] as f32 / 255.0 * (1.0 - a)) * 255.0).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn add_image_fits_within_80_percent_without_upscaling() {
        let mut scene = Scene::new();
        // Small image: must keep scale 1.0
        scene.add_image(checker(100, 100)).unwrap();
        // Large image: limited by height (0.8 * 720 / 1440 = 0.4)
        scene.add_image(checker(1000, 1440)).unwrap();

        match &scene.objects[0] {
            SceneObject::Image(i) => assert_eq!(i.scale_x, 1.0),
            _ => panic!("expected image"),
        }
        match &scene.objects[1] {
            SceneObject::Image(i) => {
                assert!((i.scale_x - 0.4).abs() < 1e-5);
                assert_eq!(i.scale_x, i.scale_y);
            }
            _ => panic!("expected image"),
        }
    }

    #[test]
    fn replace_stretches_to_canonical_dimensions() {
        let mut scene = Scene::new();
        scene.mark_surface_ready();
        scene.add_text("Sale", TextStyle::default());
        scene.add_image(checker(64, 64)).unwrap();

        scene.replace_with_image(checker(640, 360)).unwrap();
        assert_eq!(scene.object_count(), 1);
        match &scene.objects[0] {
            SceneObject::Image(i) => {
                assert!((i.scale_x - 2.0).abs() < 1e-6);
                assert!((i.scale_y - 2.0).abs() < 1e-6);
                assert!(!i.selectable);
            }
            _ => panic!("expected image"),
        }
    }

    #[test]
    fn replace_fails_before_surface_ready() {
        let mut scene = Scene::new();
        let err = scene.replace_with_image(checker(10, 10)).unwrap_err();
        assert!(matches!(err, SceneError::SurfaceNotReady));
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut scene = Scene::new();
        scene.background = [10, 20, 30, 255];
        scene.add_text("Hello", TextStyle::default());
        scene.add_image(checker(32, 16)).unwrap();

        let snap = scene.snapshot().unwrap();

        let mut other = Scene::new();
        other.restore(&snap).unwrap();
        assert_eq!(other.background, [10, 20, 30, 255]);
        assert_eq!(other.object_count(), 2);
        // Restored scene serializes identically
        assert_eq!(other.snapshot().unwrap(), snap);
    }

    #[test]
    fn restore_of_corrupt_snapshot_leaves_scene_untouched() {
        let mut scene = Scene::new();
        scene.add_text("Keep me", TextStyle::default());
        let bad = Snapshot::from_json("{not json at all".to_string());
        assert!(scene.restore(&bad).is_err());
        assert_eq!(scene.object_count(), 1);
    }

    #[test]
    fn data_url_round_trip() {
        let img = checker(8, 8);
        let url = format!(
            "data:image/png;base64,{}",
            BASE64.encode(encode_png(&img).unwrap())
        );
        let back = decode_data_url(&url).unwrap();
        assert_eq!(back.dimensions(), (8, 8));
        assert_eq!(back.get_pixel(0, 0), img.get_pixel(0, 0));
    }

    #[test]
    fn render_composites_background_and_image() {
        let mut scene = Scene::new();
        scene.background = [0, 255, 0, 255];
        let solid = RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 255]));
        scene.add_image(solid).unwrap();

        let mut fonts = FontBook::new();
        let out = scene.render_to_image(&mut fonts);
        assert_eq!(out.dimensions(), (SCENE_WIDTH, SCENE_HEIGHT));
        // Corner is background, center is the image
        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(*out.get_pixel(640, 360), Rgba([255, 0, 0, 255]));
    }
}
