use std::collections::HashMap;
use std::sync::Arc;

use eframe::egui;
use egui::{Color32, Pos2, Rect, Stroke, Vec2};
use uuid::Uuid;

use crate::ops::text::{FontBook, rasterize_block};
use crate::scene::{SCENE_HEIGHT, SCENE_WIDTH, Scene, SceneObject};

/// Events the app reacts to after a frame of the scene view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneViewEvent {
    /// Selection changed (click on an object or on empty canvas).
    SelectionChanged,
    /// An object drag finished with the object in a new position.
    ObjectMoved,
    /// Double-click on a text object — the app opens its editor.
    TextActivated(Uuid),
}

/// Central canvas widget. Renders the scene scaled to fit the available
/// space, handles selection and drag-move, and caches one GPU texture per
/// object (keyed by a content fingerprint so style edits re-rasterize).
pub struct SceneView {
    textures: HashMap<Uuid, (u64, egui::TextureHandle)>,
    pub selected: Option<Uuid>,
    /// Active drag: object id and pointer offset from the object center.
    dragging: Option<(Uuid, Vec2)>,
    drag_moved: bool,
}

impl Default for SceneView {
    fn default() -> Self {
        Self {
            textures: HashMap::new(),
            selected: None,
            dragging: None,
            drag_moved: false,
        }
    }
}

impl SceneView {
    /// Drop every cached texture. Called after undo/redo/clear, where object
    /// ids may now refer to different content.
    pub fn invalidate_all(&mut self) {
        self.textures.clear();
    }

    pub fn invalidate(&mut self, id: Uuid) {
        self.textures.remove(&id);
    }

    /// Clear the selection if its object no longer exists.
    pub fn prune_selection(&mut self, scene: &Scene) {
        if let Some(id) = self.selected {
            if scene.find(id).is_none() {
                self.selected = None;
            }
        }
    }

    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        scene: &mut Scene,
        fonts: &mut FontBook,
    ) -> Vec<SceneViewEvent> {
        let mut events = Vec::new();

        // Fit the 1280x720 scene into the available space, centered.
        let avail = ui.available_rect_before_wrap();
        let zoom = (avail.width() / SCENE_WIDTH as f32)
            .min(avail.height() / SCENE_HEIGHT as f32)
            .max(0.01);
        let view_size = Vec2::new(SCENE_WIDTH as f32 * zoom, SCENE_HEIGHT as f32 * zoom);
        let view_rect = Rect::from_center_size(avail.center(), view_size);

        let response = ui.allocate_rect(view_rect, egui::Sense::click_and_drag());
        let painter = ui.painter_at(view_rect);

        // The surface exists once we are laying out frames.
        if !scene.is_surface_ready() {
            scene.mark_surface_ready();
        }

        let [r, g, b, a] = scene.background;
        painter.rect_filled(view_rect, 0.0, Color32::from_rgba_unmultiplied(r, g, b, a));

        self.prune_selection(scene);
        self.draw_objects(ui.ctx(), &painter, scene, fonts, view_rect, zoom);
        self.draw_selection(&painter, scene, fonts, view_rect, zoom);
        self.handle_pointer(&response, scene, fonts, view_rect, zoom, &mut events);

        // Thin frame around the canvas.
        painter.rect_stroke(view_rect, 0.0, Stroke::new(1.0, ui.visuals().weak_text_color()));

        events
    }

    fn to_scene(pos: Pos2, view_rect: Rect, zoom: f32) -> (f32, f32) {
        (
            (pos.x - view_rect.min.x) / zoom,
            (pos.y - view_rect.min.y) / zoom,
        )
    }

    fn to_screen(x: f32, y: f32, view_rect: Rect, zoom: f32) -> Pos2 {
        Pos2::new(view_rect.min.x + x * zoom, view_rect.min.y + y * zoom)
    }

    fn draw_objects(
        &mut self,
        ctx: &egui::Context,
        painter: &egui::Painter,
        scene: &Scene,
        fonts: &mut FontBook,
        view_rect: Rect,
        zoom: f32,
    ) {
        // Painter's order: later objects on top.
        for obj in &scene.objects {
            let id = obj.id();
            let fingerprint = object_fingerprint(obj);

            let needs_upload = match self.textures.get(&id) {
                Some((fp, _)) => *fp != fingerprint,
                None => true,
            };
            if needs_upload {
                if let Some(img) = rasterize_object(obj, fonts) {
                    let size = [img.width() as usize, img.height() as usize];
                    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, img.as_raw());
                    let tex = ctx.load_texture(
                        format!("scene_obj_{}", id),
                        egui::ImageData::Color(Arc::new(color_image)),
                        egui::TextureOptions::LINEAR,
                    );
                    self.textures.insert(id, (fingerprint, tex));
                } else {
                    self.textures.remove(&id);
                    continue;
                }
            }

            let Some((_, tex)) = self.textures.get(&id) else {
                continue;
            };

            let (x, y) = obj.position();
            let (dw, dh) = match obj {
                // For images the texture is the natural bitmap; apply scale.
                SceneObject::Image(i) => {
                    (i.width as f32 * i.scale_x, i.height as f32 * i.scale_y)
                }
                // Text textures are already at display resolution.
                SceneObject::Text(_) => {
                    let s = tex.size_vec2();
                    (s.x, s.y)
                }
            };
            let center = Self::to_screen(x, y, view_rect, zoom);
            let rect = Rect::from_center_size(center, Vec2::new(dw * zoom, dh * zoom));

            let tint = match obj {
                SceneObject::Image(i) => {
                    let alpha = (i.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
                    Color32::from_rgba_unmultiplied(255, 255, 255, alpha)
                }
                SceneObject::Text(_) => Color32::WHITE,
            };

            let mut mesh = egui::Mesh::with_texture(tex.id());
            mesh.add_rect_with_uv(rect, Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)), tint);
            rotate_mesh(&mut mesh, center, angle_of(obj));
            painter.add(egui::Shape::mesh(mesh));
        }
    }

    fn draw_selection(
        &self,
        painter: &egui::Painter,
        scene: &Scene,
        fonts: &mut FontBook,
        view_rect: Rect,
        zoom: f32,
    ) {
        let Some(obj) = self.selected.and_then(|id| scene.find(id)) else {
            return;
        };
        let (x, y) = obj.position();
        let (w, h) = obj.display_size(fonts);
        let center = Self::to_screen(x, y, view_rect, zoom);
        let rect = Rect::from_center_size(center, Vec2::new(w * zoom, h * zoom)).expand(2.0);

        let accent = Color32::from_rgb(96, 156, 255);
        painter.rect_stroke(rect, 0.0, Stroke::new(1.5, accent));
        for corner in [
            rect.left_top(),
            rect.right_top(),
            rect.left_bottom(),
            rect.right_bottom(),
        ] {
            let handle = Rect::from_center_size(corner, Vec2::splat(7.0));
            painter.rect_filled(handle, 1.5, accent);
            painter.rect_stroke(handle, 1.5, Stroke::new(1.0, Color32::WHITE));
        }
    }

    fn handle_pointer(
        &mut self,
        response: &egui::Response,
        scene: &mut Scene,
        fonts: &mut FontBook,
        view_rect: Rect,
        zoom: f32,
        events: &mut Vec<SceneViewEvent>,
    ) {
        if response.double_clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let (sx, sy) = Self::to_scene(pos, view_rect, zoom);
                if let Some(id) = scene.hit_test(sx, sy, fonts) {
                    if matches!(scene.find(id), Some(SceneObject::Text(_))) {
                        events.push(SceneViewEvent::TextActivated(id));
                    }
                }
            }
            return;
        }

        if response.drag_started() {
            if let Some(pos) = response.interact_pointer_pos() {
                let (sx, sy) = Self::to_scene(pos, view_rect, zoom);
                let hit = scene.hit_test(sx, sy, fonts);
                if hit != self.selected {
                    self.selected = hit;
                    events.push(SceneViewEvent::SelectionChanged);
                }
                if let Some(id) = hit {
                    if let Some(obj) = scene.find(id) {
                        let (ox, oy) = obj.position();
                        self.dragging = Some((id, Vec2::new(ox - sx, oy - sy)));
                        self.drag_moved = false;
                    }
                }
            }
        }

        if response.dragged() {
            if let (Some((id, offset)), Some(pos)) =
                (self.dragging, response.interact_pointer_pos())
            {
                let (sx, sy) = Self::to_scene(pos, view_rect, zoom);
                if let Some(obj) = scene.find_mut(id) {
                    let (ox, oy) = obj.position();
                    let (nx, ny) = (sx + offset.x, sy + offset.y);
                    if (nx - ox).abs() > f32::EPSILON || (ny - oy).abs() > f32::EPSILON {
                        obj.set_position(nx, ny);
                        self.drag_moved = true;
                    }
                }
            }
        }

        if response.drag_released() {
            if self.dragging.take().is_some() && self.drag_moved {
                events.push(SceneViewEvent::ObjectMoved);
            }
            self.drag_moved = false;
        }

        // A plain click (no drag) selects or deselects.
        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let (sx, sy) = Self::to_scene(pos, view_rect, zoom);
                let hit = scene.hit_test(sx, sy, fonts);
                if hit != self.selected {
                    self.selected = hit;
                    events.push(SceneViewEvent::SelectionChanged);
                }
            }
        }
    }
}

fn angle_of(obj: &SceneObject) -> f32 {
    match obj {
        SceneObject::Text(t) => t.style.angle,
        SceneObject::Image(i) => i.angle,
    }
}

/// Rotate mesh vertices around a screen-space pivot (degrees, clockwise).
fn rotate_mesh(mesh: &mut egui::Mesh, pivot: Pos2, angle_deg: f32) {
    if angle_deg.abs() < f32::EPSILON {
        return;
    }
    let rad = angle_deg.to_radians();
    let (sin, cos) = rad.sin_cos();
    for v in &mut mesh.vertices {
        let dx = v.pos.x - pivot.x;
        let dy = v.pos.y - pivot.y;
        v.pos = Pos2::new(
            pivot.x + dx * cos - dy * sin,
            pivot.y + dx * sin + dy * cos,
        );
    }
}

/// Content hash used to invalidate the texture cache when an object's
/// appearance changes.
fn object_fingerprint(obj: &SceneObject) -> u64 {
    use std::hash::{Hash, Hasher};
    match obj {
        SceneObject::Text(t) => t.fingerprint(),
        SceneObject::Image(i) => {
            let mut h = std::collections::hash_map::DefaultHasher::new();
            i.png.len().hash(&mut h);
            i.width.hash(&mut h);
            i.height.hash(&mut h);
            h.finish()
        }
    }
}

fn rasterize_object(obj: &SceneObject, fonts: &mut FontBook) -> Option<image::RgbaImage> {
    match obj {
        SceneObject::Text(t) => {
            let font = fonts.get(&t.style.font_family)?.clone();
            rasterize_block(
                &font,
                &t.content,
                t.style.font_size,
                t.style.fill,
                t.style.stroke,
                t.style.stroke_width,
            )
        }
        SceneObject::Image(i) => i.pixels().map(|arc| (*arc).clone()),
    }
}
