use eframe::egui;
use uuid::Uuid;

use crate::ops::text::enumerate_system_fonts;
use crate::scene::{Scene, SceneObject, TextStyle};

/// What the panel did this frame, reported to the app for history/persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelEvent {
    /// The scene changed visually; textures need refresh and a save is due.
    SceneEdited,
    /// A discrete edit finished (slider released, field defocused) — the app
    /// pushes a history entry.
    EditCommitted,
    /// The persisted text-style defaults changed.
    StyleDefaultsChanged,
    /// A new object was inserted; it becomes the selection.
    ObjectAdded(Uuid),
    /// The user asked to add an image from disk.
    UploadImageRequested,
    /// The user asked to delete the selected object.
    DeleteRequested,
}

/// Object palette and property inspector. Text-style edits on a selected text
/// object also update the persisted defaults, so the next text object starts
/// from the last styling used.
pub struct LeftPanel {
    font_families: Vec<String>,
    text_draft: String,
}

impl Default for LeftPanel {
    fn default() -> Self {
        Self {
            font_families: enumerate_system_fonts(),
            text_draft: String::new(),
        }
    }
}

impl LeftPanel {
    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        scene: &mut Scene,
        selected: Option<Uuid>,
        style_defaults: &mut TextStyle,
    ) -> Vec<PanelEvent> {
        let mut events = Vec::new();

        ui.heading("Objects");
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(&mut self.text_draft)
                    .hint_text("Your Text Here")
                    .desired_width(140.0),
            );
            if ui.button("Add Text").clicked() {
                let content = if self.text_draft.trim().is_empty() {
                    "Your Text Here"
                } else {
                    self.text_draft.trim()
                };
                let id = scene.add_text(content, style_defaults.clone());
                self.text_draft.clear();
                events.push(PanelEvent::ObjectAdded(id));
                events.push(PanelEvent::SceneEdited);
                events.push(PanelEvent::EditCommitted);
            }
        });

        if ui.button("Upload Image…").clicked() {
            events.push(PanelEvent::UploadImageRequested);
        }

        ui.add_space(8.0);
        ui.separator();
        ui.heading("Background");
        let mut bg = egui::Color32::from_rgba_unmultiplied(
            scene.background[0],
            scene.background[1],
            scene.background[2],
            scene.background[3],
        );
        if ui.color_edit_button_srgba(&mut bg).changed() {
            scene.background = [bg.r(), bg.g(), bg.b(), bg.a()];
            events.push(PanelEvent::SceneEdited);
            events.push(PanelEvent::EditCommitted);
        }

        ui.add_space(8.0);
        ui.separator();

        match selected.and_then(|id| scene.find_mut(id)) {
            Some(SceneObject::Text(text)) => {
                ui.heading("Text");
                let mut edited = false;
                let mut committed = false;

                let content = ui.add(
                    egui::TextEdit::multiline(&mut text.content)
                        .desired_rows(2)
                        .desired_width(f32::INFINITY),
                );
                edited |= content.changed();
                committed |= content.lost_focus();

                egui::ComboBox::from_label("Font")
                    .selected_text(text.style.font_family.clone())
                    .show_ui(ui, |ui| {
                        for family in &self.font_families {
                            if ui
                                .selectable_label(&text.style.font_family == family, family)
                                .clicked()
                            {
                                text.style.font_family = family.clone();
                                edited = true;
                                committed = true;
                            }
                        }
                    });

                let size = ui.add(
                    egui::Slider::new(&mut text.style.font_size, 8.0..=200.0).text("Size"),
                );
                edited |= size.changed();
                committed |= size.drag_released();

                ui.horizontal(|ui| {
                    ui.label("Fill");
                    let mut fill = color32(text.style.fill);
                    if ui.color_edit_button_srgba(&mut fill).changed() {
                        text.style.fill = [fill.r(), fill.g(), fill.b(), fill.a()];
                        edited = true;
                        committed = true;
                    }
                    ui.label("Stroke");
                    let mut stroke = color32(text.style.stroke);
                    if ui.color_edit_button_srgba(&mut stroke).changed() {
                        text.style.stroke = [stroke.r(), stroke.g(), stroke.b(), stroke.a()];
                        edited = true;
                        committed = true;
                    }
                });

                let width = ui.add(
                    egui::Slider::new(&mut text.style.stroke_width, 0.0..=12.0)
                        .text("Stroke width"),
                );
                edited |= width.changed();
                committed |= width.drag_released();

                if edited {
                    // New text objects inherit the latest styling.
                    *style_defaults = text.style.clone();
                    events.push(PanelEvent::SceneEdited);
                    events.push(PanelEvent::StyleDefaultsChanged);
                }
                if committed {
                    events.push(PanelEvent::EditCommitted);
                }
            }
            Some(SceneObject::Image(img)) => {
                ui.heading("Image");
                ui.label(format!("{} × {} px", img.width, img.height));

                let mut edited = false;
                let mut committed = false;

                let opacity =
                    ui.add(egui::Slider::new(&mut img.opacity, 0.0..=1.0).text("Opacity"));
                edited |= opacity.changed();
                committed |= opacity.drag_released();

                let scale = {
                    let mut s = img.scale_x;
                    let r = ui.add(egui::Slider::new(&mut s, 0.05..=4.0).text("Scale"));
                    if r.changed() {
                        img.scale_x = s;
                        img.scale_y = s;
                        edited = true;
                    }
                    r
                };
                committed |= scale.drag_released();

                let angle =
                    ui.add(egui::Slider::new(&mut img.angle, -180.0..=180.0).text("Angle"));
                edited |= angle.changed();
                committed |= angle.drag_released();

                if edited {
                    events.push(PanelEvent::SceneEdited);
                }
                if committed {
                    events.push(PanelEvent::EditCommitted);
                }
            }
            None => {
                ui.weak("Select an object on the canvas to edit it.");
            }
        }

        if selected.is_some() {
            ui.add_space(8.0);
            if ui.button("Delete Object").clicked() {
                events.push(PanelEvent::DeleteRequested);
            }
        }

        events
    }
}

fn color32(c: crate::scene::Color) -> egui::Color32 {
    egui::Color32::from_rgba_unmultiplied(c[0], c[1], c[2], c[3])
}
