use eframe::egui;

use crate::store::OnnxPaths;

/// Actions requested from the AI panel, handled by the app (which owns the
/// worker threads and the store).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiPanelEvent {
    /// Video context text changed — persist it.
    VideoContextChanged,
    /// Run the generative enhancement. `lucky` selects the autonomous
    /// template instead of the user instruction.
    EnhanceRequested { lucky: bool },
    /// Run background removal on the selected image object.
    RemoveBackgroundRequested,
    ChangeApiKeyRequested,
    /// ONNX paths changed — persist and re-probe lazily.
    OnnxPathsChanged,
}

/// Inputs the panel needs from the app each frame.
pub struct AiPanelState {
    pub api_key_set: bool,
    pub enhance_busy: bool,
    /// Seconds since the in-flight enhancement started, shown next to the
    /// spinner.
    pub enhance_elapsed_secs: u64,
    pub remove_bg_busy: bool,
    pub selected_is_image: bool,
}

/// Right-side AI panel: enhancement prompt and background-removal setup.
#[derive(Default)]
pub struct AiPanel {
    pub video_context: String,
    pub prompt: String,
    pub onnx_paths: OnnxPaths,
}

impl AiPanel {
    pub fn show(&mut self, ui: &mut egui::Ui, state: &AiPanelState) -> Vec<AiPanelEvent> {
        let mut events = Vec::new();

        ui.heading("AI Enhance");
        ui.add_space(4.0);

        if state.api_key_set {
            ui.horizontal(|ui| {
                ui.weak("API key configured");
                if ui.small_button("Change").clicked() {
                    events.push(AiPanelEvent::ChangeApiKeyRequested);
                }
            });
        } else if ui.button("Set API Key…").clicked() {
            events.push(AiPanelEvent::ChangeApiKeyRequested);
        }

        ui.add_space(6.0);
        ui.label("What is the video about?");
        if ui
            .add(
                egui::TextEdit::multiline(&mut self.video_context)
                    .desired_rows(2)
                    .hint_text("e.g. a 10-minute ramen recipe")
                    .desired_width(f32::INFINITY),
            )
            .changed()
        {
            events.push(AiPanelEvent::VideoContextChanged);
        }

        ui.add_space(6.0);
        ui.label("Enhancement instruction");
        ui.add(
            egui::TextEdit::multiline(&mut self.prompt)
                .desired_rows(3)
                .hint_text("e.g. make the subject glow, punchier colors")
                .desired_width(f32::INFINITY),
        );

        let can_enhance = state.api_key_set && !state.enhance_busy;
        ui.add_space(6.0);
        ui.horizontal(|ui| {
            if ui
                .add_enabled(can_enhance, egui::Button::new("✨ Enhance"))
                .clicked()
            {
                events.push(AiPanelEvent::EnhanceRequested { lucky: false });
            }
            if ui
                .add_enabled(can_enhance, egui::Button::new("🎲 Feeling Lucky"))
                .clicked()
            {
                events.push(AiPanelEvent::EnhanceRequested { lucky: true });
            }
            if state.enhance_busy {
                ui.spinner();
                ui.weak(format!("Generating… {}s", state.enhance_elapsed_secs));
            }
        });

        ui.add_space(10.0);
        ui.separator();
        ui.heading("Background Removal");
        ui.add_space(4.0);

        ui.label("ONNX Runtime library");
        ui.horizontal(|ui| {
            if ui
                .add(
                    egui::TextEdit::singleline(&mut self.onnx_paths.library)
                        .hint_text("/path/to/libonnxruntime.so")
                        .desired_width(180.0),
                )
                .changed()
            {
                events.push(AiPanelEvent::OnnxPathsChanged);
            }
            if ui.small_button("…").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("Shared library", &["so", "dll", "dylib"])
                    .pick_file()
                {
                    self.onnx_paths.library = path.display().to_string();
                    events.push(AiPanelEvent::OnnxPathsChanged);
                }
            }
        });

        ui.label("Matting model (.onnx)");
        ui.horizontal(|ui| {
            if ui
                .add(
                    egui::TextEdit::singleline(&mut self.onnx_paths.model)
                        .hint_text("/path/to/isnet.onnx")
                        .desired_width(180.0),
                )
                .changed()
            {
                events.push(AiPanelEvent::OnnxPathsChanged);
            }
            if ui.small_button("…").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("ONNX model", &["onnx"])
                    .pick_file()
                {
                    self.onnx_paths.model = path.display().to_string();
                    events.push(AiPanelEvent::OnnxPathsChanged);
                }
            }
        });

        let paths_set = !self.onnx_paths.library.is_empty() && !self.onnx_paths.model.is_empty();
        let can_remove = paths_set && state.selected_is_image && !state.remove_bg_busy;
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            if ui
                .add_enabled(can_remove, egui::Button::new("Remove Background"))
                .clicked()
            {
                events.push(AiPanelEvent::RemoveBackgroundRequested);
            }
            if state.remove_bg_busy {
                ui.spinner();
            }
        });
        if !state.selected_is_image && paths_set {
            ui.weak("Select an image object first.");
        }

        events
    }
}
