use eframe::egui;

// ============================================================================
// API KEY DIALOG
// ============================================================================

/// Modal for entering the generative-image API key. Shown at startup when no
/// key is stored and on demand from the AI panel.
pub struct ApiKeyDialog {
    pub open: bool,
    key_input: String,
    /// Allow dismissing without a key (the AI panel stays disabled).
    pub dismissable: bool,
}

impl Default for ApiKeyDialog {
    fn default() -> Self {
        Self {
            open: false,
            key_input: String::new(),
            dismissable: true,
        }
    }
}

impl ApiKeyDialog {
    pub fn open_with(&mut self, current_key: &str) {
        self.key_input = current_key.to_string();
        self.open = true;
    }

    /// Show the dialog. Returns Some(key) when the user confirms a non-empty
    /// key.
    pub fn show(&mut self, ctx: &egui::Context) -> Option<String> {
        if !self.open {
            return None;
        }

        let mut result = None;
        let mut should_close = false;

        let enter = ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Enter));
        let esc = ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Escape));
        if esc && self.dismissable {
            should_close = true;
        }

        egui::Window::new("api_key_dialog")
            .title_bar(false)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.set_min_width(360.0);
                ui.heading("Gemini API Key");
                ui.add_space(6.0);
                ui.label("AI enhancement needs a Google AI Studio API key. The key is stored locally and never leaves this machine except in API requests.");
                ui.add_space(8.0);

                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.key_input)
                        .password(true)
                        .hint_text("AIza...")
                        .desired_width(f32::INFINITY),
                );
                if self.open && !response.has_focus() && self.key_input.is_empty() {
                    response.request_focus();
                }

                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    let confirm = ui.button("Save Key").clicked() || enter;
                    if confirm && !self.key_input.trim().is_empty() {
                        result = Some(self.key_input.trim().to_string());
                        should_close = true;
                    }
                    if self.dismissable && ui.button("Cancel").clicked() {
                        should_close = true;
                    }
                });
            });

        if should_close {
            self.open = false;
        }
        result
    }
}

// ============================================================================
// CLEAR CANVAS CONFIRMATION
// ============================================================================

/// Two-phase clear: the destructive action only fires after an explicit
/// confirmation.
#[derive(Default)]
pub struct ClearConfirmDialog {
    pub open: bool,
}

impl ClearConfirmDialog {
    /// Returns true when the user confirms the clear.
    pub fn show(&mut self, ctx: &egui::Context) -> bool {
        if !self.open {
            return false;
        }

        let mut confirmed = false;
        let mut should_close = false;

        let enter = ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Enter));
        let esc = ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Escape));
        if esc {
            should_close = true;
        }

        egui::Window::new("clear_confirm_dialog")
            .title_bar(false)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.set_min_width(300.0);
                ui.heading("Clear canvas?");
                ui.add_space(6.0);
                ui.label("All objects will be removed. The background color is kept.");
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Clear").clicked() || enter {
                        confirmed = true;
                        should_close = true;
                    }
                    if ui.button("Cancel").clicked() {
                        should_close = true;
                    }
                });
            });

        if should_close {
            self.open = false;
        }
        confirmed
    }
}
