use crate::components::ai_panel::{AiPanel, AiPanelEvent, AiPanelState};
use crate::components::dialogs::{ApiKeyDialog, ClearConfirmDialog};
use crate::components::left_panel::{LeftPanel, PanelEvent};
use crate::components::scene_view::{SceneView, SceneViewEvent};
use crate::components::toast::Toasts;
use crate::ops::clipboard;
use crate::ops::enhance::{EnhanceClient, EnhanceError, EnhanceRequest};
use crate::ops::remove_bg::{self, RemoveBgError};
use crate::ops::text::FontBook;
use crate::project::EditorSession;
use crate::scene::{self, SceneObject, TextStyle, decode_data_url};
use crate::store::StateStore;
use crate::{log_err, log_info};
use eframe::egui;
use image::RgbaImage;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Offset applied to a pasted object so it does not land exactly on the
/// original.
const PASTE_OFFSET: f32 = 10.0;

// ============================================================================
// ASYNC JOB PIPELINE — background AI work with channel completion
// ============================================================================

/// Result delivered from a background worker thread. Each worker owns a clone
/// of the sender; the app drains the receiver once per frame.
enum JobResult {
    /// Generative enhancement finished; `Ok` carries the returned scene as a
    /// PNG data URL.
    Enhanced(Result<String, EnhanceError>),
    /// Background removal finished for one image object. The id is re-checked
    /// on receipt: the object may have been deleted while the job ran.
    BgRemoved {
        object_id: Uuid,
        result: Result<RgbaImage, RemoveBgError>,
    },
}

/// Decides whether the app-internal copy buffer or the system clipboard
/// feeds the next paste. The internal clone wins exactly once per copy;
/// a successful system-clipboard paste hands the next turn back to it.
#[derive(Default)]
struct PasteTurn {
    used_internal: bool,
}

impl PasteTurn {
    /// A fresh copy re-arms the internal buffer.
    fn reset(&mut self) {
        self.used_internal = false;
    }

    fn internal_first(&self) -> bool {
        !self.used_internal
    }

    fn internal_pasted(&mut self) {
        self.used_internal = true;
    }

    fn system_pasted(&mut self) {
        self.used_internal = false;
    }
}

// ============================================================================
// APP
// ============================================================================

pub struct ThumbPopApp {
    session: EditorSession,
    store: StateStore,
    client: EnhanceClient,
    fonts: FontBook,

    scene_view: SceneView,
    left_panel: LeftPanel,
    ai_panel: AiPanel,
    toasts: Toasts,
    api_key_dialog: ApiKeyDialog,
    clear_dialog: ClearConfirmDialog,

    /// Styling applied to the next new text object; persisted across runs.
    style_defaults: TextStyle,
    /// Last stored API key, kept so the change dialog can pre-fill it.
    api_key: String,
    /// App-internal copy buffer (survives with full object fidelity, unlike
    /// the system clipboard which only carries pixels).
    copied: Option<SceneObject>,
    paste_turn: PasteTurn,

    job_sender: mpsc::Sender<JobResult>,
    job_receiver: mpsc::Receiver<JobResult>,
    enhance_busy: bool,
    enhance_started: Option<std::time::Instant>,
    remove_bg_busy: bool,

    /// True once the persisted scene has been applied. Restore is deferred
    /// until the first frame has run, so texture uploads land on a live
    /// render surface.
    restored_from_store: bool,
}

impl ThumbPopApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        let store = StateStore::open_default();

        let mut client = EnhanceClient::new();
        let api_key = store.load_api_key().unwrap_or_default();
        if !api_key.is_empty() {
            client.configure(&api_key);
        }

        let mut ai_panel = AiPanel::default();
        if let Some(context) = store.load_video_context() {
            ai_panel.video_context = context;
        }
        if let Some(paths) = store.load_onnx_paths() {
            ai_panel.onnx_paths = paths;
        }

        let style_defaults = store.load_text_style().unwrap_or_default();

        // Ask for a key at startup when none is stored. Dismissable: the
        // editor works fully without one, only the AI panel stays disabled.
        let mut api_key_dialog = ApiKeyDialog::default();
        if api_key.is_empty() {
            api_key_dialog.open = true;
        }

        let (job_sender, job_receiver) = mpsc::channel();

        Self {
            session: EditorSession::new(),
            store,
            client,
            fonts: FontBook::new(),
            scene_view: SceneView::default(),
            left_panel: LeftPanel::default(),
            ai_panel,
            toasts: Toasts::default(),
            api_key_dialog,
            clear_dialog: ClearConfirmDialog::default(),
            style_defaults,
            api_key,
            copied: None,
            paste_turn: PasteTurn::default(),
            job_sender,
            job_receiver,
            enhance_busy: false,
            enhance_started: None,
            remove_bg_busy: false,
            restored_from_store: false,
        }
    }

    // ------------------------------------------------------------------
    //  Startup restore
    // ------------------------------------------------------------------

    /// Apply the persisted scene once the render surface exists, then seed
    /// the history so the restored state is the undo floor.
    fn restore_persisted_scene(&mut self) {
        if let Some(record) = self.store.load_scene() {
            let snap = crate::scene::Snapshot::from_json(record.snapshot);
            match self.session.scene.restore(&snap) {
                Ok(()) => {
                    log_info!(
                        "Restored scene with {} object(s)",
                        self.session.scene.object_count()
                    );
                }
                Err(e) => {
                    log_err!("Persisted scene is unreadable, starting fresh: {}", e);
                    self.toasts.warning("Saved scene could not be loaded");
                }
            }
            self.scene_view.invalidate_all();
        }
        self.session.seed_history();
    }

    // ------------------------------------------------------------------
    //  Edit operations
    // ------------------------------------------------------------------

    fn undo(&mut self) {
        if self.session.undo() {
            self.scene_view.invalidate_all();
            self.scene_view.prune_selection(&self.session.scene);
        }
    }

    fn redo(&mut self) {
        if self.session.redo() {
            self.scene_view.invalidate_all();
            self.scene_view.prune_selection(&self.session.scene);
        }
    }

    fn copy_selection(&mut self) {
        let Some(id) = self.scene_view.selected else {
            return;
        };
        if let Some(obj) = self.session.scene.find(id) {
            self.copied = Some(obj.clone());
            self.paste_turn.reset();
            // Image pixels also go to the system clipboard so they can be
            // pasted into other applications.
            if let SceneObject::Image(img) = obj
                && let Some(px) = img.pixels()
            {
                clipboard::copy_to_system_clipboard(&px);
            }
            self.toasts.info("Copied");
        }
    }

    /// The internal copy wins exactly once per copy; the next paste takes
    /// whatever the system clipboard holds (image or text), after which the
    /// internal copy gets the turn again. An empty system clipboard falls
    /// back to another offset clone.
    fn paste(&mut self) {
        if self.paste_turn.internal_first() && self.paste_internal() {
            self.paste_turn.internal_pasted();
            return;
        }
        if let Some(img) = clipboard::get_from_system_clipboard() {
            match self.session.scene.add_image(img) {
                Ok(id) => {
                    self.scene_view.selected = Some(id);
                    self.session.record_change();
                    self.paste_turn.system_pasted();
                }
                Err(e) => self.toasts.error(format!("Paste failed: {}", e)),
            }
            return;
        }
        if let Some(text) = clipboard::get_text_from_system_clipboard() {
            let id = self
                .session
                .scene
                .add_text(&text, self.style_defaults.clone());
            self.scene_view.selected = Some(id);
            self.session.record_change();
            self.paste_turn.system_pasted();
            return;
        }
        self.paste_internal();
    }

    fn paste_internal(&mut self) -> bool {
        let Some(obj) = &self.copied else {
            return false;
        };
        let mut dup = obj.clone_with_new_id();
        let (x, y) = dup.position();
        dup.set_position(x + PASTE_OFFSET, y + PASTE_OFFSET);
        let id = self.session.scene.insert(dup);
        self.scene_view.selected = Some(id);
        self.session.record_change();
        true
    }

    fn delete_selection(&mut self) {
        let Some(id) = self.scene_view.selected else {
            return;
        };
        if self.session.scene.remove(id) {
            self.scene_view.invalidate(id);
            self.scene_view.selected = None;
            self.session.record_change();
        }
    }

    fn clear_scene(&mut self) {
        self.session.scene.clear_objects();
        self.scene_view.invalidate_all();
        self.scene_view.selected = None;
        self.session.record_change();
        self.session.force_save(&self.store);
        self.toasts.info("Scene cleared");
    }

    fn upload_image(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp", "bmp"])
            .pick_file()
        else {
            return;
        };
        match image::open(&path) {
            Ok(img) => match self.session.scene.add_image(img.into_rgba8()) {
                Ok(id) => {
                    self.scene_view.selected = Some(id);
                    self.session.record_change();
                }
                Err(e) => self.toasts.error(format!("Could not add image: {}", e)),
            },
            Err(e) => {
                log_err!("Failed to open \"{}\": {}", path.display(), e);
                self.toasts.error("Could not read the image file");
            }
        }
    }

    fn download_png(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .set_file_name("thumbnail.png")
            .add_filter("PNG image", &["png"])
            .save_file()
        else {
            return;
        };
        let composed = self.session.scene.render_to_image(&mut self.fonts);
        let result = scene::encode_png(&composed)
            .map_err(|e| e.to_string())
            .and_then(|bytes| std::fs::write(&path, bytes).map_err(|e| e.to_string()));
        match result {
            Ok(()) => {
                log_info!("Exported thumbnail to {}", path.display());
                self.toasts.success("Thumbnail exported");
            }
            Err(e) => {
                log_err!("Export failed: {}", e);
                self.toasts.error("Export failed");
            }
        }
    }

    // ------------------------------------------------------------------
    //  Background jobs
    // ------------------------------------------------------------------

    fn start_enhance(&mut self, lucky: bool) {
        if self.enhance_busy {
            return;
        }
        let scene_png = match self.session.scene.to_data_url(&mut self.fonts) {
            Ok(url) => url,
            Err(e) => {
                log_err!("Could not encode scene for enhancement: {}", e);
                self.toasts.error("Could not encode the scene");
                return;
            }
        };
        let req = EnhanceRequest {
            scene_png,
            video_context: self.ai_panel.video_context.clone(),
            user_prompt: if lucky {
                None
            } else {
                Some(self.ai_panel.prompt.clone())
            },
            is_lucky: lucky,
        };
        self.enhance_busy = true;
        self.enhance_started = Some(std::time::Instant::now());
        let client = self.client.clone();
        let sender = self.job_sender.clone();
        thread::spawn(move || {
            let _ = sender.send(JobResult::Enhanced(client.enhance(&req)));
        });
    }

    fn start_remove_bg(&mut self) {
        if self.remove_bg_busy {
            return;
        }
        let Some(id) = self.scene_view.selected else {
            return;
        };
        let Some(SceneObject::Image(img)) = self.session.scene.find(id) else {
            return;
        };
        let Some(pixels) = img.pixels() else {
            self.toasts.error("The selected image could not be decoded");
            return;
        };
        self.remove_bg_busy = true;
        let lib = self.ai_panel.onnx_paths.library.clone();
        let model = self.ai_panel.onnx_paths.model.clone();
        let sender = self.job_sender.clone();
        thread::spawn(move || {
            let result = remove_bg::remove_background(&lib, &model, &pixels);
            let _ = sender.send(JobResult::BgRemoved {
                object_id: id,
                result,
            });
        });
    }

    fn handle_job(&mut self, job: JobResult) {
        match job {
            JobResult::Enhanced(Ok(data_url)) => {
                self.enhance_busy = false;
                self.enhance_started = None;
                match decode_data_url(&data_url) {
                    Ok(img) => match self.session.scene.replace_with_image(img) {
                        Ok(id) => {
                            self.scene_view.invalidate_all();
                            self.scene_view.selected = Some(id);
                            self.session.record_change();
                            self.toasts.success("Enhancement applied");
                        }
                        Err(e) => {
                            log_err!("Could not install enhanced image: {}", e);
                            self.toasts.error("Enhancement could not be applied");
                        }
                    },
                    Err(e) => {
                        log_err!("Enhanced image failed to decode: {}", e);
                        self.toasts.error("The model returned an unreadable image");
                    }
                }
            }
            JobResult::Enhanced(Err(e)) => {
                self.enhance_busy = false;
                self.enhance_started = None;
                log_err!("Enhancement failed: {}", e);
                self.toasts.error(e.to_string());
                // A missing key is recoverable right here.
                if e == EnhanceError::NotConfigured {
                    self.api_key_dialog.open_with(&self.api_key);
                }
            }
            JobResult::BgRemoved { object_id, result } => {
                self.remove_bg_busy = false;
                match result {
                    Ok(img) => {
                        // The object may have been deleted mid-job.
                        match self.session.scene.replace_object_pixels(object_id, img) {
                            Ok(()) => {
                                self.scene_view.invalidate(object_id);
                                self.session.record_change();
                                self.toasts.success("Background removed");
                            }
                            Err(e) => {
                                log_err!("Background-removal result discarded: {}", e);
                            }
                        }
                    }
                    Err(e) => {
                        log_err!("Background removal failed: {}", e);
                        self.toasts.error(e.to_string());
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    //  Keyboard shortcuts
    // ------------------------------------------------------------------

    /// All shortcuts stay with the focused text widget while one has
    /// keyboard focus; consume_key removes the event from the queue, so
    /// consuming here would otherwise steal Cmd+Z etc. from a TextEdit.
    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        use egui::{Key, Modifiers};

        let modal_open = self.api_key_dialog.open || self.clear_dialog.open;
        if modal_open || ctx.wants_keyboard_input() {
            return;
        }

        let cmd_shift = Modifiers {
            shift: true,
            ..Modifiers::COMMAND
        };
        let redo = ctx.input_mut(|i| {
            i.consume_key(cmd_shift, Key::Z) || i.consume_key(Modifiers::COMMAND, Key::Y)
        });
        if redo {
            self.redo();
        }
        if ctx.input_mut(|i| i.consume_key(Modifiers::COMMAND, Key::Z)) {
            self.undo();
        }

        if ctx.input_mut(|i| i.consume_key(Modifiers::COMMAND, Key::C)) {
            self.copy_selection();
        }
        if ctx.input_mut(|i| i.consume_key(Modifiers::COMMAND, Key::V)) {
            self.paste();
        }

        let delete = ctx.input_mut(|i| {
            i.consume_key(Modifiers::NONE, Key::Delete)
                || i.consume_key(Modifiers::NONE, Key::Backspace)
        });
        if delete {
            self.delete_selection();
        }
    }

    // ------------------------------------------------------------------
    //  Panel event handling
    // ------------------------------------------------------------------

    fn handle_panel_events(&mut self, events: Vec<PanelEvent>) {
        for event in events {
            match event {
                // Visual-only change; textures refresh via the content
                // fingerprint, the history entry lands on EditCommitted.
                PanelEvent::SceneEdited => {}
                PanelEvent::ObjectAdded(id) => self.scene_view.selected = Some(id),
                PanelEvent::EditCommitted => self.session.record_change(),
                PanelEvent::StyleDefaultsChanged => {
                    self.store.save_text_style(&self.style_defaults);
                }
                PanelEvent::UploadImageRequested => self.upload_image(),
                PanelEvent::DeleteRequested => self.delete_selection(),
            }
        }
    }

    fn handle_ai_events(&mut self, events: Vec<AiPanelEvent>) {
        for event in events {
            match event {
                AiPanelEvent::VideoContextChanged => {
                    self.store.save_video_context(&self.ai_panel.video_context);
                }
                AiPanelEvent::EnhanceRequested { lucky } => self.start_enhance(lucky),
                AiPanelEvent::RemoveBackgroundRequested => self.start_remove_bg(),
                AiPanelEvent::ChangeApiKeyRequested => {
                    self.api_key_dialog.open_with(&self.api_key);
                }
                AiPanelEvent::OnnxPathsChanged => {
                    self.store.save_onnx_paths(&self.ai_panel.onnx_paths);
                }
            }
        }
    }

    fn handle_view_events(&mut self, events: Vec<SceneViewEvent>) {
        for event in events {
            match event {
                SceneViewEvent::SelectionChanged => {}
                SceneViewEvent::ObjectMoved => self.session.record_change(),
                // The inspector follows the selection, which the double-click
                // already set.
                SceneViewEvent::TextActivated(_) => {}
            }
        }
    }

    // ------------------------------------------------------------------
    //  Toolbar
    // ------------------------------------------------------------------

    fn show_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("ThumbPop").strong().size(18.0));
            ui.separator();

            let can_undo = self.session.history.can_undo();
            let can_redo = self.session.history.can_redo();
            if ui
                .add_enabled(can_undo, egui::Button::new("⟲ Undo"))
                .clicked()
            {
                self.undo();
            }
            if ui
                .add_enabled(can_redo, egui::Button::new("⟳ Redo"))
                .clicked()
            {
                self.redo();
            }
            ui.separator();

            let has_selection = self.scene_view.selected.is_some();
            if ui
                .add_enabled(has_selection, egui::Button::new("Copy"))
                .clicked()
            {
                self.copy_selection();
            }
            if ui.button("Paste").clicked() {
                self.paste();
            }
            if ui
                .add_enabled(has_selection, egui::Button::new("Delete"))
                .clicked()
            {
                self.delete_selection();
            }
            ui.separator();

            if ui.button("Clear").clicked() {
                self.clear_dialog.open = true;
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("⬇ Download PNG").clicked() {
                    self.download_png();
                }
                if self.session.save_pending() {
                    ui.label(egui::RichText::new("saving…").weak());
                }
            });
        });
    }
}

impl eframe::App for ThumbPopApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Apply the persisted scene once the first frame has created the
        // render surface.
        if !self.restored_from_store && self.session.scene.is_surface_ready() {
            self.restored_from_store = true;
            self.restore_persisted_scene();
        }

        // Drain finished background jobs.
        while let Ok(job) = self.job_receiver.try_recv() {
            self.handle_job(job);
        }

        self.handle_shortcuts(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.add_space(2.0);
            self.show_toolbar(ui);
            ui.add_space(2.0);
        });

        egui::SidePanel::left("object_panel")
            .default_width(260.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    let events = self.left_panel.show(
                        ui,
                        &mut self.session.scene,
                        self.scene_view.selected,
                        &mut self.style_defaults,
                    );
                    self.handle_panel_events(events);
                });
            });

        egui::SidePanel::right("ai_panel")
            .default_width(280.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    let selected_is_image = self
                        .scene_view
                        .selected
                        .and_then(|id| self.session.scene.find(id))
                        .is_some_and(|obj| matches!(obj, SceneObject::Image(_)));
                    let state = AiPanelState {
                        api_key_set: self.client.is_configured(),
                        enhance_busy: self.enhance_busy,
                        enhance_elapsed_secs: self
                            .enhance_started
                            .map_or(0, |t| t.elapsed().as_secs()),
                        remove_bg_busy: self.remove_bg_busy,
                        selected_is_image,
                    };
                    let events = self.ai_panel.show(ui, &state);
                    self.handle_ai_events(events);
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            let events = self
                .scene_view
                .show(ui, &mut self.session.scene, &mut self.fonts);
            self.handle_view_events(events);
        });

        // --- Dialogs ---
        if let Some(key) = self.api_key_dialog.show(ctx) {
            self.client.configure(&key);
            self.api_key = key.clone();
            self.store.save_api_key(&key);
            self.toasts.success("API key saved");
        }
        if self.clear_dialog.show(ctx) {
            self.clear_scene();
        }

        self.toasts.show(ctx);

        // --- Debounced persistence ---
        self.session.flush_if_due(&self.store);
        if self.session.save_pending() || self.enhance_busy || self.remove_bg_busy {
            // Keep frames coming so the save deadline and job completions are
            // observed without further input.
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.session.force_save(&self.store);
        log_info!("Session saved on exit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_copy_wins_once_then_alternates_with_the_clipboard() {
        let mut turn = PasteTurn::default();
        assert!(turn.internal_first());

        turn.internal_pasted();
        assert!(!turn.internal_first());

        // A system-clipboard paste hands the turn back to the internal copy.
        turn.system_pasted();
        assert!(turn.internal_first());
    }

    #[test]
    fn copying_again_rearms_the_internal_clone() {
        let mut turn = PasteTurn::default();
        turn.internal_pasted();
        turn.reset();
        assert!(turn.internal_first());
    }

    #[test]
    fn focused_text_widget_claims_keyboard_input() {
        // Shortcut chords bail out whenever wants_keyboard_input is set, so
        // a focused TextEdit keeps its own Cmd+Z / Cmd+C / Cmd+V handling.
        let ctx = egui::Context::default();
        assert!(!ctx.wants_keyboard_input());

        ctx.memory_mut(|m| m.request_focus(egui::Id::new("prompt_field")));
        assert!(ctx.wants_keyboard_input());

        ctx.memory_mut(|m| m.surrender_focus(egui::Id::new("prompt_field")));
        assert!(!ctx.wants_keyboard_input());
    }
}
