use std::time::{Duration, Instant};

use eframe::egui;
use egui::{Align2, Color32};

const TOAST_LIFETIME: Duration = Duration::from_secs(4);

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Warning,
    Error,
}

struct Toast {
    kind: ToastKind,
    text: String,
    created: Instant,
}

/// Transient notification stack drawn in the bottom-right corner. Errors from
/// worker jobs and save/export confirmations surface here instead of modal
/// dialogs.
#[derive(Default)]
pub struct Toasts {
    items: Vec<Toast>,
}

impl Toasts {
    pub fn info(&mut self, text: impl Into<String>) {
        self.push(ToastKind::Info, text.into());
    }

    pub fn success(&mut self, text: impl Into<String>) {
        self.push(ToastKind::Success, text.into());
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.push(ToastKind::Warning, text.into());
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(ToastKind::Error, text.into());
    }

    fn push(&mut self, kind: ToastKind, text: String) {
        if kind == ToastKind::Error {
            crate::log_warn!("Toast error: {}", text);
        }
        self.items.push(Toast {
            kind,
            text,
            created: Instant::now(),
        });
    }

    pub fn show(&mut self, ctx: &egui::Context) {
        self.items.retain(|t| t.created.elapsed() < TOAST_LIFETIME);
        if self.items.is_empty() {
            return;
        }
        // Keep repainting so expired toasts disappear without user input.
        ctx.request_repaint_after(Duration::from_millis(250));

        egui::Area::new(egui::Id::new("toast_stack"))
            .anchor(Align2::RIGHT_BOTTOM, [-12.0, -12.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                ui.vertical(|ui| {
                    for toast in self.items.iter().rev() {
                        let (accent, icon) = match toast.kind {
                            ToastKind::Info => (Color32::from_rgb(96, 156, 255), "ℹ"),
                            ToastKind::Success => (Color32::from_rgb(80, 190, 110), "✔"),
                            ToastKind::Warning => (Color32::from_rgb(235, 180, 70), "⚠"),
                            ToastKind::Error => (Color32::from_rgb(230, 90, 90), "⚠"),
                        };
                        egui::Frame::popup(ui.style())
                            .fill(ui.visuals().extreme_bg_color)
                            .stroke(egui::Stroke::new(1.0, accent))
                            .show(ui, |ui| {
                                ui.horizontal(|ui| {
                                    ui.colored_label(accent, icon);
                                    ui.label(&toast.text);
                                });
                            });
                        ui.add_space(4.0);
                    }
                });
            });
    }
}
