// GUI-subsystem binary: no console window is allocated on Windows.
#![windows_subsystem = "windows"]
#![allow(clippy::too_many_arguments)]

mod app;
mod components;
pub mod logger;
mod ops;
mod project;
mod scene;
mod store;

use app::ThumbPopApp;
use eframe::egui;

fn main() -> Result<(), eframe::Error> {
    logger::init();
    crate::log_info!("ThumbPop starting");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1440.0, 860.0])
            .with_min_inner_size([1024.0, 640.0])
            .with_title("ThumbPop"),
        ..Default::default()
    };

    eframe::run_native(
        "ThumbPop",
        options,
        Box::new(|cc| Box::new(ThumbPopApp::new(cc))),
    )
}
