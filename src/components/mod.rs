pub mod ai_panel;
pub mod dialogs;
pub mod history;
pub mod left_panel;
pub mod scene_view;
pub mod toast;
