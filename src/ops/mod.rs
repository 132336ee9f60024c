pub mod clipboard;
pub mod enhance;
pub mod remove_bg;
pub mod text;
