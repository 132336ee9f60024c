// ============================================================================
// CLIPBOARD OPERATIONS — OS-level copy/paste via arboard
// ============================================================================

use image::RgbaImage;

/// Write an RGBA image to the system clipboard.
pub fn copy_to_system_clipboard(img: &RgbaImage) {
    // arboard wants ImageData { width, height, bytes: Cow<[u8]> } in RGBA order.
    if let Ok(mut clip) = arboard::Clipboard::new() {
        let data = arboard::ImageData {
            width: img.width() as usize,
            height: img.height() as usize,
            bytes: std::borrow::Cow::Borrowed(img.as_raw()),
        };
        let _ = clip.set_image(data);
    }
}

/// Try to read an image from the system clipboard. Returns None if nothing
/// usable is available. Handles two cases:
///   1. Raw image data (e.g. Print Screen, copied from another image editor).
///   2. Text on the clipboard that happens to be a valid image file path.
pub fn get_from_system_clipboard() -> Option<RgbaImage> {
    if let Ok(mut clip) = arboard::Clipboard::new() {
        if let Ok(img_data) = clip.get_image() {
            if let Some(img) = RgbaImage::from_raw(
                img_data.width as u32,
                img_data.height as u32,
                img_data.bytes.into_owned(),
            ) {
                return Some(img);
            }
        }
    }

    if let Ok(mut clip) = arboard::Clipboard::new() {
        if let Ok(text) = clip.get_text() {
            let path = std::path::Path::new(text.trim());
            if path.is_file() {
                if let Ok(dyn_img) = image::open(path) {
                    return Some(dyn_img.to_rgba8());
                }
            }
        }
    }

    None
}

/// Read plain text from the system clipboard, if any. Paths to image files
/// are handled by `get_from_system_clipboard` first; everything else becomes
/// a text object.
pub fn get_text_from_system_clipboard() -> Option<String> {
    let mut clip = arboard::Clipboard::new().ok()?;
    let text = clip.get_text().ok()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
