// ============================================================================
// STATE STORE — JSON records under the platform config directory
// ============================================================================
//
// Four singleton records, each its own file, overwritten wholesale:
//   scene_state.json   — serialized scene + background + last-modified
//   text_style.json    — default styling merged into new text objects
//   video_context.json — cached free-text video description for AI prompts
//   api_key.json       — generative-image API credential
//
// Every failure mode (missing file, unreadable file, malformed JSON, full
// disk) degrades to "no prior state" / silent no-op. Failures are logged to
// the session log and never interrupt the user.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::scene::{Color, Snapshot, TextStyle};

const SCENE_FILE: &str = "scene_state.json";
const TEXT_STYLE_FILE: &str = "text_style.json";
const VIDEO_CONTEXT_FILE: &str = "video_context.json";
const API_KEY_FILE: &str = "api_key.json";
const ONNX_PATHS_FILE: &str = "onnx_paths.json";

/// Singleton persisted editor state record.
#[derive(Serialize, Deserialize)]
pub struct PersistedScene {
    /// Serialized scene snapshot (same JSON the history buffer stores).
    pub snapshot: String,
    pub background: Color,
    /// Unix seconds at save time.
    pub last_modified: u64,
}

impl PersistedScene {
    pub fn new(snapshot: &Snapshot, background: Color) -> Self {
        Self {
            snapshot: snapshot.as_str().to_string(),
            background,
            last_modified: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TextRecord {
    value: String,
}

/// Paths to the ONNX Runtime library and the matting model used by
/// background removal.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnnxPaths {
    pub library: String,
    pub model: String,
}

/// Persistent key-value store for editor state. Constructed once at startup
/// and passed by reference to consumers; tests construct one over a temp dir.
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    /// Store rooted at the platform config directory
    /// (`~/.config/thumbpop`, `%APPDATA%\ThumbPop`, `~/Library/Application
    /// Support/ThumbPop`).
    pub fn open_default() -> Self {
        Self::with_root(default_root())
    }

    pub fn with_root(root: PathBuf) -> Self {
        let _ = std::fs::create_dir_all(&root);
        Self { root }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    // -- Scene record --------------------------------------------------------

    pub fn save_scene(&self, record: &PersistedScene) {
        self.write_json(SCENE_FILE, record);
    }

    pub fn load_scene(&self) -> Option<PersistedScene> {
        self.read_json(SCENE_FILE)
    }

    // -- Text style defaults -------------------------------------------------

    pub fn save_text_style(&self, style: &TextStyle) {
        self.write_json(TEXT_STYLE_FILE, style);
    }

    pub fn load_text_style(&self) -> Option<TextStyle> {
        self.read_json(TEXT_STYLE_FILE)
    }

    // -- Video context -------------------------------------------------------

    pub fn save_video_context(&self, context: &str) {
        self.write_json(
            VIDEO_CONTEXT_FILE,
            &TextRecord {
                value: context.to_string(),
            },
        );
    }

    pub fn load_video_context(&self) -> Option<String> {
        self.read_json::<TextRecord>(VIDEO_CONTEXT_FILE)
            .map(|r| r.value)
    }

    // -- API credential ------------------------------------------------------

    pub fn save_api_key(&self, key: &str) {
        self.write_json(
            API_KEY_FILE,
            &TextRecord {
                value: key.to_string(),
            },
        );
    }

    pub fn load_api_key(&self) -> Option<String> {
        self.read_json::<TextRecord>(API_KEY_FILE).map(|r| r.value)
    }

    // -- Background-removal setup --------------------------------------------

    pub fn save_onnx_paths(&self, paths: &OnnxPaths) {
        self.write_json(ONNX_PATHS_FILE, paths);
    }

    pub fn load_onnx_paths(&self) -> Option<OnnxPaths> {
        self.read_json(ONNX_PATHS_FILE)
    }

    // -- Plumbing ------------------------------------------------------------

    fn write_json<T: Serialize>(&self, name: &str, value: &T) {
        let path = self.root.join(name);
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                crate::log_err!("StateStore: serialize {} failed: {}", name, e);
                return;
            }
        };
        if let Err(e) = std::fs::write(&path, json) {
            crate::log_err!("StateStore: write {:?} failed: {}", path, e);
        }
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.root.join(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return None, // absent is the normal first-run case
        };
        match serde_json::from_str(&content) {
            Ok(v) => Some(v),
            Err(e) => {
                crate::log_warn!("StateStore: malformed {:?}, ignoring: {}", path, e);
                None
            }
        }
    }
}

/// Platform config directory plus the app sub-folder.
fn default_root() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("ThumbPop");
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("ThumbPop");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("thumbpop");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("thumbpop");
    }
    PathBuf::from(".").join("thumbpop")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Scene, TextStyle};

    fn temp_store() -> StateStore {
        let dir = std::env::temp_dir().join(format!("thumbpop-test-{}", uuid::Uuid::new_v4()));
        StateStore::with_root(dir)
    }

    #[test]
    fn load_is_absent_on_fresh_store() {
        let store = temp_store();
        assert!(store.load_scene().is_none());
        assert!(store.load_text_style().is_none());
        assert!(store.load_video_context().is_none());
        assert!(store.load_api_key().is_none());
    }

    #[test]
    fn save_then_load_returns_matching_record() {
        let store = temp_store();
        let mut scene = Scene::new();
        scene.background = [12, 34, 56, 255];
        scene.add_text("Title", TextStyle::default());
        let snap = scene.snapshot().unwrap();

        store.save_scene(&PersistedScene::new(&snap, scene.background));
        let loaded = store.load_scene().expect("record should exist");
        assert_eq!(loaded.snapshot, snap.as_str());
        assert_eq!(loaded.background, [12, 34, 56, 255]);
        assert!(loaded.last_modified > 0);
    }

    #[test]
    fn malformed_record_degrades_to_absent() {
        let store = temp_store();
        std::fs::write(store.root().join("scene_state.json"), "{broken").unwrap();
        assert!(store.load_scene().is_none());
    }

    #[test]
    fn text_style_and_small_records_round_trip() {
        let store = temp_store();
        let style = TextStyle {
            font_family: "Arial".to_string(),
            font_size: 72.0,
            ..TextStyle::default()
        };
        store.save_text_style(&style);
        assert_eq!(store.load_text_style().unwrap(), style);

        store.save_video_context("A cooking tutorial");
        assert_eq!(
            store.load_video_context().as_deref(),
            Some("A cooking tutorial")
        );

        store.save_api_key("test-key");
        assert_eq!(store.load_api_key().as_deref(), Some("test-key"));
    }

    #[test]
    fn save_overwrites_wholesale() {
        let store = temp_store();
        store.save_video_context("first");
        store.save_video_context("second");
        assert_eq!(store.load_video_context().as_deref(), Some("second"));
    }
}
