use std::time::{Duration, Instant};

use crate::components::history::History;
use crate::scene::Scene;
use crate::store::{PersistedScene, StateStore};

/// Edits made less than this long ago are not yet written to disk; the timer
/// restarts on every new edit (trailing debounce).
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Whether the session is currently applying a history snapshot. Mutations
/// observed while restoring must not create new history entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreState {
    Idle,
    Restoring,
}

/// The open editing session: the live scene, its undo history, and the
/// debounced persistence slot. The app records a change after every mutation
/// it makes through the scene; undo/redo replay snapshots with the restore
/// guard held.
pub struct EditorSession {
    pub scene: Scene,
    pub history: History,
    restore: RestoreState,
    pending_save: Option<Instant>,
}

impl EditorSession {
    pub fn new() -> Self {
        Self {
            scene: Scene::new(),
            history: History::default(),
            restore: RestoreState::Idle,
            pending_save: None,
        }
    }

    pub fn is_restoring(&self) -> bool {
        self.restore == RestoreState::Restoring
    }

    /// Record the current scene as a new history entry and arm the save
    /// timer. No-op while a snapshot is being applied.
    pub fn record_change(&mut self) {
        if self.restore == RestoreState::Restoring {
            return;
        }
        match self.scene.snapshot() {
            Ok(snap) => self.history.push(snap),
            Err(e) => {
                crate::log_err!("Failed to snapshot scene for history: {}", e);
                return;
            }
        }
        self.pending_save = Some(Instant::now() + SAVE_DEBOUNCE);
    }

    /// Seed the history with the current scene without arming the save
    /// timer. Used for the initial state and right after a restore-from-disk.
    pub fn seed_history(&mut self) {
        self.history.clear();
        match self.scene.snapshot() {
            Ok(snap) => self.history.push(snap),
            Err(e) => crate::log_err!("Failed to snapshot scene: {}", e),
        }
    }

    pub fn undo(&mut self) -> bool {
        let Some(snap) = self.history.undo().cloned() else {
            return false;
        };
        self.apply_snapshot_guarded(&snap)
    }

    pub fn redo(&mut self) -> bool {
        let Some(snap) = self.history.redo().cloned() else {
            return false;
        };
        self.apply_snapshot_guarded(&snap)
    }

    fn apply_snapshot_guarded(&mut self, snap: &crate::scene::Snapshot) -> bool {
        self.restore = RestoreState::Restoring;
        let applied = match self.scene.restore(snap) {
            Ok(()) => true,
            Err(e) => {
                // Parse failed before any mutation; the live scene is intact.
                crate::log_err!("Failed to apply history snapshot: {}", e);
                false
            }
        };
        self.restore = RestoreState::Idle;
        if applied {
            self.pending_save = Some(Instant::now() + SAVE_DEBOUNCE);
        }
        applied
    }

    pub fn save_pending(&self) -> bool {
        self.pending_save.is_some()
    }

    /// Write the scene to the store if the debounce deadline has passed.
    /// Called once per frame.
    pub fn flush_if_due(&mut self, store: &StateStore) {
        if let Some(deadline) = self.pending_save {
            if Instant::now() >= deadline {
                self.force_save(store);
            }
        }
    }

    /// Write the scene to the store immediately, cancelling any pending
    /// debounce. Used by clear-canvas and shutdown.
    pub fn force_save(&mut self, store: &StateStore) {
        self.pending_save = None;
        match self.scene.snapshot() {
            Ok(snap) => store.save_scene(&PersistedScene::new(&snap, self.scene.background)),
            Err(e) => crate::log_err!("Failed to snapshot scene for save: {}", e),
        }
    }
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::TextStyle;

    fn temp_store() -> StateStore {
        let dir =
            std::env::temp_dir().join(format!("thumbpop-session-test-{}", uuid::Uuid::new_v4()));
        StateStore::with_root(dir)
    }

    #[test]
    fn record_change_arms_the_save_timer() {
        let mut session = EditorSession::new();
        session.seed_history();
        assert!(!session.save_pending());

        session.scene.add_text("Hello", TextStyle::default());
        session.record_change();
        assert!(session.save_pending());
        assert_eq!(session.history.len(), 2);
    }

    #[test]
    fn undo_redo_round_trip_restores_objects() {
        let mut session = EditorSession::new();
        session.seed_history();

        session.scene.add_text("One", TextStyle::default());
        session.record_change();
        session.scene.add_text("Two", TextStyle::default());
        session.record_change();
        assert_eq!(session.scene.object_count(), 2);

        assert!(session.undo());
        assert_eq!(session.scene.object_count(), 1);
        assert!(session.undo());
        assert_eq!(session.scene.object_count(), 0);
        assert!(!session.undo());

        assert!(session.redo());
        assert!(session.redo());
        assert_eq!(session.scene.object_count(), 2);
        assert!(!session.redo());
    }

    #[test]
    fn flush_is_a_noop_before_the_deadline() {
        let store = temp_store();
        let mut session = EditorSession::new();
        session.scene.add_text("Hi", TextStyle::default());
        session.record_change();

        session.flush_if_due(&store);
        assert!(session.save_pending());
        assert!(store.load_scene().is_none());
    }

    #[test]
    fn force_save_writes_immediately_and_clears_the_timer() {
        let store = temp_store();
        let mut session = EditorSession::new();
        session.scene.background = [10, 20, 30, 255];
        session.scene.add_text("Hi", TextStyle::default());
        session.record_change();

        session.force_save(&store);
        assert!(!session.save_pending());
        let persisted = store.load_scene().expect("scene record written");
        assert_eq!(persisted.background, [10, 20, 30, 255]);
    }

    #[test]
    fn a_second_edit_reschedules_the_save_so_only_one_write_lands() {
        let store = temp_store();
        let mut session = EditorSession::new();
        session.scene.add_text("One", TextStyle::default());
        session.record_change();
        let first_deadline = session.pending_save.expect("timer armed");

        std::thread::sleep(Duration::from_millis(15));
        session.scene.add_text("Two", TextStyle::default());
        session.record_change();
        let second_deadline = session.pending_save.expect("timer re-armed");
        assert!(second_deadline > first_deadline);

        // Quiet period over: the first flush writes, and a later frame's
        // flush has nothing pending so it must not write again.
        session.pending_save = Some(Instant::now() - Duration::from_millis(1));
        session.flush_if_due(&store);
        assert!(!session.save_pending());
        assert!(store.load_scene().is_some());

        std::fs::remove_file(store.root().join("scene_state.json")).expect("record on disk");
        session.flush_if_due(&store);
        assert!(store.load_scene().is_none());
    }

    #[test]
    fn record_change_is_suppressed_while_restoring() {
        let mut session = EditorSession::new();
        session.seed_history();
        session.scene.add_text("One", TextStyle::default());
        session.record_change();
        let len_before = session.history.len();

        // Undo replays a snapshot; any record_change fired by mutation
        // observers during the replay must not grow the history.
        assert!(session.undo());
        session.restore = RestoreState::Restoring;
        session.record_change();
        session.restore = RestoreState::Idle;
        assert_eq!(session.history.len(), len_before);
    }
}
