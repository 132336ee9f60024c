// ============================================================================
// HISTORY — bounded, linear undo/redo log of serialized scene snapshots
// ============================================================================

use crate::scene::Snapshot;

/// Default number of retained snapshots.
pub const DEFAULT_CAPACITY: usize = 50;

/// Linear undo/redo history. One "current" index; pushing while not at the
/// end discards the redo branch; the oldest entry is evicted once capacity is
/// exceeded.
///
/// The re-entrancy guard (ignoring captures triggered by applying a
/// historical snapshot) lives on the session, not here — see
/// [`crate::project::EditorSession`].
pub struct History {
    entries: Vec<Snapshot>,
    /// Index of the current entry. Only meaningful when `entries` is
    /// non-empty; always `entries.len() - 1` immediately after a push.
    cursor: usize,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            entries: Vec::new(),
            cursor: 0,
            capacity,
        }
    }

    /// Record a new snapshot as the current state.
    pub fn push(&mut self, snapshot: Snapshot) {
        // Discard the redo branch when not at the end
        if !self.entries.is_empty() && self.cursor + 1 < self.entries.len() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(snapshot);

        if self.entries.len() > self.capacity {
            // Eviction shifts every index down by one, so the cursor already
            // points at the appended entry — do not increment it again.
            self.entries.remove(0);
        } else {
            self.cursor = self.entries.len() - 1;
        }
        debug_assert_eq!(self.cursor, self.entries.len() - 1);
    }

    /// Step back one entry and return the snapshot to restore. No-op at the
    /// earliest retained state.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(&self.entries[self.cursor])
    }

    /// Step forward one entry and return the snapshot to restore. No-op at
    /// the latest state.
    pub fn redo(&mut self) -> Option<&Snapshot> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(&self.entries[self.cursor])
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty() && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.entries.is_empty() && self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(tag: usize) -> Snapshot {
        Snapshot::from_json(format!("{{\"tag\":{}}}", tag))
    }

    #[test]
    fn undo_redo_round_trip_is_bit_identical() {
        let mut h = History::new(50);
        h.push(snap(1));
        h.push(snap(2));

        let before = snap(2);
        let undone = h.undo().unwrap().clone();
        assert_eq!(undone, snap(1));
        let redone = h.redo().unwrap().clone();
        assert_eq!(redone, before);
    }

    #[test]
    fn push_after_undo_discards_redo_branch() {
        let mut h = History::new(50);
        h.push(snap(1));
        h.push(snap(2));
        h.push(snap(3));

        h.undo();
        assert!(h.can_redo());
        h.push(snap(4));
        assert!(!h.can_redo());
        assert_eq!(h.len(), 3); // 1, 2, 4
        assert_eq!(h.undo().unwrap(), &snap(2));
    }

    #[test]
    fn capacity_evicts_oldest_and_keeps_cursor_consistent() {
        let cap = 50;
        let mut h = History::new(cap);
        for i in 0..(cap + 25) {
            h.push(snap(i));
        }
        assert_eq!(h.len(), cap);
        assert!(h.can_undo());
        assert!(!h.can_redo());

        // Walk all the way back: exactly cap-1 undos, landing on the oldest
        // retained entry (entry 25).
        let mut steps = 0;
        let mut last = None;
        while h.can_undo() {
            last = h.undo().cloned();
            steps += 1;
        }
        assert_eq!(steps, cap - 1);
        assert_eq!(last.unwrap(), snap(25));
        assert!(!h.can_undo());
        assert!(h.can_redo());
    }

    #[test]
    fn undo_at_start_and_redo_at_end_are_no_ops() {
        let mut h = History::new(50);
        assert!(h.undo().is_none());
        assert!(h.redo().is_none());

        h.push(snap(1));
        assert!(h.undo().is_none());
        assert!(h.redo().is_none());
        assert!(!h.can_undo());
        assert!(!h.can_redo());
    }

    #[test]
    fn can_undo_iff_cursor_past_zero() {
        let mut h = History::new(3);
        h.push(snap(0));
        assert!(!h.can_undo());
        h.push(snap(1));
        assert!(h.can_undo());
        h.undo();
        assert!(!h.can_undo());
    }
}
