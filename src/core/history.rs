//! Undo history: labelled snapshots of the session document.
//!
//! Each stored step is the full state after an action. The cursor points
//! at the state currently shown; undo and redo move it and hand back the
//! snapshot to restore. Storing after an undo drops the redo branch.

use log::debug;

use crate::entities::SessionDocument;

/// Steps kept before the oldest ones are dropped.
pub const MAX_STEPS: usize = 100;

#[derive(Debug, Clone)]
pub struct Step {
    pub label: String,
    pub document: SessionDocument,
}

#[derive(Debug)]
pub struct History {
    steps: Vec<Step>,
    cursor: usize,
    max_steps: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(MAX_STEPS)
    }
}

impl History {
    pub fn new(max_steps: usize) -> Self {
        Self { steps: Vec::new(), cursor: 0, max_steps: max_steps.max(2) }
    }

    /// Record the state reached after `label`.
    pub fn store(&mut self, label: impl Into<String>, document: SessionDocument) {
        let label = label.into();
        if !self.steps.is_empty() {
            self.steps.truncate(self.cursor + 1);
        }
        debug!("History: {}", label);
        self.steps.push(Step { label, document });
        if self.steps.len() > self.max_steps {
            let excess = self.steps.len() - self.max_steps;
            self.steps.drain(..excess);
        }
        self.cursor = self.steps.len() - 1;
    }

    /// Step back; returns the state to restore.
    pub fn undo(&mut self) -> Option<&Step> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.steps.get(self.cursor)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self) -> Option<&Step> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.steps.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.steps.len()
    }

    /// Label of the state currently shown.
    pub fn current(&self) -> Option<&str> {
        self.steps.get(self.cursor).map(|s| s.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Session;

    fn doc(fading: f32) -> SessionDocument {
        let mut session = Session::default();
        session.set_fading(fading);
        SessionDocument::from_session(&session).unwrap()
    }

    #[test]
    fn test_undo_redo_walk() {
        let mut h = History::default();
        assert!(h.undo().is_none());
        h.store("start", doc(0.0));
        h.store("a", doc(0.1));
        h.store("b", doc(0.2));

        assert_eq!(h.undo().map(|s| s.label.clone()), Some("a".into()));
        assert_eq!(h.undo().map(|s| s.document.fading), Some(0.0));
        assert!(h.undo().is_none());
        assert_eq!(h.redo().map(|s| s.label.clone()), Some("a".into()));
        assert_eq!(h.current(), Some("a"));
    }

    #[test]
    fn test_store_drops_redo_branch() {
        let mut h = History::default();
        h.store("start", doc(0.0));
        h.store("a", doc(0.1));
        h.undo();
        h.store("c", doc(0.3));
        assert!(!h.can_redo());
        assert_eq!(h.len(), 2);
        assert_eq!(h.current(), Some("c"));
    }

    #[test]
    fn test_bounded() {
        let mut h = History::new(3);
        for i in 0..5 {
            h.store(format!("s{i}"), doc(0.0));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.current(), Some("s4"));
        h.undo();
        h.undo();
        assert!(!h.can_undo());
        assert_eq!(h.current(), Some("s2"));
    }
}
