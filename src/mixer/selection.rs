//! Current source and selection for Mixer.
//!
//! At most one source is current. Making a source current always releases
//! the previous one first: it stays selected when part of a multi-selection,
//! otherwise it leaves the selection.

use indexmap::IndexSet;
use log::trace;
use uuid::Uuid;

use super::Mixer;
use crate::core::mixer_events::CurrentSourceChangedEvent;
use crate::entities::{NodeId, Session, Source, SourceMode};

/// Ordered set of selected source ids. Every change keeps the display
/// mode of the sources involved in step.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    ids: IndexSet<Uuid>,
}

impl Selection {
    pub fn add(&mut self, session: &mut Session, id: Uuid) {
        let Some(source) = session.find_mut(id) else {
            return;
        };
        self.ids.insert(id);
        if source.mode() < SourceMode::Selected {
            source.set_mode(SourceMode::Selected);
        }
    }

    pub fn remove(&mut self, session: &mut Session, id: Uuid) {
        if self.ids.shift_remove(&id)
            && let Some(source) = session.find_mut(id)
        {
            source.set_mode(SourceMode::Visible);
        }
    }

    /// Replace the selection by a single source.
    pub fn set(&mut self, session: &mut Session, id: Uuid) {
        self.clear(session);
        self.add(session, id);
    }

    pub fn toggle(&mut self, session: &mut Session, id: Uuid) {
        if self.contains(id) {
            self.remove(session, id);
        } else {
            self.add(session, id);
        }
    }

    pub fn clear(&mut self, session: &mut Session) {
        for id in self.ids.drain(..) {
            if let Some(source) = session.find_mut(id) {
                source.set_mode(SourceMode::Visible);
            }
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn front(&self) -> Option<Uuid> {
        self.ids.first().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.ids.iter().copied()
    }

    /// Selected ids, in selection order.
    pub fn ids(&self) -> Vec<Uuid> {
        self.ids.iter().copied().collect()
    }
}

impl Mixer {
    // === Current source ===

    /// Make `id` the source under edit. It joins the selection, replacing
    /// it unless it was already selected.
    pub fn set_current_source(&mut self, id: Uuid) {
        if !self.session.contains(id) || self.current == Some(id) {
            return;
        }
        self.unset_current_source();

        if !self.selection.contains(id) {
            self.selection.set(&mut self.session, id);
        }
        if let Some(source) = self.session.find_mut(id) {
            source.set_mode(SourceMode::Current);
            trace!("Current source '{}'", source.name());
        }
        self.current = Some(id);
        self.bus.emit(CurrentSourceChangedEvent(Some(id)));
    }

    pub fn set_current_source_by_name(&mut self, name: &str) {
        if let Some(id) = self.session.find_by_name(name).map(Source::id) {
            self.set_current_source(id);
        }
    }

    /// Current source from a picked node.
    pub fn set_current_source_by_node(&mut self, node: NodeId) {
        if let Some(id) = self.session.find_by_node(node).map(Source::id) {
            self.set_current_source(id);
        }
    }

    pub fn set_current_index(&mut self, index: usize) {
        if let Some(id) = self.session.at(index).map(Source::id) {
            self.set_current_source(id);
        }
    }

    /// Next source in session order, wrapping around.
    pub fn set_current_next(&mut self) {
        let len = self.session.len();
        if len == 0 {
            return;
        }
        let next = self.index_current_source().map_or(0, |i| (i + 1) % len);
        self.set_current_index(next);
    }

    /// Previous source in session order, wrapping around.
    pub fn set_current_previous(&mut self) {
        let len = self.session.len();
        if len == 0 {
            return;
        }
        let prev = match self.index_current_source() {
            Some(i) if i > 0 => i - 1,
            _ => len - 1,
        };
        self.set_current_index(prev);
    }

    pub fn unset_current_source(&mut self) {
        let Some(id) = self.current.take() else {
            return;
        };
        if self.selection.len() > 1 {
            if let Some(source) = self.session.find_mut(id) {
                source.set_mode(SourceMode::Selected);
            }
        } else {
            self.selection.remove(&mut self.session, id);
        }
        self.bus.emit(CurrentSourceChangedEvent(None));
    }

    pub fn current_source(&self) -> Option<&Source> {
        self.current.and_then(|id| self.session.find(id))
    }

    pub fn current_source_id(&self) -> Option<Uuid> {
        self.current
    }

    pub fn index_current_source(&self) -> Option<usize> {
        self.current.and_then(|id| self.session.index_of(id))
    }

    pub fn count_sources(&self) -> usize {
        self.session.len()
    }

    // === Selection ===

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn select(&mut self, id: Uuid) {
        self.selection.add(&mut self.session, id);
    }

    pub fn deselect(&mut self, id: Uuid) {
        if self.current == Some(id) {
            self.unset_current_source();
        }
        self.selection.remove(&mut self.session, id);
    }

    pub fn toggle_selection(&mut self, id: Uuid) {
        if self.selection.contains(id) {
            self.deselect(id);
        } else {
            self.select(id);
        }
    }

    pub fn clear_selection(&mut self) {
        self.unset_current_source();
        self.selection.clear(&mut self.session);
    }
}
