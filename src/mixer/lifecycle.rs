//! Source lifecycle for Mixer: insertion, deletion, replacement,
//! concealment and groups.

use std::fmt;

use log::{debug, info, warn};
use uuid::Uuid;

use super::Mixer;
use crate::core::mixer_events::{NotifyEvent, SourceDeletedEvent, SourceInsertedEvent};
use crate::entities::session_io::{SessionLoader, apply_record};
use crate::entities::{FrameBuffer, GroupAction, Session, SessionDocument, Source, SourceKind, SourceRecord};
use crate::utils::text::transliterate;
use crate::views::ViewMode;

/// Consumer of the session output, called after every update.
pub trait FrameGrabber: Send + fmt::Debug {
    fn grab(&mut self, frame: &FrameBuffer, dt: f32);

    /// A finished grabber is dropped after the frame.
    fn finished(&self) -> bool {
        false
    }
}

impl Mixer {
    pub fn add_grabber(&mut self, grabber: Box<dyn FrameGrabber>) {
        debug!("Frame grabber added: {:?}", grabber);
        self.grabbers.push(grabber);
    }

    // === Views ===

    pub(super) fn attach(&mut self, id: Uuid) {
        if let Some(source) = self.session.find_mut(id) {
            source.touch();
        }
        self.views.attach(id);
    }

    pub(super) fn detach(&mut self, id: Uuid) {
        if self.current == Some(id) {
            self.unset_current_source();
        }
        self.selection.remove(&mut self.session, id);
        self.views.detach(id);
    }

    // === Insertion ===

    /// Queue a source; one queued source is inserted per update.
    pub fn add_source(&mut self, source: Source) {
        debug!("Source '{}' queued", source.name());
        self.candidates.push_back(source);
    }

    /// Insert a source now: unique name, default depth and alpha, attached
    /// to every view. With `view`, that view is shown centered on the new
    /// source, which becomes current.
    pub fn insert_source(&mut self, mut source: Source, view: Option<ViewMode>) -> Uuid {
        let name = self.session.unique_name(source.name(), None);
        source.set_name(&name);
        let id = self.session.add_source(source);

        self.views.layer.set_depth(&mut self.session, id, None);
        self.views.mixing.set_alpha(&mut self.session, id, None);
        self.attach(id);

        info!("Source '{}' inserted", name);
        self.store_history(&format!("{} inserted", name));
        self.bus.emit(SourceInsertedEvent { id, name });

        if let Some(mode) = view {
            self.set_view(mode);
            if let (Some(v), Some(s)) = (self.views.get_mut(self.current_view), self.session.find(id)) {
                v.update(0.0, &self.session, true);
                v.center_source(s);
            }
            self.set_current_source(id);
        }
        id
    }

    // === Deletion ===

    /// Delete a source of the session, or a concealed one.
    pub fn delete_source(&mut self, id: Uuid, with_undo: bool) {
        let removed = if let Some(source) = self.stash.shift_remove(&id) {
            self.views.detach(id);
            for clone in source.clones() {
                if let Some(c) = self.session.find_mut(*clone) {
                    c.detach_origin();
                }
            }
            Some(source)
        } else if self.session.contains(id) {
            self.detach(id);
            self.session.delete_source(id)
        } else {
            None
        };
        let Some(source) = removed else {
            return;
        };
        self.session_sources_to_import.retain(|s| *s != id);

        let name = source.name().to_string();
        if with_undo {
            self.store_history(&format!("{} deleted", name));
        }
        self.notify(NotifyEvent::info(format!("Source {} deleted.", name)));
        self.bus.emit(SourceDeletedEvent { id, name });

        if self.views.transition.source() == Some(id) {
            if self.current_view == ViewMode::Transition {
                self.set_view(ViewMode::Mixing);
            } else {
                self.views.transition.detach();
            }
        }
    }

    /// Delete every selected source, clones before origins.
    pub fn delete_selection(&mut self) {
        let mut ids = self.selection.ids();
        if ids.is_empty() {
            return;
        }
        ids.sort_by_key(|id| !self.session.find(*id).is_some_and(Source::is_clone));
        let count = ids.len();
        for id in ids {
            self.delete_source(id, false);
        }
        self.store_history(&format!("{} sources deleted", count));
    }

    // === Edition ===

    /// Rename keeping names unique; an empty name falls back to a default.
    pub fn rename_source(&mut self, id: Uuid, name: &str) {
        let Some(old) = self.session.find(id).map(|s| s.name().to_string()) else {
            return;
        };
        // uniqueness is checked on the normalized form
        let name = match transliterate(name.trim()) {
            n if n.is_empty() => "Source".to_string(),
            n => n,
        };
        let name = self.session.unique_name(&name, Some(id));
        if name == old {
            return;
        }
        if let Some(source) = self.session.find_mut(id) {
            source.set_name(&name);
        }
        self.store_history(&format!("{} renamed {}", old, name));
    }

    /// Put `to` in place of source `from`: same name and placement in
    /// every view. Returns false if `from` is unknown.
    pub fn replace_source(&mut self, from: Uuid, mut to: Source) -> bool {
        let Some(old) = self.session.find(from) else {
            return false;
        };
        to.set_name(old.name());
        for view in ViewMode::INTERACTIVE {
            to.group_mut(view).transform.copy_placement(&old.group(view).transform);
        }
        let was_current = self.current == Some(from);
        let name = old.name().to_string();

        self.detach(from);
        self.session.delete_source(from);
        let id = self.session.add_source(to);
        self.attach(id);
        if was_current {
            self.set_current_source(id);
        }
        self.store_history(&format!("{} replaced", name));
        true
    }

    /// Rebuild a source from its own record, keeping its id. Used once per
    /// source to recover from a failure.
    pub fn recreate_source(&mut self, id: Uuid) -> bool {
        let Some(old) = self.session.find(id) else {
            return false;
        };
        let record = match SourceRecord::from_source(old, &self.session) {
            Ok(r) => r,
            Err(e) => {
                warn!("Cannot describe '{}' for recreation: {}", old.name(), e);
                return false;
            }
        };
        let origin = old.origin();
        let is_clone = old.is_clone();
        let members = old
            .mixing_group()
            .and_then(|g| self.session.mixing_group(g))
            .map(|g| g.members().to_vec());

        let mut fresh = if is_clone {
            Source::with_id(id, SourceKind::Clone { origin }, self.settings.stage)
        } else {
            let loader = SessionLoader::new(&mut self.session, self.streams.as_ref());
            match loader.create(&record, id) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Cannot recreate '{}': {}", record.name, e);
                    return false;
                }
            }
        };
        apply_record(&mut fresh, &record, self.streams.as_ref());
        fresh.mark_recreated();

        let was_current = self.current == Some(id);
        self.detach(id);
        self.session.remove_source(id);
        self.session.add_source(fresh);
        self.attach(id);
        if let Some(members) = members {
            self.session.link(&members);
        }
        if was_current {
            self.set_current_source(id);
        }
        info!("Source '{}' recreated", record.name);
        true
    }

    // === Concealment ===

    /// Take a source out of the session, keeping it as mixing background.
    pub fn conceal(&mut self, id: Uuid) {
        if self.stash.contains_key(&id) || !self.session.contains(id) {
            return;
        }
        self.detach(id);
        if let Some(source) = self.session.remove_source(id) {
            debug!("Source '{}' concealed", source.name());
            self.stash.insert(id, source);
            self.views.conceal(id);
        }
    }

    pub fn uncover(&mut self, id: Uuid) {
        let Some(source) = self.stash.shift_remove(&id) else {
            return;
        };
        debug!("Source '{}' uncovered", source.name());
        self.views.detach(id);
        self.session.add_source(source);
        self.attach(id);
    }

    pub fn concealed(&self, id: Uuid) -> bool {
        self.stash.contains_key(&id)
    }

    // === Groups ===

    /// Replace the selected sources by one group source holding them.
    /// The group takes the depth of the last selected source and sits at
    /// the center of the mixing view.
    pub fn group_selection(&mut self) -> Option<Uuid> {
        let ids = self.selection.ids();
        let last = *ids.last()?;
        let depth = self.session.find(last)?.depth();

        let records = ids
            .iter()
            .filter_map(|id| self.session.find(*id))
            .map(|s| SourceRecord::from_source(s, &self.session))
            .collect::<Result<Vec<_>, _>>();
        let records = match records {
            Ok(r) => r,
            Err(e) => {
                warn!("Cannot group selection: {}", e);
                return None;
            }
        };

        let stage = self.settings.stage;
        let mut inner = Session::new(self.session.resolution(), stage);
        SessionLoader::new(&mut inner, self.streams.as_ref()).load(&records);

        let mut sorted = ids;
        sorted.sort_by_key(|id| !self.session.find(*id).is_some_and(Source::is_clone));
        for id in sorted {
            self.detach(id);
            self.session.delete_source(id);
        }

        let mut group = Source::new(SourceKind::SessionGroup { session: Box::new(inner) }, stage);
        let name = self.session.unique_name("Group", None);
        group.set_name(&name);
        group.set_depth(depth);
        let mixing = &mut group.group_mut(ViewMode::Mixing).transform.translation;
        mixing.x = 0.0;
        mixing.y = 0.0;

        let id = self.session.add_source(group);
        self.attach(id);
        self.store_history(&format!("{} created", name));
        self.bus.emit(SourceInsertedEvent { id, name });
        self.set_current_source(id);
        Some(id)
    }

    /// Link the selected sources in a mixing group.
    pub fn link_selection(&mut self) -> Option<Uuid> {
        let group = self.session.link(&self.selection.ids())?;
        self.store_history("Sources linked");
        Some(group)
    }

    /// Dissolve mixing group `group`.
    pub fn unlink(&mut self, group: Uuid) {
        if self.session.mixing_group(group).is_some() {
            self.session.unlink(group);
            self.store_history("Sources unlinked");
        }
    }

    /// Synchronized edit of the mixing group of `source`.
    pub fn set_group_action(&mut self, source: Uuid, action: GroupAction) {
        self.session.set_group_action(source, action);
    }

    // === History ===

    pub(super) fn store_history(&mut self, label: &str) {
        match SessionDocument::from_session(&self.session) {
            Ok(doc) => self.history.store(label, doc),
            Err(e) => warn!("History step '{}' not recorded: {}", label, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::UVec2;

    use crate::entities::SourceKind;
    use crate::mixer::tests::{mixer, render_source};
    use crate::views::{View, ViewMode};

    #[test]
    fn test_insert_file_source() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clip.mp4");
        std::fs::write(&path, b"not really a video").unwrap();

        let mut m = mixer();
        let source = m.create_source_file(&path).unwrap();
        assert_eq!(source.name(), "clip");
        let id = m.insert_source(source, Some(ViewMode::Mixing));

        assert!(m.views().is_attached(id));
        for mode in ViewMode::INTERACTIVE {
            assert!(m.views().get(mode).unwrap().scene().workspace.contains(&id));
        }
        assert_eq!(m.current_source().map(|s| s.id()), Some(id));
        assert_eq!(m.history().current(), Some("clip inserted"));
        let depth = m.session().find(id).unwrap().depth();
        assert!((depth - 2.25).abs() < 1e-5);
    }

    #[test]
    fn test_rename_keeps_names_unique() {
        let mut m = mixer();
        let a = m.insert_source(render_source("base"), None);
        let b = m.insert_source(render_source("base"), None);
        let c = m.insert_source(render_source("base"), None);
        let names: Vec<&str> = m.session().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["base", "base2", "base3"]);

        m.rename_source(b, "base");
        assert_eq!(m.session().find(b).unwrap().name(), "base2");
        m.rename_source(c, "  ");
        assert_eq!(m.session().find(c).unwrap().name(), "Source");
        m.rename_source(a, "Source");
        assert_eq!(m.session().find(a).unwrap().name(), "Source2");
    }

    #[test]
    fn test_delete_selection_clones_first() {
        let mut m = mixer();
        let origin = m.create_source_pattern(1, UVec2::new(16, 16));
        let o = m.insert_source(origin, None);
        let clone = m.session().clone_source(o).unwrap();
        let c = m.insert_source(clone, None);
        m.select(o);
        m.select(c);

        m.delete_selection();
        assert!(m.session().is_empty());
        assert!(m.selection().is_empty());
        assert!(!m.views().is_attached(o));
        assert!(!m.views().is_attached(c));
    }

    #[test]
    fn test_replace_keeps_placement() {
        let mut m = mixer();
        let a = m.insert_source(render_source("a"), None);
        m.session_mut().find_mut(a).unwrap().group_mut(ViewMode::Geometry).transform.translation.x = 0.4;
        m.set_current_source(a);

        let pattern = m.create_source_pattern(2, UVec2::new(16, 16));
        let new_id = pattern.id();
        assert!(m.replace_source(a, pattern));
        assert!(!m.session().contains(a));
        let s = m.session().find(new_id).unwrap();
        assert_eq!(s.name(), "a");
        assert!(matches!(s.kind(), SourceKind::Pattern { .. }));
        assert_eq!(s.group(ViewMode::Geometry).transform.translation.x, 0.4);
        assert_eq!(m.current_source_id(), Some(new_id));
        assert!(!m.replace_source(a, render_source("x")));
    }

    #[test]
    fn test_conceal_uncover() {
        let mut m = mixer();
        let a = m.insert_source(render_source("a"), None);
        m.set_current_source(a);

        m.conceal(a);
        assert!(m.concealed(a));
        assert!(!m.session().contains(a));
        assert!(m.current_source().is_none());
        assert!(!m.views().is_attached(a));
        assert!(m.views().mixing.scene().background.contains(&a));

        m.uncover(a);
        assert!(!m.concealed(a));
        assert!(m.session().contains(a));
        assert!(m.views().is_attached(a));
        assert!(m.views().mixing.scene().background.is_empty());
    }

    #[test]
    fn test_delete_concealed() {
        let mut m = mixer();
        let a = m.insert_source(render_source("a"), None);
        m.conceal(a);
        m.delete_source(a, true);
        assert!(!m.concealed(a));
        assert!(!m.views().mixing.scene().contains(a));
        assert_eq!(m.history().current(), Some("a deleted"));
    }

    #[test]
    fn test_group_selection() {
        let mut m = mixer();
        let pa = m.create_source_pattern(0, UVec2::new(16, 16));
        let pb = m.create_source_pattern(1, UVec2::new(16, 16));
        let a = m.insert_source(pa, None);
        let b = m.insert_source(pb, None);
        m.select(a);
        m.select(b);
        let depth_b = m.session().find(b).unwrap().depth();

        let g = m.group_selection().unwrap();
        assert_eq!(m.session().len(), 1);
        let group = m.session().find(g).unwrap();
        assert_eq!(group.name(), "Group");
        assert!((group.depth() - depth_b).abs() < 1e-5);
        assert_eq!(group.group(ViewMode::Mixing).transform.translation.truncate(), glam::Vec2::ZERO);
        let inner = group.kind().session().unwrap();
        assert_eq!(inner.len(), 2);
        assert!(inner.contains(a) && inner.contains(b));
        assert_eq!(m.current_source_id(), Some(g));
    }

    #[test]
    fn test_link_unlink_selection() {
        let mut m = mixer();
        let a = m.insert_source(render_source("a"), None);
        assert!(m.link_selection().is_none());
        let b = m.insert_source(render_source("b"), None);
        m.select(a);
        m.select(b);

        let g = m.link_selection().unwrap();
        assert_eq!(m.session().mixing_groups().len(), 1);
        assert_eq!(m.session().find(a).unwrap().mixing_group(), Some(g));
        m.unlink(g);
        assert!(m.session().mixing_groups().is_empty());
    }
}
