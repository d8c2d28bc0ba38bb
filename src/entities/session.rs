//! Session: ordered, addressable collection of sources.
//!
//! Insertion order is the stacking reference. Sources are keyed by id and
//! every relation between them (clone to origin, member to mixing group)
//! goes through those ids.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use glam::{UVec2, Vec3};
use indexmap::IndexMap;
use log::{debug, trace};
use uuid::Uuid;

use super::framebuffer::FrameBuffer;
use super::mixing_group::{GroupAction, MixingGroup};
use super::node::NodeId;
use super::source::{OriginState, Source, SourceContext};
use super::source_kind::SourceKind;
use super::transform::Transform;
use crate::config::StageConfig;
use crate::views::ViewMode;

pub const DEFAULT_RESOLUTION: UVec2 = UVec2::new(1280, 720);

#[derive(Debug)]
pub struct Session {
    sources: IndexMap<Uuid, Source>,
    mixing_groups: Vec<MixingGroup>,
    /// Saved camera of each view.
    config: HashMap<ViewMode, Transform>,
    frame: FrameBuffer,
    fading: f32,
    filename: Option<PathBuf>,
    stage: StageConfig,
    /// Held while the session is written to disk.
    save_lock: Arc<Mutex<()>>,
    failed: Option<Uuid>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLUTION, StageConfig::default())
    }
}

impl Session {
    pub fn new(resolution: UVec2, stage: StageConfig) -> Self {
        Self {
            sources: IndexMap::new(),
            mixing_groups: Vec::new(),
            config: HashMap::new(),
            frame: FrameBuffer::new(resolution),
            fading: 0.0,
            filename: None,
            stage,
            save_lock: Arc::new(Mutex::new(())),
            failed: None,
        }
    }

    // === Output ===

    pub fn resolution(&self) -> UVec2 {
        self.frame.resolution()
    }

    /// Change the output resolution; render loopbacks fail at next update.
    pub fn set_resolution(&mut self, resolution: UVec2) {
        if resolution != self.frame.resolution() {
            debug!("Session resolution {}x{}", resolution.x, resolution.y);
            self.frame = FrameBuffer::new(resolution);
        }
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn fading(&self) -> f32 {
        self.fading
    }

    pub fn set_fading(&mut self, f: f32) {
        self.fading = f.clamp(0.0, 1.0);
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn set_filename(&mut self, path: Option<PathBuf>) {
        self.filename = path;
    }

    pub fn stage(&self) -> &StageConfig {
        &self.stage
    }

    pub fn save_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.save_lock)
    }

    // === View configuration ===

    /// Saved camera of `view`; the rendering view carries the resolution
    /// in its scale.
    pub fn config(&self, view: ViewMode) -> Transform {
        match (view, self.config.get(&view)) {
            (ViewMode::Rendering, _) => {
                let r = self.resolution().as_vec2();
                Transform { scale: Vec3::new(r.x, r.y, 1.0), ..Transform::IDENTITY }
            }
            (_, Some(t)) => *t,
            (_, None) => Transform::IDENTITY,
        }
    }

    pub fn set_config(&mut self, view: ViewMode, transform: Transform) {
        if view == ViewMode::Rendering {
            let r = transform.scale.truncate().max(glam::Vec2::ONE).as_uvec2();
            self.set_resolution(r);
        } else {
            self.config.insert(view, transform);
        }
    }

    // === Container ===

    /// Add `source` at the end. Ignored if the id is already present.
    pub fn add_source(&mut self, mut source: Source) -> Uuid {
        let id = source.id();
        if self.sources.contains_key(&id) {
            return id;
        }
        let lock = Arc::clone(&self.save_lock);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(origin) = source.origin() {
            match self.sources.get_mut(&origin) {
                Some(o) => o.register_clone(id),
                None => source.detach_origin(),
            }
        }
        // reattach clones inserted before their origin came back
        for other in self.sources.values() {
            if other.origin() == Some(id) {
                source.register_clone(other.id());
            }
        }
        trace!("Session add '{}' ({})", source.name(), id);
        self.sources.insert(id, source);
        id
    }

    /// Take a source out of the session without destroying its relations
    /// to clones. Mixing group membership is dropped.
    pub fn remove_source(&mut self, id: Uuid) -> Option<Source> {
        let lock = Arc::clone(&self.save_lock);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut source = self.sources.shift_remove(&id)?;
        if let Some(group) = source.mixing_group() {
            self.detach_from_group(group, id);
            source.set_mixing_group(None);
        }
        if let Some(origin) = source.origin()
            && let Some(o) = self.sources.get_mut(&origin)
        {
            o.unregister_clone(id);
        }
        Some(source)
    }

    /// Remove a source for good: its clones lose their origin.
    pub fn delete_source(&mut self, id: Uuid) -> Option<Source> {
        let source = self.remove_source(id)?;
        for clone in source.clones() {
            if let Some(c) = self.sources.get_mut(clone) {
                c.detach_origin();
            }
        }
        Some(source)
    }

    /// New clone of source `id`, named after its origin. Cloning a clone
    /// clones its origin; a clone without origin cannot be cloned.
    pub fn clone_source(&self, id: Uuid) -> Option<Source> {
        let s = self.sources.get(&id)?;
        let root = if s.is_clone() { s.origin()? } else { id };
        let origin = self.sources.get(&root)?;
        let mut clone = Source::new(SourceKind::Clone { origin: Some(root) }, self.stage);
        clone.set_name(origin.name());
        Some(clone)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.sources.contains_key(&id)
    }

    pub fn find(&self, id: Uuid) -> Option<&Source> {
        self.sources.get(&id)
    }

    pub fn find_mut(&mut self, id: Uuid) -> Option<&mut Source> {
        self.sources.get_mut(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Source> {
        self.sources.values().find(|s| s.name() == name)
    }

    /// Source owning the node `node`.
    pub fn find_by_node(&self, node: NodeId) -> Option<&Source> {
        self.sources.values().find(|s| s.contains(node))
    }

    pub fn index_of(&self, id: Uuid) -> Option<usize> {
        self.sources.get_index_of(&id)
    }

    pub fn at(&self, index: usize) -> Option<&Source> {
        self.sources.get_index(index).map(|(_, s)| s)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.sources.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Source> {
        self.sources.values_mut()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// `base` if free, else the first free `base2`, `base3`, ...
    /// The source `exclude` does not count as a user of a name.
    pub fn unique_name(&self, base: &str, exclude: Option<Uuid>) -> String {
        let taken = |name: &str| {
            self.sources
                .values()
                .any(|s| Some(s.id()) != exclude && s.name() == name)
        };
        if !taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    // === Mixing groups ===

    pub fn mixing_groups(&self) -> &[MixingGroup] {
        &self.mixing_groups
    }

    pub fn mixing_group(&self, id: Uuid) -> Option<&MixingGroup> {
        self.mixing_groups.iter().find(|g| g.id() == id)
    }

    /// Group the given sources; members leave any previous group.
    /// Needs at least two sources of this session.
    pub fn link(&mut self, ids: &[Uuid]) -> Option<Uuid> {
        let members: Vec<Uuid> = ids.iter().copied().filter(|id| self.contains(*id)).collect();
        if members.len() < 2 {
            return None;
        }
        for id in &members {
            self.unlink_source(*id);
        }
        let group = MixingGroup::new(&members, &mut self.sources);
        let gid = group.id();
        debug!("Linked {} sources in mixing group {}", group.len(), gid);
        self.mixing_groups.push(group);
        Some(gid)
    }

    /// Dissolve a mixing group.
    pub fn unlink(&mut self, group: Uuid) {
        if let Some(pos) = self.mixing_groups.iter().position(|g| g.id() == group) {
            let g = self.mixing_groups.remove(pos);
            for id in g.members() {
                if let Some(s) = self.sources.get_mut(id) {
                    s.set_mixing_group(None);
                }
            }
        }
    }

    /// Take one source out of its mixing group.
    pub fn unlink_source(&mut self, id: Uuid) {
        if let Some(group) = self.sources.get(&id).and_then(Source::mixing_group) {
            self.detach_from_group(group, id);
            if let Some(s) = self.sources.get_mut(&id) {
                s.set_mixing_group(None);
            }
        }
    }

    fn detach_from_group(&mut self, group: Uuid, id: Uuid) {
        let Some(g) = self.mixing_groups.iter_mut().find(|g| g.id() == group) else {
            return;
        };
        g.detach(id, &self.sources);
        // a group of one is no group
        if g.len() < 2 {
            self.unlink(group);
        }
    }

    /// Request a synchronized edit of the group of `source`.
    pub fn set_group_action(&mut self, source: Uuid, action: GroupAction) {
        let Some(group) = self.sources.get(&source).and_then(Source::mixing_group) else {
            return;
        };
        if let Some(g) = self.mixing_groups.iter_mut().find(|g| g.id() == group) {
            g.set_action(source, action);
        }
    }

    // === Frame ===

    /// First source found failed during the last update.
    pub fn failed_source(&self) -> Option<Uuid> {
        self.failed
    }

    fn context(&self, dt: f32) -> SourceContext {
        let mut origins = HashMap::new();
        let mut clone_active = HashSet::new();
        for s in self.sources.values() {
            if s.ready() {
                let frame = s.frame();
                origins.insert(s.id(), OriginState { resolution: frame.resolution(), texture: frame.texture() });
            }
            if s.active()
                && let Some(origin) = s.origin()
            {
                clone_active.insert(origin);
            }
        }
        SourceContext {
            dt,
            origins,
            clone_active,
            output_texture: self.frame.texture(),
            output_resolution: self.frame.resolution(),
        }
    }

    /// Render and update every source, then the mixing groups.
    /// `current` is the source under edit, if any.
    pub fn update(&mut self, dt: f32, current: Option<Uuid>) {
        let ctx = self.context(dt);
        let mut touched = Vec::new();
        for source in self.sources.values_mut() {
            source.render(&ctx);
            source.update(dt, &ctx);
            if source.take_origin_touch()
                && let Some(origin) = source.origin()
            {
                touched.push(origin);
            }
        }
        for origin in touched {
            if let Some(o) = self.sources.get_mut(&origin) {
                o.touch();
            }
        }

        for group in self.mixing_groups.iter_mut() {
            group.update(current, &mut self.sources);
        }

        self.frame.draw(self.frame.texture());
        self.failed = self.sources.values().find(|s| s.failed()).map(Source::id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_source(session: &mut Session, name: &str) -> Uuid {
        let mut s = Source::new(SourceKind::Render, StageConfig::default());
        s.set_name(name);
        session.add_source(s)
    }

    fn clone_of(session: &mut Session, origin: Uuid) -> Uuid {
        let s = Source::new(SourceKind::Clone { origin: Some(origin) }, StageConfig::default());
        session.add_source(s)
    }

    #[test]
    fn test_order_and_lookup() {
        let mut s = Session::default();
        let a = render_source(&mut s, "a");
        let b = render_source(&mut s, "b");
        assert_eq!(s.ids(), vec![a, b]);
        assert_eq!(s.index_of(b), Some(1));
        assert_eq!(s.find_by_name("a").map(Source::id), Some(a));
        let node = s.find(b).unwrap().locker().id;
        assert_eq!(s.find_by_node(node).map(Source::id), Some(b));

        // same id twice is ignored
        let dup = Source::with_id(a, SourceKind::Render, StageConfig::default());
        s.add_source(dup);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_unique_name() {
        let mut s = Session::default();
        render_source(&mut s, "clip");
        assert_eq!(s.unique_name("other", None), "other");
        assert_eq!(s.unique_name("clip", None), "clip2");
        render_source(&mut s, "clip2");
        assert_eq!(s.unique_name("clip", None), "clip3");
        let first = s.find_by_name("clip").unwrap().id();
        assert_eq!(s.unique_name("clip", Some(first)), "clip");
    }

    #[test]
    fn test_delete_origin_detaches_clones() {
        let mut s = Session::default();
        let o = render_source(&mut s, "o");
        let c = clone_of(&mut s, o);
        assert_eq!(s.find(o).unwrap().clones(), &[c]);

        s.update(16.0, None);
        s.update(16.0, None);
        assert!(s.find(c).unwrap().ready());

        s.delete_source(o);
        let clone = s.find(c).unwrap();
        assert_eq!(clone.origin(), None);
        assert_eq!(clone.texture(), crate::entities::framebuffer::TextureId::BLACK);
        // the inert clone keeps updating without trouble
        s.update(16.0, None);
        assert!(s.find(c).is_some());
    }

    #[test]
    fn test_remove_keeps_clone_link() {
        let mut s = Session::default();
        let o = render_source(&mut s, "o");
        let c = clone_of(&mut s, o);
        let origin = s.remove_source(o).unwrap();
        assert_eq!(s.find(c).unwrap().origin(), Some(o));
        s.add_source(origin);
        assert_eq!(s.find(o).unwrap().clones(), &[c]);
    }

    #[test]
    fn test_clone_shares_origin_texture() {
        let mut s = Session::default();
        let o = render_source(&mut s, "o");
        let c = clone_of(&mut s, o);
        s.update(16.0, None);
        s.update(16.0, None);
        s.update(16.0, None);
        let origin_tex = s.find(o).unwrap().frame().texture();
        assert_eq!(s.find(c).unwrap().texture(), origin_tex);
    }

    #[test]
    fn test_clone_of_clone_redirects() {
        let mut s = Session::default();
        let o = render_source(&mut s, "origin");
        let c = s.clone_source(o).unwrap();
        assert_eq!(c.name(), "origin");
        let c = s.add_source(c);
        let cc = s.clone_source(c).unwrap();
        assert_eq!(cc.origin(), Some(o));

        s.delete_source(o);
        assert!(s.clone_source(c).is_none());
    }

    #[test]
    fn test_link_and_shrink() {
        let mut s = Session::default();
        let a = render_source(&mut s, "a");
        let b = render_source(&mut s, "b");
        assert!(s.link(&[a]).is_none());
        let g = s.link(&[a, b]).unwrap();
        assert_eq!(s.find(a).unwrap().mixing_group(), Some(g));

        // removing one leaves a single member: the group dissolves
        s.remove_source(a);
        assert!(s.mixing_groups().is_empty());
        assert_eq!(s.find(b).unwrap().mixing_group(), None);
    }

    #[test]
    fn test_update_group_action() {
        let mut s = Session::default();
        let a = render_source(&mut s, "a");
        let b = render_source(&mut s, "b");
        // c never reaches the stage and stays locked
        let c = render_source(&mut s, "c");
        for (id, x) in [(a, 0.0), (b, 2.0), (c, -2.0)] {
            s.find_mut(id).unwrap().group_mut(ViewMode::Mixing).transform.translation = Vec3::new(x, 0.0, 0.0);
        }
        s.find_mut(a).unwrap().set_depth(5.0);
        s.find_mut(b).unwrap().set_depth(5.0);
        s.update(16.0, None);
        assert!(!s.find(b).unwrap().locked());
        assert!(s.find(c).unwrap().locked());
        s.link(&[a, b, c]);

        s.find_mut(a).unwrap().group_mut(ViewMode::Mixing).transform.translation = Vec3::new(0.0, 1.0, 0.0);
        s.set_group_action(a, GroupAction::GrabAll);
        s.update(16.0, Some(a));
        let p = s.find(b).unwrap().group(ViewMode::Mixing).transform.translation;
        assert_eq!((p.x, p.y), (2.0, 1.0));
        let p = s.find(c).unwrap().group(ViewMode::Mixing).transform.translation;
        assert_eq!((p.x, p.y), (-2.0, 0.0));
        assert!(s.mixing_groups()[0].active());
    }

    #[test]
    fn test_render_loopback_fails_after_resize() {
        let mut s = Session::default();
        let r = render_source(&mut s, "loop");
        s.update(16.0, None);
        assert_eq!(s.failed_source(), None);
        s.set_resolution(UVec2::new(640, 360));
        s.update(16.0, None);
        assert_eq!(s.failed_source(), Some(r));
    }

    #[test]
    fn test_rendering_config_carries_resolution() {
        let mut s = Session::default();
        assert_eq!(s.config(ViewMode::Rendering).scale, Vec3::new(1280.0, 720.0, 1.0));
        let mut t = Transform::IDENTITY;
        t.scale = Vec3::new(800.0, 600.0, 1.0);
        s.set_config(ViewMode::Rendering, t);
        assert_eq!(s.resolution(), UVec2::new(800, 600));
        assert_eq!(s.config(ViewMode::Mixing), Transform::IDENTITY);
    }
}
