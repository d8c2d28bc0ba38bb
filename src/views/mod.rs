//! Views: the interaction spaces a source is shown and edited in.
//!
//! Each view owns a scene: a camera transform and the ids of the sources
//! attached to it. The nodes themselves stay in the sources; a view only
//! decides which sources it shows, in which order, and which ones can be
//! selected.

pub mod appearance;
pub mod geometry;
pub mod layer;
pub mod mixing;
pub mod transition;

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexSet;
use log::trace;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Session, Source, Transform};

pub use appearance::AppearanceView;
pub use geometry::GeometryView;
pub use layer::LayerView;
pub use mixing::MixingView;
pub use transition::TransitionView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ViewMode {
    Rendering,
    #[default]
    Mixing,
    Geometry,
    Layer,
    Appearance,
    Transition,
}

impl ViewMode {
    /// Views a user can switch to.
    pub const INTERACTIVE: [ViewMode; 4] = [Self::Mixing, Self::Geometry, Self::Layer, Self::Appearance];

    pub fn name(self) -> &'static str {
        match self {
            Self::Rendering => "Rendering",
            Self::Mixing => "Mixing",
            Self::Geometry => "Geometry",
            Self::Layer => "Layer",
            Self::Appearance => "Appearance",
            Self::Transition => "Transition",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Camera and attached sources of one view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub root: Transform,
    /// Sources shown and editable, in draw order.
    pub workspace: IndexSet<Uuid>,
    /// Sources drawn behind the workspace, not editable.
    pub background: IndexSet<Uuid>,
}

impl Scene {
    pub fn attach(&mut self, id: Uuid) {
        self.background.shift_remove(&id);
        self.workspace.insert(id);
    }

    pub fn attach_background(&mut self, id: Uuid) {
        self.workspace.shift_remove(&id);
        self.background.insert(id);
    }

    pub fn detach(&mut self, id: Uuid) {
        self.workspace.shift_remove(&id);
        self.background.shift_remove(&id);
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.workspace.contains(&id) || self.background.contains(&id)
    }

    pub fn clear(&mut self) {
        self.workspace.clear();
        self.background.clear();
    }

    /// Reorder the workspace back to front along z of `mode`.
    pub fn sort_by_depth(&mut self, session: &Session, mode: ViewMode) {
        let z = |id: &Uuid| {
            session
                .find(*id)
                .map(|s| s.group(mode).transform.translation.z)
                .unwrap_or(0.0)
        };
        self.workspace.sort_by(|a, b| z(a).partial_cmp(&z(b)).unwrap_or(Ordering::Equal));
    }
}

/// Behaviour shared by every view.
pub trait View: fmt::Debug + Send {
    fn mode(&self) -> ViewMode;
    fn scene(&self) -> &Scene;
    fn scene_mut(&mut self) -> &mut Scene;

    /// Whether a pick in this view may select `source`.
    fn can_select(&self, source: &Source) -> bool;

    /// Per-frame refresh; `deep` asks for a full pass over the session.
    fn update(&mut self, _dt: f32, session: &Session, deep: bool) {
        if deep {
            let mode = self.mode();
            self.scene_mut().sort_by_depth(session, mode);
        }
    }

    /// Move the camera so that `source` is in the middle.
    fn center_source(&mut self, source: &Source) {
        let mode = self.mode();
        let pos = source.group(mode).transform.translation;
        let root = &mut self.scene_mut().root;
        root.translation.x = -pos.x * root.scale.x;
        root.translation.y = -pos.y * root.scale.y;
        trace!("{} view centered on '{}'", mode, source.name());
    }

    /// Camera to save with the session.
    fn settings(&self) -> Transform {
        self.scene().root
    }

    fn restore_settings(&mut self, root: Transform) {
        self.scene_mut().root = root;
    }
}

/// All views of the mixer, plus the request counter for deep updates.
#[derive(Debug, Default)]
pub struct Views {
    pub mixing: MixingView,
    pub geometry: GeometryView,
    pub layer: LayerView,
    pub appearance: AppearanceView,
    pub transition: TransitionView,
    need_deep_update: u32,
}

impl Views {
    pub fn new() -> Self {
        Self::default()
    }

    /// View for `mode`; the rendering space has no interactive view.
    pub fn get(&self, mode: ViewMode) -> Option<&dyn View> {
        let view: &dyn View = match mode {
            ViewMode::Mixing => &self.mixing,
            ViewMode::Geometry => &self.geometry,
            ViewMode::Layer => &self.layer,
            ViewMode::Appearance => &self.appearance,
            ViewMode::Transition => &self.transition,
            ViewMode::Rendering => return None,
        };
        Some(view)
    }

    pub fn get_mut(&mut self, mode: ViewMode) -> Option<&mut dyn View> {
        let view: &mut dyn View = match mode {
            ViewMode::Mixing => &mut self.mixing,
            ViewMode::Geometry => &mut self.geometry,
            ViewMode::Layer => &mut self.layer,
            ViewMode::Appearance => &mut self.appearance,
            ViewMode::Transition => &mut self.transition,
            ViewMode::Rendering => return None,
        };
        Some(view)
    }

    fn all_mut(&mut self) -> [&mut dyn View; 5] {
        [
            &mut self.mixing as &mut dyn View,
            &mut self.geometry,
            &mut self.layer,
            &mut self.appearance,
            &mut self.transition,
        ]
    }

    /// Attach a source to every interactive view.
    pub fn attach(&mut self, id: Uuid) {
        for view in ViewMode::INTERACTIVE {
            if let Some(v) = self.get_mut(view) {
                v.scene_mut().attach(id);
            }
        }
        self.request_deep_update();
    }

    /// Remove a source from every view, transition included.
    pub fn detach(&mut self, id: Uuid) {
        for v in self.all_mut() {
            v.scene_mut().detach(id);
        }
        self.request_deep_update();
    }

    /// Keep a source only as mixing background.
    pub fn conceal(&mut self, id: Uuid) {
        self.detach(id);
        self.mixing.scene_mut().attach_background(id);
    }

    pub fn is_attached(&self, id: Uuid) -> bool {
        ViewMode::INTERACTIVE
            .iter()
            .filter_map(|m| self.get(*m))
            .any(|v| v.scene().workspace.contains(&id))
    }

    pub fn clear(&mut self) {
        for v in self.all_mut() {
            v.scene_mut().clear();
        }
        self.request_deep_update();
    }

    pub fn request_deep_update(&mut self) {
        self.need_deep_update += 1;
    }

    pub fn need_deep_update(&self) -> u32 {
        self.need_deep_update
    }

    /// Update every view; one pending deep update is served per call.
    pub fn update(&mut self, dt: f32, session: &Session) {
        let deep = self.need_deep_update > 0;
        for v in self.all_mut() {
            v.update(dt, session, deep);
        }
        if deep {
            self.need_deep_update -= 1;
        }
    }

    /// Saved cameras of the session become the live ones.
    pub fn restore(&mut self, session: &Session) {
        for mode in ViewMode::INTERACTIVE {
            let root = session.config(mode);
            if let Some(v) = self.get_mut(mode) {
                v.restore_settings(root);
            }
        }
    }

    /// Live cameras saved into the session.
    pub fn store(&self, session: &mut Session) {
        for mode in ViewMode::INTERACTIVE {
            if let Some(v) = self.get(mode) {
                session.set_config(mode, v.settings());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::entities::SourceKind;
    use glam::Vec3;

    #[test]
    fn test_attach_conceal_detach() {
        let mut views = Views::new();
        let id = Uuid::new_v4();
        views.attach(id);
        assert!(views.is_attached(id));
        assert!(views.layer.scene().workspace.contains(&id));
        assert!(!views.transition.scene().contains(id));

        views.conceal(id);
        assert!(!views.is_attached(id));
        assert!(views.mixing.scene().background.contains(&id));

        views.detach(id);
        assert!(!views.mixing.scene().contains(id));
    }

    #[test]
    fn test_deep_update_counter() {
        let mut views = Views::new();
        let session = Session::default();
        views.request_deep_update();
        views.request_deep_update();
        views.update(16.0, &session);
        assert_eq!(views.need_deep_update(), 1);
        views.update(16.0, &session);
        views.update(16.0, &session);
        assert_eq!(views.need_deep_update(), 0);
    }

    #[test]
    fn test_deep_update_sorts_by_depth() {
        let mut session = Session::default();
        let mut views = Views::new();
        let mut ids = Vec::new();
        for z in [5.0, 3.0, 4.0] {
            let mut s = Source::new(SourceKind::Render, StageConfig::default());
            s.group_mut(ViewMode::Layer).transform.translation.z = z;
            let id = session.add_source(s);
            views.attach(id);
            ids.push(id);
        }
        views.update(16.0, &session);
        let order: Vec<Uuid> = views.layer.scene().workspace.iter().copied().collect();
        assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn test_center_and_restore() {
        let mut session = Session::default();
        let mut views = Views::new();
        let mut s = Source::new(SourceKind::Render, StageConfig::default());
        s.group_mut(ViewMode::Geometry).transform.translation = Vec3::new(0.5, -0.25, 0.0);
        views.geometry.center_source(&s);
        assert_eq!(views.geometry.scene().root.translation, Vec3::new(-0.5, 0.25, 0.0));

        views.store(&mut session);
        views.geometry.restore_settings(Transform::IDENTITY);
        views.restore(&session);
        assert_eq!(views.geometry.scene().root.translation, Vec3::new(-0.5, 0.25, 0.0));
        session.add_source(s);
    }
}
