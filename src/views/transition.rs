//! Transition view: fades a session source in before it becomes the session.

use uuid::Uuid;

use super::{Scene, View, ViewMode};
use crate::entities::{Session, Source};

/// Default transition length, in milliseconds.
pub const DEFAULT_DURATION_MS: f32 = 1000.0;

#[derive(Debug)]
pub struct TransitionView {
    scene: Scene,
    /// Session source being faded in.
    source: Option<Uuid>,
    /// 0 at start, 1 when done.
    progress: f32,
    duration: f32,
}

impl Default for TransitionView {
    fn default() -> Self {
        Self { scene: Scene::default(), source: None, progress: 0.0, duration: DEFAULT_DURATION_MS }
    }
}

impl TransitionView {
    /// Start a transition towards the session held by source `id`.
    pub fn attach(&mut self, id: Uuid) {
        self.scene.clear();
        self.scene.attach(id);
        self.source = Some(id);
        self.progress = 0.0;
    }

    /// End the transition, handing back the session source if any.
    pub fn detach(&mut self) -> Option<Uuid> {
        self.scene.clear();
        self.progress = 0.0;
        self.source.take()
    }

    pub fn source(&self) -> Option<Uuid> {
        self.source
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn finished(&self) -> bool {
        self.source.is_some() && self.progress >= 1.0
    }

    pub fn set_duration(&mut self, ms: f32) {
        self.duration = ms.max(1.0);
    }
}

impl View for TransitionView {
    fn mode(&self) -> ViewMode {
        ViewMode::Transition
    }

    fn scene(&self) -> &Scene {
        &self.scene
    }

    fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn can_select(&self, _source: &Source) -> bool {
        false
    }

    fn update(&mut self, dt: f32, _session: &Session, _deep: bool) {
        if self.source.is_some() {
            self.progress = (self.progress + dt / self.duration).min(1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reaches_end() {
        let session = Session::default();
        let mut view = TransitionView::default();
        view.set_duration(100.0);

        view.update(50.0, &session, false);
        assert_eq!(view.progress(), 0.0);

        let id = Uuid::new_v4();
        view.attach(id);
        view.update(60.0, &session, false);
        assert!(!view.finished());
        view.update(60.0, &session, false);
        assert!(view.finished());

        assert_eq!(view.detach(), Some(id));
        assert!(!view.finished());
        assert!(view.scene().workspace.is_empty());
    }
}
