//! Geometry view: position, rotation, scale and crop of the rendered image.

use super::{Scene, View, ViewMode};
use crate::entities::Source;

#[derive(Debug, Default)]
pub struct GeometryView {
    scene: Scene,
}

impl View for GeometryView {
    fn mode(&self) -> ViewMode {
        ViewMode::Geometry
    }

    fn scene(&self) -> &Scene {
        &self.scene
    }

    fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn can_select(&self, source: &Source) -> bool {
        source.active() && !source.locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::entities::SourceKind;

    #[test]
    fn test_locked_or_inactive_not_selectable() {
        let view = GeometryView::default();
        let mut s = Source::new(SourceKind::Render, StageConfig::default());
        assert!(view.can_select(&s));

        s.set_locked(true);
        assert!(!view.can_select(&s));

        s.set_locked(false);
        s.set_active(false);
        assert!(!view.can_select(&s));
    }
}
