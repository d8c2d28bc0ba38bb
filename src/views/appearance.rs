//! Appearance view: texture placement of the current source.

use super::{Scene, View, ViewMode};
use crate::entities::{Source, SourceMode};

#[derive(Debug, Default)]
pub struct AppearanceView {
    scene: Scene,
}

impl View for AppearanceView {
    fn mode(&self) -> ViewMode {
        ViewMode::Appearance
    }

    fn scene(&self) -> &Scene {
        &self.scene
    }

    fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn can_select(&self, source: &Source) -> bool {
        source.mode() == SourceMode::Current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::entities::SourceKind;

    #[test]
    fn test_only_current_selectable() {
        let view = AppearanceView::default();
        let mut s = Source::new(SourceKind::Render, StageConfig::default());
        s.set_mode(SourceMode::Selected);
        assert!(!view.can_select(&s));
        s.set_mode(SourceMode::Current);
        assert!(view.can_select(&s));
    }
}
