//! Layer view: sources stacked along a perspective depth axis.

use uuid::Uuid;

use super::{Scene, View, ViewMode};
use crate::entities::{Session, Source};

/// Gap left above the front-most source for a new one.
const DEPTH_STEP: f32 = 0.25;
/// Margin kept inside the stage bounds.
const STAGE_MARGIN: f32 = 0.1;

#[derive(Debug, Default)]
pub struct LayerView {
    scene: Scene,
}

impl LayerView {
    /// Give source `id` a depth and return it.
    ///
    /// Without `depth`, the source goes just above the front-most source
    /// on stage, staying inside the stage range.
    pub fn set_depth(&self, session: &mut Session, id: Uuid, depth: Option<f32>) -> Option<f32> {
        let stage = *session.stage();
        let depth = match depth {
            Some(d) => d,
            None => {
                let front = self
                    .scene
                    .workspace
                    .iter()
                    .filter(|other| **other != id)
                    .filter_map(|other| session.find(*other))
                    .map(Source::depth)
                    .filter(|z| *z < stage.foreground_depth)
                    .fold(stage.background_depth, f32::max);
                (front + DEPTH_STEP).clamp(
                    stage.background_depth + STAGE_MARGIN,
                    stage.foreground_depth - STAGE_MARGIN,
                )
            }
        };
        let source = session.find_mut(id)?;
        source.set_depth(depth);
        source.touch();
        Some(source.depth())
    }
}

impl View for LayerView {
    fn mode(&self) -> ViewMode {
        ViewMode::Layer
    }

    fn scene(&self) -> &Scene {
        &self.scene
    }

    fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn can_select(&self, source: &Source) -> bool {
        source.active()
    }
}
