//! Mixing view: distance to the center sets opacity.

use glam::Vec2;
use uuid::Uuid;

use super::{Scene, View, ViewMode};
use crate::entities::{Session, Source};

/// Icons closer than this are considered on top of each other.
const OVERLAP: f32 = 0.001;
/// Shift applied to a new icon landing on an existing one.
const OVERLAP_SHIFT: Vec2 = Vec2::new(-0.03, 0.03);

#[derive(Debug, Default)]
pub struct MixingView {
    scene: Scene,
}

impl MixingView {
    /// Place source `id` in the mixing circle.
    ///
    /// With `alpha`, the icon moves along its direction to the distance
    /// giving that opacity. Without, it goes to the default spot, nudged
    /// away from icons already there.
    pub fn set_alpha(&self, session: &mut Session, id: Uuid, alpha: Option<f32>) {
        let stage = *session.stage();
        let taken: Vec<Vec2> = self
            .scene
            .workspace
            .iter()
            .filter(|other| **other != id)
            .filter_map(|other| session.find(*other))
            .map(|s| s.group(ViewMode::Mixing).transform.translation.truncate())
            .collect();

        let Some(source) = session.find_mut(id) else {
            return;
        };
        match alpha {
            Some(a) => source.set_alpha(a),
            None => {
                let mut pos = stage.default_mixing_translation;
                while taken.iter().any(|p| p.distance(pos) < OVERLAP) {
                    pos += OVERLAP_SHIFT;
                }
                let t = &mut source.group_mut(ViewMode::Mixing).transform.translation;
                t.x = pos.x;
                t.y = pos.y;
            }
        }
        source.touch();
    }
}

impl View for MixingView {
    fn mode(&self) -> ViewMode {
        ViewMode::Mixing
    }

    fn scene(&self) -> &Scene {
        &self.scene
    }

    fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Inactive sources stay clickable here to be brought back in.
    fn can_select(&self, _source: &Source) -> bool {
        true
    }
}
