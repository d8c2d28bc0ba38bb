//! Linked sources moving together in the mixing view.

use std::cmp::Ordering;

use glam::{Vec2, Vec4};
use indexmap::IndexMap;
use log::trace;
use uuid::Uuid;

use super::source::Source;
use crate::views::ViewMode;

const COLOR_MIXING_GROUP: Vec4 = Vec4::new(0.95, 0.8, 0.3, 0.96);

/// How the last edit of a member should spread to the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupAction {
    #[default]
    None,
    /// Only the moved member changed.
    GrabOne,
    /// Translate every unlocked member by the same displacement.
    GrabAll,
    /// Rotate and scale unlocked members about the center.
    RotateAll,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixingGroup {
    id: Uuid,
    /// Members in clockwise order around the initial center.
    members: Vec<Uuid>,
    /// Last known mixing position of each member, same order.
    path: Vec<Vec2>,
    center: Vec2,
    active: bool,
    center_visible: bool,
    action: GroupAction,
    updated: Option<Uuid>,
    line_color: Vec4,
}

fn mixing_position(sources: &IndexMap<Uuid, Source>, id: &Uuid) -> Vec2 {
    sources
        .get(id)
        .map(|s| s.group(ViewMode::Mixing).transform.translation.truncate())
        .unwrap_or(Vec2::ZERO)
}

/// Angle from `v` to the x axis, as used to order members clockwise.
fn oriented_angle(v: Vec2) -> f32 {
    -v.y.atan2(v.x)
}

fn barycenter(points: &[Vec2]) -> Vec2 {
    if points.is_empty() {
        return Vec2::ZERO;
    }
    points.iter().copied().sum::<Vec2>() / points.len() as f32
}

impl MixingGroup {
    /// Group the given sources; each member is told its group.
    pub fn new(ids: &[Uuid], sources: &mut IndexMap<Uuid, Source>) -> Self {
        let mut members: Vec<Uuid> = Vec::with_capacity(ids.len());
        for id in ids {
            if sources.contains_key(id) && !members.contains(id) {
                members.push(*id);
            }
        }
        let positions: Vec<Vec2> = members.iter().map(|id| mixing_position(sources, id)).collect();
        let center = barycenter(&positions);

        members.sort_by(|a, b| {
            let pa = oriented_angle((mixing_position(sources, a) - center).normalize_or_zero());
            let pb = oriented_angle((mixing_position(sources, b) - center).normalize_or_zero());
            pa.partial_cmp(&pb).unwrap_or(Ordering::Equal)
        });

        let mut group = Self {
            id: Uuid::new_v4(),
            members,
            path: Vec::new(),
            center,
            active: true,
            center_visible: false,
            action: GroupAction::None,
            updated: None,
            line_color: COLOR_MIXING_GROUP,
        };
        for id in &group.members {
            if let Some(s) = sources.get_mut(id) {
                s.set_mixing_group(Some(group.id));
            }
        }
        group.rebuild_path(sources);
        group
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn members(&self) -> &[Uuid] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.members.contains(&id)
    }

    pub fn center(&self) -> Vec2 {
        self.center
    }

    /// Recorded mixing positions of the members, in member order.
    pub fn path(&self) -> &[Vec2] {
        &self.path
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn center_visible(&self) -> bool {
        self.center_visible
    }

    pub fn line_color(&self) -> Vec4 {
        self.line_color
    }

    pub fn action(&self) -> GroupAction {
        self.action
    }

    /// Request `action` on behalf of the member `source`, applied at the
    /// next update.
    pub fn set_action(&mut self, source: Uuid, action: GroupAction) {
        if self.contains(source) {
            self.updated = Some(source);
            self.action = action;
        }
    }

    /// Remove a member; the path is rebuilt from the remaining ones in
    /// their current order.
    pub fn detach(&mut self, id: Uuid, sources: &IndexMap<Uuid, Source>) {
        if let Some(pos) = self.members.iter().position(|m| *m == id) {
            self.members.remove(pos);
            self.rebuild_path(sources);
        }
    }

    fn rebuild_path(&mut self, sources: &IndexMap<Uuid, Source>) {
        self.path = self.members.iter().map(|id| mixing_position(sources, id)).collect();
    }

    fn set_active(&mut self, on: bool) {
        self.active = on;
        self.line_color.w = if on { 0.96 } else { 0.5 };
        self.center_visible = self.action != GroupAction::None;
    }

    /// Follow the current source and propagate the pending action.
    pub fn update(&mut self, current: Option<Uuid>, sources: &mut IndexMap<Uuid, Source>) {
        self.set_active(current.is_some_and(|c| self.contains(c)));

        let Some(updated) = self.updated else {
            return;
        };
        let Some(index) = self.members.iter().position(|m| *m == updated) else {
            self.updated = None;
            return;
        };
        let moved = mixing_position(sources, &updated);

        match self.action {
            GroupAction::None => {}
            GroupAction::GrabOne => {
                self.path[index] = moved;
                let positions: Vec<Vec2> = self.members.iter().map(|id| mixing_position(sources, id)).collect();
                self.center = barycenter(&positions);
            }
            GroupAction::GrabAll => {
                let displacement = moved - self.path[index];
                for (i, id) in self.members.iter().enumerate() {
                    if let Some(s) = sources.get_mut(id)
                        && *id != updated
                        && !s.locked()
                    {
                        let t = &mut s.group_mut(ViewMode::Mixing).transform.translation;
                        t.x += displacement.x;
                        t.y += displacement.y;
                    }
                    self.path[i] = mixing_position(sources, id);
                }
                self.center = barycenter(&self.path);
            }
            GroupAction::RotateAll => {
                let first = moved - self.center;
                let second = self.path[index] - self.center;
                let angle = oriented_angle(first.normalize_or_zero()) - oriented_angle(second.normalize_or_zero());
                let scale = if second.length() > f32::EPSILON { first.length() / second.length() } else { 1.0 };
                let rotation = Vec2::from_angle(-angle);
                for (i, id) in self.members.iter().enumerate() {
                    if let Some(s) = sources.get_mut(id)
                        && *id != updated
                        && !s.locked()
                    {
                        let t = &mut s.group_mut(ViewMode::Mixing).transform.translation;
                        let v = rotation.rotate(Vec2::new(t.x, t.y) - self.center) * scale + self.center;
                        t.x = v.x;
                        t.y = v.y;
                    }
                    self.path[i] = mixing_position(sources, id);
                }
            }
        }
        trace!("Mixing group {} applied {:?}", self.id, self.action);
        self.updated = None;
        self.action = GroupAction::None;
    }
}
