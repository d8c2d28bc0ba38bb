//! Affine transforms of per-view nodes.
//!
//! Matrices are built as `T * Rz * Ry * Rx * S` (glam, column vectors).
//! Rotations are in radians, counter-clockwise positive.

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Translation, rotation, scale and crop of a node.
///
/// `crop` holds the visible fraction of the content on x and y (1 = full).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub crop: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
        crop: Vec3::ONE,
    };

    pub fn matrix(&self) -> Mat4 {
        build_matrix(self.translation, self.rotation, self.scale)
    }

    /// Rebuild translation/rotation/scale from an affine matrix, keeping crop.
    pub fn set_from_matrix(&mut self, m: Mat4) {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        let (z, y, x) = rotation.to_euler(EulerRot::ZYX);
        self.translation = translation;
        self.rotation = Vec3::new(x, y, z);
        self.scale = scale;
    }

    /// Copy everything but crop from `other`.
    pub fn copy_placement(&mut self, other: &Transform) {
        self.translation = other.translation;
        self.rotation = other.rotation;
        self.scale = other.scale;
    }
}

/// `T * R(zyx) * S` for the given components.
pub fn build_matrix(translation: Vec3, rotation: Vec3, scale: Vec3) -> Mat4 {
    let quat = Quat::from_euler(EulerRot::ZYX, rotation.z, rotation.y, rotation.x);
    Mat4::from_scale_rotation_translation(scale, quat, translation)
}

/// Texture-coordinate transform for an APPEARANCE view node.
///
/// Chain: `inv(uv) * inv(S) * inv(A) * R * T * A * uv`, where `uv` maps
/// texture space [0,1]² onto scene space [-1,1]² (flipped on x), and `A` is
/// the aspect correction. Rotation stays centered on the translated position
/// and the scale does not depend on the aspect ratio.
pub fn texture_transform(appearance: &Transform, aspect_ratio: f32, min_scale: f32) -> Mat4 {
    let uv_to_scene = build_matrix(Vec3::new(1.0, -1.0, 0.0), Vec3::ZERO, Vec3::new(-2.0, 2.0, 1.0));
    let ar = Mat4::from_scale(Vec3::new(aspect_ratio, 1.0, 1.0));
    let tra = Mat4::from_translation(appearance.translation);
    let clamp = |v: f32| v.signum() * v.abs().max(min_scale);
    let sca = Mat4::from_scale(Vec3::new(clamp(appearance.scale.x), clamp(appearance.scale.y), 1.0));
    let rot = Mat4::from_axis_angle(Vec3::new(0.0, 0.0, -1.0), appearance.rotation.z);

    uv_to_scene.inverse() * sca.inverse() * ar.inverse() * rot * tra * ar * uv_to_scene
}
