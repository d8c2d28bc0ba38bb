//! Transfer functions from a mixing-view position to blend alpha.

use std::f32::consts::PI;

use glam::Vec2;

/// `0.5 + 0.5 * cos(pi * clamp(x² + y², 0, 1))`.
///
/// Opaque at the origin, smoothly fading to transparent at unit distance
/// and beyond.
pub fn sin_quad(x: f32, y: f32) -> f32 {
    0.5 + 0.5 * (PI * (x * x + y * y).clamp(0.0, 1.0)).cos()
}

/// Distance from the mixing center giving `alpha` under [`sin_quad`].
pub fn sin_quad_distance(alpha: f32) -> f32 {
    let a = alpha.clamp(0.0, 1.0);
    ((2.0 * a - 1.0).acos() / PI).sqrt()
}

/// Position on the ray through `from` (or `fallback` when `from` is the
/// origin) whose alpha is `alpha`.
pub fn position_for_alpha(alpha: f32, from: Vec2, fallback: Vec2) -> Vec2 {
    let dir = if from.length_squared() > f32::EPSILON { from } else { fallback };
    dir.normalize_or(Vec2::X) * sin_quad_distance(alpha)
}
