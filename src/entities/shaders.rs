//! Shader parameter blocks of the source render pipeline.
//!
//! GPU programs are out of reach here; these structs are the uniforms a
//! renderer would upload, and the mask shader is also evaluated on the CPU
//! to fill mask buffers.

use glam::{Mat4, Vec2, Vec4};
use serde::{Deserialize, Serialize};

use super::framebuffer::TextureId;

/// How a source is blended into the session output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BlendMode {
    #[default]
    Opacity,
    Screen,
    Subtract,
    Multiply,
    SoftLight,
    HardLight,
    SoftSubtract,
    LightenOnly,
    None,
}

/// Textured shader with color, blending and mask.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageShader {
    pub color: Vec4,
    pub blending: BlendMode,
    /// Checker pattern strength used by the mixing preview.
    pub stipple: f32,
    pub mask_texture: TextureId,
    pub i_transform: Mat4,
}

impl Default for ImageShader {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            blending: BlendMode::Opacity,
            stipple: 0.0,
            mask_texture: TextureId::WHITE,
            i_transform: Mat4::IDENTITY,
        }
    }
}

/// Color correction applied while drawing a source into its own buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageProcessingShader {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub hueshift: f32,
    pub threshold: f32,
    pub lumakey: f32,
    /// Posterize levels, 0 disables.
    pub nb_colors: i32,
    pub invert: i32,
    pub chromadelta: f32,
    pub filter: i32,
    pub gamma: Vec4,
    pub levels: Vec4,
    pub chromakey: Vec4,
    #[serde(skip)]
    pub i_transform: Mat4,
}

impl Default for ImageProcessingShader {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            hueshift: 0.0,
            threshold: 0.0,
            lumakey: 0.0,
            nb_colors: 0,
            invert: 0,
            chromadelta: 0.0,
            filter: 0,
            gamma: Vec4::ONE,
            levels: Vec4::new(0.0, 1.0, 0.0, 1.0),
            chromakey: Vec4::new(0.0, 0.8, 0.0, 1.0),
            i_transform: Mat4::IDENTITY,
        }
    }
}

impl ImageProcessingShader {
    /// Restore neutral parameters, keeping the texture transform.
    pub fn reset(&mut self) {
        *self = Self { i_transform: self.i_transform, ..Self::default() };
    }

    /// Same correction parameters, ignoring the texture transform.
    pub fn same_parameters(&self, other: &Self) -> bool {
        Self { i_transform: Mat4::IDENTITY, ..self.clone() }
            == Self { i_transform: Mat4::IDENTITY, ..other.clone() }
    }
}

/// Shader bound to the texture surface of a source.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderingShader {
    Processing(ImageProcessingShader),
    Passthrough(ImageShader),
}

impl RenderingShader {
    pub fn set_i_transform(&mut self, m: Mat4) {
        match self {
            Self::Processing(s) => s.i_transform = m,
            Self::Passthrough(s) => s.i_transform = m,
        }
    }

    pub fn i_transform(&self) -> Mat4 {
        match self {
            Self::Processing(s) => s.i_transform,
            Self::Passthrough(s) => s.i_transform,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MaskMode {
    #[default]
    None,
    Paint,
    Shape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MaskShape {
    #[default]
    Ellipse,
    Oblong,
    Rectangle,
    Horizontal,
    Vertical,
}

/// Mask generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskShader {
    pub mode: MaskMode,
    pub shape: MaskShape,
    /// Edge softness in [0, 1].
    pub blur: f32,
    /// Shape mode: 1 inverts the shape. Paint mode: brush index.
    pub option: i32,
    /// Half extents of the shape in normalized coordinates.
    pub size: Vec2,
}

impl Default for MaskShader {
    fn default() -> Self {
        Self {
            mode: MaskMode::None,
            shape: MaskShape::Ellipse,
            blur: 0.5,
            option: 0,
            size: Vec2::ONE,
        }
    }
}

impl MaskShader {
    /// Shape coverage at `p` in [-1,1]², 1 inside and 0 outside.
    pub fn shape_coverage(&self, p: Vec2) -> f32 {
        let size = self.size.max(Vec2::splat(1e-3));
        let q = (p / size).abs();
        let d = match self.shape {
            MaskShape::Ellipse => q.length(),
            MaskShape::Oblong => (q.x.powi(4) + q.y.powi(4)).powf(0.25),
            MaskShape::Rectangle => q.max_element(),
            MaskShape::Horizontal => q.y,
            MaskShape::Vertical => q.x,
        };
        let edge = self.blur.clamp(0.0, 1.0);
        let coverage = 1.0 - smoothstep(1.0 - edge, 1.0, d);
        if self.option == 1 { 1.0 - coverage } else { coverage }
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_reset_keeps_transform() {
        let mut s = ImageProcessingShader {
            brightness: 0.4,
            nb_colors: 8,
            i_transform: Mat4::from_scale(glam::Vec3::splat(2.0)),
            ..Default::default()
        };
        s.reset();
        assert_eq!(s.brightness, 0.0);
        assert_eq!(s.nb_colors, 0);
        assert_eq!(s.i_transform, Mat4::from_scale(glam::Vec3::splat(2.0)));
    }

    #[test]
    fn test_ellipse_coverage() {
        let mask = MaskShader {
            mode: MaskMode::Shape,
            blur: 0.0,
            size: Vec2::new(0.5, 0.5),
            ..Default::default()
        };
        assert_eq!(mask.shape_coverage(Vec2::ZERO), 1.0);
        assert_eq!(mask.shape_coverage(Vec2::new(0.9, 0.0)), 0.0);
        let inverted = MaskShader { option: 1, ..mask };
        assert_eq!(inverted.shape_coverage(Vec2::ZERO), 0.0);
    }

    #[test]
    fn test_horizontal_band_ignores_x() {
        let mask = MaskShader {
            shape: MaskShape::Horizontal,
            blur: 0.2,
            size: Vec2::new(1.0, 0.3),
            ..Default::default()
        };
        let a = mask.shape_coverage(Vec2::new(-0.9, 0.1));
        let b = mask.shape_coverage(Vec2::new(0.9, 0.1));
        assert_eq!(a, b);
        assert!(mask.shape_coverage(Vec2::new(0.0, 0.9)) < 1e-6);
    }

    #[test]
    fn test_rendering_shader_transform() {
        let mut s = RenderingShader::Passthrough(ImageShader::default());
        let m = Mat4::from_translation(glam::Vec3::X);
        s.set_i_transform(m);
        assert_eq!(s.i_transform(), m);
    }
}
