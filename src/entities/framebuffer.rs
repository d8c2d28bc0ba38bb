//! Render targets, mask buffers and storable mask images.

use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{UVec2, Vec2};
use image::{GrayImage, ImageFormat, Luma, RgbImage};
use once_cell::sync::Lazy;
use rayon::prelude::*;

use super::shaders::{MaskMode, MaskShader};
use crate::error::MixResult;

/// Handle of a texture owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

impl TextureId {
    pub const BLACK: Self = Self(1);
    pub const WHITE: Self = Self(2);
    pub const TRANSPARENT: Self = Self(3);

    pub fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(16);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TextureId {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Offscreen render target of a source or session.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    resolution: UVec2,
    texture: TextureId,
    /// Visible part of the buffer in normalized units (1,1 = all).
    projection_area: Vec2,
    /// Texture drawn last into this buffer.
    drawn: Option<TextureId>,
    frames: u64,
}

/// Shown by sources that are not initialized yet.
static PLACEHOLDER: Lazy<FrameBuffer> = Lazy::new(|| FrameBuffer {
    resolution: UVec2::new(640, 480),
    texture: TextureId::BLACK,
    projection_area: Vec2::ONE,
    drawn: None,
    frames: 0,
});

impl FrameBuffer {
    pub fn new(resolution: UVec2) -> Self {
        Self {
            resolution: resolution.max(UVec2::ONE),
            texture: TextureId::next(),
            projection_area: Vec2::ONE,
            drawn: None,
            frames: 0,
        }
    }

    /// Black 640x480 buffer.
    pub fn placeholder() -> &'static FrameBuffer {
        &PLACEHOLDER
    }

    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.x
    }

    pub fn height(&self) -> u32 {
        self.resolution.y
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.resolution.x as f32 / self.resolution.y as f32
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn projection_area(&self) -> Vec2 {
        self.projection_area
    }

    pub fn set_projection_area(&mut self, area: Vec2) {
        self.projection_area = area.clamp(Vec2::splat(0.01), Vec2::ONE);
    }

    /// Record a draw of `texture` into this buffer.
    pub fn draw(&mut self, texture: TextureId) {
        self.drawn = Some(texture);
        self.frames += 1;
    }

    pub fn last_drawn(&self) -> Option<TextureId> {
        self.drawn
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// Grey-level mask of a source, at a fraction of its render resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskBuffer {
    texture: TextureId,
    pixels: GrayImage,
}

impl MaskBuffer {
    /// Fully opaque mask.
    pub fn new(resolution: UVec2) -> Self {
        let r = resolution.max(UVec2::ONE);
        Self {
            texture: TextureId::next(),
            pixels: GrayImage::from_pixel(r.x, r.y, Luma([255])),
        }
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn resolution(&self) -> UVec2 {
        UVec2::new(self.pixels.width(), self.pixels.height())
    }

    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    /// Load an image into the mask, resampled to the buffer size.
    /// Returns false when the image has no pixels.
    pub fn fill(&mut self, image: &FrameBufferImage) -> bool {
        if image.is_empty() {
            return false;
        }
        let gray = image::DynamicImage::ImageRgb8(image.rgb.clone()).to_luma8();
        let (w, h) = self.pixels.dimensions();
        self.pixels = if gray.dimensions() == (w, h) {
            gray
        } else {
            image::imageops::resize(&gray, w, h, image::imageops::FilterType::Triangle)
        };
        true
    }

    /// Redraw the mask from its previous content through the mask shader.
    pub fn feedback(&mut self, shader: &MaskShader) {
        match shader.mode {
            // strokes are painted in place, nothing to regenerate
            MaskMode::Paint => {}
            MaskMode::None => self.pixels.pixels_mut().for_each(|p| *p = Luma([255])),
            MaskMode::Shape => {
                let (w, h) = self.pixels.dimensions();
                self.pixels
                    .par_chunks_mut(w as usize)
                    .enumerate()
                    .for_each(|(y, row)| {
                        let v = 1.0 - 2.0 * (y as f32 + 0.5) / h as f32;
                        for (x, px) in row.iter_mut().enumerate() {
                            let u = 2.0 * (x as f32 + 0.5) / w as f32 - 1.0;
                            let c = shader.shape_coverage(Vec2::new(u, v));
                            *px = (c.clamp(0.0, 1.0) * 255.0).round() as u8;
                        }
                    });
            }
        }
    }

    pub fn image(&self) -> FrameBufferImage {
        FrameBufferImage {
            rgb: image::DynamicImage::ImageLuma8(self.pixels.clone()).to_rgb8(),
        }
    }
}

/// Pixels captured from a buffer, storable inside a session document.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBufferImage {
    pub rgb: RgbImage,
}

impl FrameBufferImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self { rgb: RgbImage::new(width, height) }
    }

    pub fn is_empty(&self) -> bool {
        self.rgb.width() == 0 || self.rgb.height() == 0
    }

    pub fn encode_png(&self) -> MixResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.rgb.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> MixResult<Self> {
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        Ok(Self { rgb })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::shaders::MaskShape;

    #[test]
    fn test_placeholder_is_black_vga() {
        let p = FrameBuffer::placeholder();
        assert_eq!(p.resolution(), UVec2::new(640, 480));
        assert_eq!(p.texture(), TextureId::BLACK);
    }

    #[test]
    fn test_textures_are_distinct() {
        let a = FrameBuffer::new(UVec2::new(4, 4));
        let b = FrameBuffer::new(UVec2::new(4, 4));
        assert_ne!(a.texture(), b.texture());
        assert!((FrameBuffer::new(UVec2::new(1920, 1080)).aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_mask_fill_resamples() {
        let mut mask = MaskBuffer::new(UVec2::new(8, 4));
        let mut img = FrameBufferImage::new(16, 8);
        img.rgb.pixels_mut().for_each(|p| *p = image::Rgb([0, 0, 0]));
        assert!(mask.fill(&img));
        assert_eq!(mask.resolution(), UVec2::new(8, 4));
        assert!(mask.pixels().pixels().all(|p| p.0[0] == 0));
        assert!(!mask.fill(&FrameBufferImage::new(0, 0)));
    }

    #[test]
    fn test_shape_feedback() {
        let mut mask = MaskBuffer::new(UVec2::new(32, 32));
        let shader = MaskShader {
            mode: MaskMode::Shape,
            shape: MaskShape::Rectangle,
            blur: 0.0,
            size: glam::Vec2::splat(0.5),
            ..Default::default()
        };
        mask.feedback(&shader);
        assert_eq!(mask.pixels().get_pixel(16, 16).0[0], 255);
        assert_eq!(mask.pixels().get_pixel(0, 0).0[0], 0);

        // paint mode keeps the previous content
        let paint = MaskShader { mode: MaskMode::Paint, ..shader };
        mask.feedback(&paint);
        assert_eq!(mask.pixels().get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn test_image_png_roundtrip() {
        let mut mask = MaskBuffer::new(UVec2::new(6, 3));
        mask.feedback(&MaskShader {
            mode: MaskMode::Shape,
            ..Default::default()
        });
        let img = mask.image();
        let bytes = img.encode_png().unwrap();
        let back = FrameBufferImage::decode(&bytes).unwrap();
        assert_eq!(back, img);
    }
}
