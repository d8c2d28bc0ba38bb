//! Content providers behind media, pattern, device and network sources.
//!
//! Decoding and capture backends live outside this crate. Sources talk to
//! them through [`Stream`], and the mixer creates them through a
//! [`StreamFactory`] so hosts can plug their own backends.

use std::fmt;
use std::path::{Path, PathBuf};

use glam::UVec2;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::framebuffer::TextureId;

/// A producer of frames with a fixed resolution once opened.
pub trait Stream: Send + fmt::Debug {
    /// Known once the stream is ready to deliver frames.
    fn resolution(&self) -> Option<UVec2>;
    fn texture(&self) -> TextureId;
    /// The stream cannot deliver frames anymore.
    fn failed(&self) -> bool;
    fn update(&mut self, _dt: f32) {}
    /// Short human-readable description.
    fn description(&self) -> String;
}

/// Creates streams for source factories.
pub trait StreamFactory: Send + Sync + fmt::Debug {
    fn open_media(&self, path: &Path) -> Box<dyn Stream>;
    fn open_pattern(&self, pattern: usize, resolution: UVec2) -> Box<dyn Stream>;
    fn open_device(&self, device: &str) -> Box<dyn Stream>;
    fn open_network(&self, connection: &str) -> Box<dyn Stream>;
    fn open_pipeline(&self, description: &str) -> Box<dyn Stream>;
}

/// Generated test patterns.
pub const PATTERN_NAMES: [&str; 13] = [
    "Black",
    "White",
    "Gradient",
    "Checkers 1x1 px",
    "Checkers 8x8 px",
    "Circles",
    "Lissajous",
    "Pinwheel",
    "Spokes",
    "Color bars",
    "RGB grid",
    "SMPTE test pattern",
    "Television snow",
];

/// Loop behaviour of media playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LoopMode {
    None,
    #[default]
    Rewind,
    Bidirectional,
}

/// Playback settings of a media source, persisted with the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaPlayerState {
    pub speed: f64,
    pub loop_mode: LoopMode,
    pub playing: bool,
}

impl Default for MediaPlayerState {
    fn default() -> Self {
        Self { speed: 1.0, loop_mode: LoopMode::Rewind, playing: true }
    }
}

/// Stream with a fixed outcome: ready at a resolution, or failed.
#[derive(Debug, Clone)]
pub struct StaticStream {
    description: String,
    resolution: Option<UVec2>,
    texture: TextureId,
    failed: bool,
}

impl StaticStream {
    pub fn ready(description: impl Into<String>, resolution: UVec2) -> Self {
        Self {
            description: description.into(),
            resolution: Some(resolution),
            texture: TextureId::next(),
            failed: false,
        }
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            resolution: None,
            texture: TextureId::BLACK,
            failed: true,
        }
    }

    /// Stream that never becomes ready nor fails.
    pub fn pending(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            resolution: None,
            texture: TextureId::BLACK,
            failed: false,
        }
    }
}

impl Stream for StaticStream {
    fn resolution(&self) -> Option<UVec2> {
        self.resolution
    }

    fn texture(&self) -> TextureId {
        self.texture
    }

    fn failed(&self) -> bool {
        self.failed
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

/// Backends available without external media libraries: still images
/// through `image`, generated patterns. Live capture is unavailable and
/// reports failure.
#[derive(Debug, Default, Clone)]
pub struct DefaultStreams;

impl StreamFactory for DefaultStreams {
    fn open_media(&self, path: &Path) -> Box<dyn Stream> {
        let label = path.display().to_string();
        match image::image_dimensions(path) {
            Ok((w, h)) => {
                debug!("Opened still image {} ({}x{})", label, w, h);
                Box::new(StaticStream::ready(label, UVec2::new(w, h)))
            }
            Err(e) => {
                warn!("Cannot decode {}: {}", label, e);
                Box::new(StaticStream::failed(label))
            }
        }
    }

    fn open_pattern(&self, pattern: usize, resolution: UVec2) -> Box<dyn Stream> {
        let name = PATTERN_NAMES.get(pattern).copied().unwrap_or("Pattern");
        Box::new(StaticStream::ready(name, resolution))
    }

    fn open_device(&self, device: &str) -> Box<dyn Stream> {
        warn!("No capture backend for device '{}'", device);
        Box::new(StaticStream::failed(device))
    }

    fn open_network(&self, connection: &str) -> Box<dyn Stream> {
        warn!("No network backend for '{}'", connection);
        Box::new(StaticStream::failed(connection))
    }

    fn open_pipeline(&self, description: &str) -> Box<dyn Stream> {
        warn!("No pipeline backend for '{}'", description);
        Box::new(StaticStream::failed(description))
    }
}

/// Factory handing out ready streams at a fixed resolution for everything.
/// Used by tests and by hosts that only need the interaction model.
#[derive(Debug, Clone)]
pub struct SyntheticStreams {
    pub resolution: UVec2,
    /// Paths whose media open as failed.
    pub broken: Vec<PathBuf>,
}

impl Default for SyntheticStreams {
    fn default() -> Self {
        Self { resolution: UVec2::new(1280, 720), broken: Vec::new() }
    }
}

impl StreamFactory for SyntheticStreams {
    fn open_media(&self, path: &Path) -> Box<dyn Stream> {
        if self.broken.iter().any(|p| p == path) {
            return Box::new(StaticStream::failed(path.display().to_string()));
        }
        Box::new(StaticStream::ready(path.display().to_string(), self.resolution))
    }

    fn open_pattern(&self, pattern: usize, resolution: UVec2) -> Box<dyn Stream> {
        DefaultStreams.open_pattern(pattern, resolution)
    }

    fn open_device(&self, device: &str) -> Box<dyn Stream> {
        Box::new(StaticStream::ready(device, self.resolution))
    }

    fn open_network(&self, connection: &str) -> Box<dyn Stream> {
        Box::new(StaticStream::ready(connection, self.resolution))
    }

    fn open_pipeline(&self, description: &str) -> Box<dyn Stream> {
        Box::new(StaticStream::ready(description, self.resolution))
    }
}
