//! The closed set of source kinds and their per-kind state.

use std::path::{Path, PathBuf};

use glam::UVec2;
use uuid::Uuid;

use super::framebuffer::TextureId;
use super::node::SymbolKind;
use super::session::Session;
use super::stream::{MediaPlayerState, Stream};
use crate::utils::media;

/// Where a source gets its pixels from.
#[derive(Debug)]
pub enum SourceKind {
    /// Video or image file.
    Media {
        path: PathBuf,
        player: MediaPlayerState,
        stream: Box<dyn Stream>,
    },
    /// Nested session loaded from a file.
    SessionFile {
        path: PathBuf,
        session: Option<Box<Session>>,
        failed: bool,
    },
    /// Nested session built from sources of the live session.
    SessionGroup {
        session: Box<Session>,
    },
    /// Loopback of the live session output.
    Render,
    Pattern {
        pattern: usize,
        resolution: UVec2,
        stream: Box<dyn Stream>,
    },
    Device {
        device: String,
        stream: Box<dyn Stream>,
    },
    Network {
        connection: String,
        stream: Box<dyn Stream>,
    },
    /// Generic pipeline described by a string.
    Stream {
        description: String,
        stream: Box<dyn Stream>,
    },
    /// Shares the rendered texture of another source.
    Clone {
        /// `None` once the origin is gone.
        origin: Option<Uuid>,
    },
}

impl SourceKind {
    /// Discriminator used in session documents.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Media { .. } => "MediaSource",
            Self::SessionFile { .. } => "SessionSource",
            Self::SessionGroup { .. } => "GroupSource",
            Self::Render => "RenderSource",
            Self::Pattern { .. } => "PatternSource",
            Self::Device { .. } => "DeviceSource",
            Self::Network { .. } => "NetworkSource",
            Self::Stream { .. } => "GenericStreamSource",
            Self::Clone { .. } => "CloneSource",
        }
    }

    /// Corner icon shown in the mixing and layer views.
    pub fn symbol(&self) -> SymbolKind {
        match self {
            Self::Media { path, .. } if media::is_video(path) => SymbolKind::Video,
            Self::Media { .. } => SymbolKind::Image,
            Self::SessionFile { .. } => SymbolKind::Session,
            Self::SessionGroup { .. } => SymbolKind::Group,
            Self::Render => SymbolKind::Render,
            Self::Pattern { .. } => SymbolKind::Pattern,
            Self::Device { .. } => SymbolKind::Camera,
            Self::Network { .. } => SymbolKind::Share,
            Self::Stream { .. } => SymbolKind::Stream,
            Self::Clone { .. } => SymbolKind::Clone,
        }
    }

    pub fn stream(&self) -> Option<&dyn Stream> {
        match self {
            Self::Media { stream, .. }
            | Self::Pattern { stream, .. }
            | Self::Device { stream, .. }
            | Self::Network { stream, .. }
            | Self::Stream { stream, .. } => Some(stream.as_ref()),
            _ => None,
        }
    }

    pub fn stream_mut(&mut self) -> Option<&mut (dyn Stream + 'static)> {
        match self {
            Self::Media { stream, .. }
            | Self::Pattern { stream, .. }
            | Self::Device { stream, .. }
            | Self::Network { stream, .. }
            | Self::Stream { stream, .. } => Some(stream.as_mut()),
            _ => None,
        }
    }

    /// Nested session of session-file and group sources.
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::SessionFile { session, .. } => session.as_deref(),
            Self::SessionGroup { session } => Some(session),
            _ => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        match self {
            Self::SessionFile { session, .. } => session.as_deref_mut(),
            Self::SessionGroup { session } => Some(session),
            _ => None,
        }
    }

    /// Take the nested session out, leaving the source empty.
    pub fn take_session(&mut self) -> Option<Session> {
        match self {
            Self::SessionFile { session, .. } => session.take().map(|s| *s),
            Self::SessionGroup { session } => Some(std::mem::take(session.as_mut())),
            _ => None,
        }
    }

    /// Hand a session-file source the outcome of reading its file.
    pub fn resolve_session_file(&mut self, loaded: Option<Session>) {
        if let Self::SessionFile { session, failed, .. } = self {
            *failed = loaded.is_none();
            *session = loaded.map(Box::new);
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Media { path, .. } | Self::SessionFile { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn origin(&self) -> Option<Uuid> {
        match self {
            Self::Clone { origin } => *origin,
            _ => None,
        }
    }

    pub fn is_clone(&self) -> bool {
        matches!(self, Self::Clone { .. })
    }

    /// Whether the content provider is ready, and with what.
    pub(crate) fn content(&self) -> Option<(UVec2, TextureId)> {
        match self {
            Self::SessionFile { session: Some(s), .. } | Self::SessionGroup { session: s } => {
                Some((s.resolution(), s.frame().texture()))
            }
            _ => {
                let stream = self.stream()?;
                if stream.failed() {
                    return None;
                }
                stream.resolution().map(|r| (r, stream.texture()))
            }
        }
    }
}
