//! Source factories for Mixer, one per source kind.
//!
//! A factory returns an unattached source named after its content;
//! `insert_source` or `add_source` brings it into the session.

use std::path::Path;

use glam::UVec2;
use log::debug;

use super::Mixer;
use crate::core::mixer_events::NotifyEvent;
use crate::entities::stream::{MediaPlayerState, PATTERN_NAMES};
use crate::entities::{Session, Source, SourceKind};
use crate::utils::media;
use crate::utils::text::first_word;

impl Mixer {
    fn named(&self, kind: SourceKind, name: &str) -> Source {
        let mut source = Source::new(kind, self.settings.stage);
        source.set_name(name);
        source
    }

    /// Source for a file: a nested session for `.mix` files, read in the
    /// background, media otherwise. A missing file is reported and leaves
    /// the recent imports.
    pub fn create_source_file(&mut self, path: &Path) -> Option<Source> {
        let label = path.display().to_string();
        if !path.exists() {
            self.settings.recent_imports.remove(&label);
            self.notify(NotifyEvent::warning(format!("File {} does not exist.", label)));
            return None;
        }

        let is_session = media::is_session(path);
        let kind = if is_session {
            SourceKind::SessionFile { path: path.to_path_buf(), session: None, failed: false }
        } else {
            SourceKind::Media {
                path: path.to_path_buf(),
                player: MediaPlayerState::default(),
                stream: self.streams.open_media(path),
            }
        };
        self.settings.recent_imports.push(label);
        debug!("Created {} for {}", kind.type_name(), path.display());
        let source = self.named(kind, &media::base_filename(path));
        if is_session {
            self.read_session_file(source.id(), path.to_path_buf(), false);
        }
        Some(source)
    }

    /// Loopback of the session output, named after the session file.
    pub fn create_source_render(&self) -> Source {
        let name = self
            .session
            .filename()
            .map(media::base_filename)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Render".to_string());
        self.named(SourceKind::Render, &name)
    }

    pub fn create_source_stream(&self, description: &str) -> Source {
        let kind = SourceKind::Stream {
            description: description.to_string(),
            stream: self.streams.open_pipeline(description),
        };
        self.named(kind, first_word(description))
    }

    pub fn create_source_pattern(&self, pattern: usize, resolution: UVec2) -> Source {
        let resolution = resolution.max(UVec2::ONE);
        let name = PATTERN_NAMES.get(pattern).copied().unwrap_or("Pattern");
        let kind = SourceKind::Pattern { pattern, resolution, stream: self.streams.open_pattern(pattern, resolution) };
        self.named(kind, first_word(name))
    }

    pub fn create_source_device(&self, device: &str) -> Source {
        let kind = SourceKind::Device { device: device.to_string(), stream: self.streams.open_device(device) };
        self.named(kind, first_word(device))
    }

    pub fn create_source_network(&self, connection: &str) -> Source {
        let kind = SourceKind::Network {
            connection: connection.to_string(),
            stream: self.streams.open_network(connection),
        };
        self.named(kind, connection)
    }

    /// Empty group at the session resolution.
    pub fn create_source_group(&self) -> Source {
        let inner = Session::new(self.session.resolution(), self.settings.stage);
        self.named(SourceKind::SessionGroup { session: Box::new(inner) }, "Group")
    }

    /// Clone of the source named `name`, or of the current source.
    pub fn create_source_clone(&self, name: Option<&str>) -> Option<Source> {
        let origin = match name {
            Some(n) => self.session.find_by_name(n)?,
            None => self.current_source()?,
        };
        let mut clone = self.session.clone_source(origin.id())?;
        let name = self.session.unique_name(clone.name(), None);
        clone.set_name(&name);
        Some(clone)
    }
}
