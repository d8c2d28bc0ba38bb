//! Session documents: the persisted schema and its mapping to live entities.
//!
//! A document is JSON: a header, the ordered source records, the saved
//! camera of each view and the mixing groups. Loading never aborts on a bad
//! record; it is skipped with a warning and the pass continues.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone, Utc};
use glam::{UVec2, Vec4};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::framebuffer::FrameBufferImage;
use super::session::Session;
use super::shaders::{BlendMode, ImageProcessingShader, MaskMode, MaskShader};
use super::source::Source;
use super::source_kind::SourceKind;
use super::stream::{MediaPlayerState, StreamFactory};
use super::transform::Transform;
use crate::config::StageConfig;
use crate::error::{MixError, MixResult};
use crate::views::ViewMode;

pub const APP_NAME: &str = "mixa";
pub const FORMAT_MAJOR: u32 = 0;
pub const FORMAT_MINOR: u32 = 3;

/// Nested session files deeper than this are reported failed.
const MAX_NESTING: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub app: String,
    pub major: u32,
    pub minor: u32,
    /// Number of source records.
    pub size: usize,
    pub resolution: [u32; 2],
    /// Seconds since the unix epoch.
    pub date: u64,
}

/// Saved camera of each view; the rendering entry carries the resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewsRecord {
    pub mixing: Transform,
    pub geometry: Transform,
    pub layer: Transform,
    pub appearance: Transform,
    pub rendering: Transform,
}

/// Kind-specific part of a source record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KindRecord {
    MediaSource {
        uri: PathBuf,
        #[serde(default)]
        player: MediaPlayerState,
    },
    SessionSource {
        path: PathBuf,
    },
    GroupSource {
        session: Box<SessionDocument>,
    },
    RenderSource,
    PatternSource {
        pattern: usize,
        #[serde(default = "default_pattern_resolution")]
        resolution: [u32; 2],
    },
    DeviceSource {
        device: String,
    },
    NetworkSource {
        connection: String,
    },
    GenericStreamSource {
        description: String,
    },
    CloneSource {
        /// Name of the origin within the same document.
        origin: String,
    },
}

fn default_pattern_resolution() -> [u32; 2] {
    [800, 600]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendingRecord {
    pub color: Vec4,
    pub mode: BlendMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskRecord {
    pub shader: MaskShader,
    /// Painted mask as hex-encoded PNG.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub enabled: bool,
    pub params: ImageProcessingShader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub locked: bool,
    pub kind: KindRecord,
    #[serde(default)]
    pub mixing: Transform,
    #[serde(default)]
    pub geometry: Transform,
    #[serde(default)]
    pub layer: Transform,
    #[serde(default)]
    pub appearance: Transform,
    pub blending: BlendingRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<MaskRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing: Option<ProcessingRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub header: SessionHeader,
    pub sources: Vec<SourceRecord>,
    #[serde(default)]
    pub views: ViewsRecord,
    /// Members of each mixing group.
    #[serde(default)]
    pub mixing_groups: Vec<Vec<Uuid>>,
    #[serde(default)]
    pub fading: f32,
}

// ===== Live entities to records =====

fn kind_record(kind: &SourceKind, session: &Session) -> MixResult<KindRecord> {
    Ok(match kind {
        SourceKind::Media { path, player, .. } => KindRecord::MediaSource { uri: path.clone(), player: player.clone() },
        SourceKind::SessionFile { path, .. } => KindRecord::SessionSource { path: path.clone() },
        SourceKind::SessionGroup { session: inner } => KindRecord::GroupSource {
            session: Box::new(SessionDocument::from_session(inner)?),
        },
        SourceKind::Render => KindRecord::RenderSource,
        SourceKind::Pattern { pattern, resolution, .. } => KindRecord::PatternSource {
            pattern: *pattern,
            resolution: resolution.to_array(),
        },
        SourceKind::Device { device, .. } => KindRecord::DeviceSource { device: device.clone() },
        SourceKind::Network { connection, .. } => KindRecord::NetworkSource { connection: connection.clone() },
        SourceKind::Stream { description, .. } => {
            KindRecord::GenericStreamSource { description: description.clone() }
        }
        SourceKind::Clone { origin } => KindRecord::CloneSource {
            origin: origin
                .and_then(|o| session.find(o))
                .map(|o| o.name().to_string())
                .unwrap_or_default(),
        },
    })
}

impl SourceRecord {
    /// Describe `source`; clone origins are resolved by name in `session`.
    pub fn from_source(source: &Source, session: &Session) -> MixResult<Self> {
        let mask_shader = source.mask_shader().clone();
        let image = if mask_shader.mode == MaskMode::Paint {
            let img = source
                .mask_buffer()
                .map(|m| m.image())
                .or_else(|| source.stored_mask().cloned());
            match img {
                Some(img) => Some(hex::encode(img.encode_png()?)),
                None => None,
            }
        } else {
            None
        };

        Ok(Self {
            id: source.id(),
            name: source.name().to_string(),
            locked: source.locked(),
            kind: kind_record(source.kind(), session)?,
            mixing: source.group(ViewMode::Mixing).transform,
            geometry: source.group(ViewMode::Geometry).transform,
            layer: source.group(ViewMode::Layer).transform,
            appearance: source.group(ViewMode::Appearance).transform,
            blending: BlendingRecord {
                color: source.blending_shader().color,
                mode: source.blending_shader().blending,
            },
            mask: Some(MaskRecord { shader: mask_shader, image }),
            processing: Some(ProcessingRecord {
                enabled: source.image_processing_enabled(),
                params: source.processing_shader().clone(),
            }),
        })
    }

    pub fn is_clone(&self) -> bool {
        matches!(self.kind, KindRecord::CloneSource { .. })
    }
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

impl SessionDocument {
    /// Snapshot of a live session.
    pub fn from_session(session: &Session) -> MixResult<Self> {
        let sources = session
            .iter()
            .map(|s| SourceRecord::from_source(s, session))
            .collect::<MixResult<Vec<_>>>()?;
        let res = session.resolution();
        Ok(Self {
            header: SessionHeader {
                app: APP_NAME.to_string(),
                major: FORMAT_MAJOR,
                minor: FORMAT_MINOR,
                size: sources.len(),
                resolution: res.to_array(),
                date: unix_now(),
            },
            sources,
            views: ViewsRecord {
                mixing: session.config(ViewMode::Mixing),
                geometry: session.config(ViewMode::Geometry),
                layer: session.config(ViewMode::Layer),
                appearance: session.config(ViewMode::Appearance),
                rendering: session.config(ViewMode::Rendering),
            },
            mixing_groups: session.mixing_groups().iter().map(|g| g.members().to_vec()).collect(),
            fading: session.fading(),
        })
    }

    pub fn read(path: &Path) -> MixResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| MixError::io(path, e))?;
        let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| MixError::parse(path, e))?;
        let is_session = value
            .get("header")
            .and_then(|h| h.get("app"))
            .and_then(|a| a.as_str())
            .is_some_and(|a| a == APP_NAME);
        if !is_session {
            return Err(MixError::NotASession(path.to_path_buf()));
        }
        serde_json::from_value(value).map_err(|e| MixError::parse(path, e))
    }

    pub fn write(&self, path: &Path) -> MixResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| MixError::parse(path, e))?;
        fs::write(path, json).map_err(|e| MixError::io(path, e))
    }

    pub fn to_json(&self) -> MixResult<String> {
        serde_json::to_string(self).map_err(|e| MixError::parse("<memory>", e))
    }

    pub fn resolution(&self) -> UVec2 {
        UVec2::from_array(self.header.resolution).max(UVec2::ONE)
    }
}

// ===== Header summary =====

/// Header date as `dd/mm/yyyy @ HH:MM` in the given time zone.
fn format_date<Tz: TimeZone>(secs: u64, tz: &Tz) -> String
where
    Tz::Offset: fmt::Display,
{
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    match DateTime::<Utc>::from_timestamp(secs, 0) {
        Some(utc) => utc.with_timezone(tz).format("%d/%m/%Y @ %H:%M").to_string(),
        None => String::from("?"),
    }
}

/// Short description of a session file: source count, resolution, date.
pub fn info(path: &Path) -> MixResult<String> {
    let doc = SessionDocument::read(path)?;
    let h = &doc.header;
    Ok(format!(
        "{} source{}\n{}x{}\n{}",
        h.size,
        if h.size > 1 { "s" } else { "" },
        h.resolution[0],
        h.resolution[1],
        format_date(h.date, &Local)
    ))
}

// ===== Records to live entities =====

/// Read and build a session from `path`.
pub fn load(path: &Path, streams: &dyn StreamFactory, stage: StageConfig) -> MixResult<Session> {
    load_nested(path, streams, stage, 0)
}

/// Read and build a session nested `depth` levels below the live one.
pub fn load_nested(path: &Path, streams: &dyn StreamFactory, stage: StageConfig, depth: usize) -> MixResult<Session> {
    let doc = SessionDocument::read(path)?;
    if doc.header.major != FORMAT_MAJOR || doc.header.minor != FORMAT_MINOR {
        warn!(
            "{} is in format v{}.{} but v{}.{} is expected; loading might be incomplete. \
             Save the session again to avoid this warning.",
            path.display(),
            doc.header.major,
            doc.header.minor,
            FORMAT_MAJOR,
            FORMAT_MINOR
        );
    }
    let mut session = build(&doc, streams, stage, depth, path.parent())?;
    session.set_filename(Some(path.to_path_buf()));
    info!("Loaded {} ({} sources)", path.display(), session.len());
    Ok(session)
}

/// Build a session from a document already in memory.
pub fn build(
    doc: &SessionDocument,
    streams: &dyn StreamFactory,
    stage: StageConfig,
    depth: usize,
    base_dir: Option<&Path>,
) -> MixResult<Session> {
    let mut session = Session::new(doc.resolution(), stage);
    let mut loader = SessionLoader { session: &mut session, streams, depth, base_dir };
    loader.load(&doc.sources);
    for members in &doc.mixing_groups {
        session.link(members);
    }
    session.set_config(ViewMode::Mixing, doc.views.mixing);
    session.set_config(ViewMode::Geometry, doc.views.geometry);
    session.set_config(ViewMode::Layer, doc.views.layer);
    session.set_config(ViewMode::Appearance, doc.views.appearance);
    session.set_fading(doc.fading);
    Ok(session)
}

/// Hydrates records into a session: existing ids are updated in place,
/// missing ones are created.
pub struct SessionLoader<'a> {
    pub session: &'a mut Session,
    pub streams: &'a dyn StreamFactory,
    /// Nesting level of the session being filled.
    pub depth: usize,
    /// Directory relative paths are resolved against.
    pub base_dir: Option<&'a Path>,
}

impl<'a> SessionLoader<'a> {
    pub fn new(session: &'a mut Session, streams: &'a dyn StreamFactory) -> Self {
        Self { session, streams, depth: 0, base_dir: None }
    }

    /// Apply all records; clones come last so that their origin exists.
    /// Returns the ids of the sources touched, in record order.
    pub fn load(&mut self, records: &[SourceRecord]) -> Vec<Uuid> {
        let mut loaded = Vec::new();
        for record in records.iter().filter(|r| !r.is_clone()) {
            if self.session.contains(record.id) {
                if let Some(s) = self.session.find_mut(record.id) {
                    apply_record(s, record, self.streams);
                    s.touch();
                }
            } else {
                match self.create(record, record.id) {
                    Ok(mut s) => {
                        apply_record(&mut s, record, self.streams);
                        s.touch();
                        self.session.add_source(s);
                    }
                    Err(e) => {
                        warn!("Skipped source '{}': {}", record.name, e);
                        continue;
                    }
                }
            }
            loaded.push(record.id);
        }

        for record in records.iter().filter(|r| r.is_clone()) {
            if self.session.contains(record.id) {
                if let Some(s) = self.session.find_mut(record.id) {
                    apply_record(s, record, self.streams);
                    s.touch();
                }
                loaded.push(record.id);
                continue;
            }
            let KindRecord::CloneSource { origin } = &record.kind else {
                continue;
            };
            let Some(origin) = self.session.find_by_name(origin).map(Source::id) else {
                warn!("Skipped clone '{}': origin '{}' not found", record.name, origin);
                continue;
            };
            let root = self
                .session
                .find(origin)
                .and_then(|o| if o.is_clone() { o.origin() } else { Some(origin) });
            let Some(root) = root else {
                continue;
            };
            let mut s = Source::with_id(record.id, SourceKind::Clone { origin: Some(root) }, *self.session.stage());
            apply_record(&mut s, record, self.streams);
            s.touch();
            self.session.add_source(s);
            loaded.push(record.id);
        }

        loaded.dedup();
        loaded
    }

    /// Source for a record: a clone of the existing source when the id is
    /// already in the session, otherwise a new source with a fresh id.
    /// The mixing position is reset so the source shows up in the scene.
    pub fn clone_or_create(&mut self, record: &SourceRecord) -> Option<Source> {
        let stage = *self.session.stage();
        let (mut s, is_clone) = if self.session.contains(record.id) {
            (self.session.clone_source(record.id)?, true)
        } else if let KindRecord::CloneSource { origin } = &record.kind {
            let origin = self.session.find_by_name(origin).map(Source::id)?;
            (self.session.clone_source(origin)?, false)
        } else {
            match self.create(record, Uuid::new_v4()) {
                Ok(s) => (s, false),
                Err(e) => {
                    warn!("Cannot create source '{}': {}", record.name, e);
                    return None;
                }
            }
        };
        apply_record(&mut s, record, self.streams);
        let mixing = &mut s.group_mut(ViewMode::Mixing).transform.translation;
        mixing.x = stage.default_mixing_translation.x;
        mixing.y = stage.default_mixing_translation.y;
        if is_clone {
            s.group_mut(ViewMode::Layer).transform.translation.z += stage.clone_depth_offset;
        }
        Some(s)
    }

    /// New source of the record kind with identity `id`. Clones are built
    /// by the callers, which know the origin.
    pub fn create(&self, record: &SourceRecord, id: Uuid) -> MixResult<Source> {
        let stage = *self.session.stage();
        let kind = self.kind(&record.kind, stage)?;
        Ok(Source::with_id(id, kind, stage))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn kind(&self, record: &KindRecord, stage: StageConfig) -> MixResult<SourceKind> {
        Ok(match record {
            KindRecord::MediaSource { uri, player } => {
                SourceKind::Media {
                    stream: self.streams.open_media(&self.resolve(uri)),
                    path: uri.clone(),
                    player: player.clone(),
                }
            }
            KindRecord::SessionSource { path } => {
                let path = self.resolve(path);
                open_session_file(path, self.streams, stage, self.depth + 1)
            }
            KindRecord::GroupSource { session } => {
                let inner = build(session, self.streams, stage, self.depth + 1, self.base_dir)?;
                SourceKind::SessionGroup { session: Box::new(inner) }
            }
            KindRecord::RenderSource => SourceKind::Render,
            KindRecord::PatternSource { pattern, resolution } => {
                let resolution = UVec2::from_array(*resolution).max(UVec2::ONE);
                SourceKind::Pattern {
                    pattern: *pattern,
                    resolution,
                    stream: self.streams.open_pattern(*pattern, resolution),
                }
            }
            KindRecord::DeviceSource { device } => {
                SourceKind::Device { device: device.clone(), stream: self.streams.open_device(device) }
            }
            KindRecord::NetworkSource { connection } => SourceKind::Network {
                connection: connection.clone(),
                stream: self.streams.open_network(connection),
            },
            KindRecord::GenericStreamSource { description } => SourceKind::Stream {
                description: description.clone(),
                stream: self.streams.open_pipeline(description),
            },
            KindRecord::CloneSource { .. } => {
                return Err(MixError::invalid_record("clone record needs an origin in the session"));
            }
        })
    }
}

/// Session-file source content, loaded synchronously. A file that cannot
/// be loaded gives a failed source rather than an error.
pub fn open_session_file(path: PathBuf, streams: &dyn StreamFactory, stage: StageConfig, depth: usize) -> SourceKind {
    if depth > MAX_NESTING {
        warn!("{}: sessions nested too deep", path.display());
        return SourceKind::SessionFile { path, session: None, failed: true };
    }
    match load_nested(&path, streams, stage, depth) {
        Ok(s) => SourceKind::SessionFile { path, session: Some(Box::new(s)), failed: false },
        Err(e) => {
            warn!("Cannot open nested session: {}", e);
            SourceKind::SessionFile { path, session: None, failed: true }
        }
    }
}

fn copy_transform(dst: &mut Transform, src: &Transform) {
    *dst = *src;
}

/// Restore a source from its record. Kind parameters that changed reopen
/// the content.
pub fn apply_record(source: &mut Source, record: &SourceRecord, streams: &dyn StreamFactory) {
    source.set_name(&record.name);
    source.set_locked(record.locked);

    for (view, t) in [
        (ViewMode::Mixing, &record.mixing),
        (ViewMode::Geometry, &record.geometry),
        (ViewMode::Layer, &record.layer),
        (ViewMode::Appearance, &record.appearance),
    ] {
        copy_transform(&mut source.group_mut(view).transform, t);
    }

    let blending = source.blending_shader_mut();
    blending.color = record.blending.color;
    blending.blending = record.blending.mode;

    if let Some(mask) = &record.mask {
        *source.mask_shader_mut() = mask.shader.clone();
        if let Some(data) = &mask.image {
            match hex::decode(data).map_err(|e| MixError::invalid_record(e.to_string())).and_then(|b| {
                FrameBufferImage::decode(&b)
            }) {
                Ok(img) => source.set_mask(img),
                Err(e) => warn!("Mask of '{}' not restored: {}", record.name, e),
            }
        }
    }

    if let Some(p) = &record.processing {
        let shader = source.processing_shader_mut();
        let i_transform = shader.i_transform;
        *shader = ImageProcessingShader { i_transform, ..p.params.clone() };
        source.set_image_processing_enabled(p.enabled);
    }

    apply_kind(source, &record.kind, streams);
}

fn apply_kind(source: &mut Source, record: &KindRecord, streams: &dyn StreamFactory) {
    match (source.kind_mut(), record) {
        (SourceKind::Media { path, player, stream }, KindRecord::MediaSource { uri, player: p }) => {
            if path != uri {
                debug!("Media path changed to {}", uri.display());
                *stream = streams.open_media(uri);
                path.clone_from(uri);
            }
            player.clone_from(p);
        }
        (SourceKind::Pattern { pattern, resolution, stream }, KindRecord::PatternSource { pattern: p, resolution: r }) => {
            let r = UVec2::from_array(*r).max(UVec2::ONE);
            if *pattern != *p || *resolution != r {
                *stream = streams.open_pattern(*p, r);
                *pattern = *p;
                *resolution = r;
            }
        }
        (SourceKind::Device { device, stream }, KindRecord::DeviceSource { device: d }) if device != d => {
            *stream = streams.open_device(d);
            device.clone_from(d);
        }
        (SourceKind::Network { connection, stream }, KindRecord::NetworkSource { connection: c }) if connection != c => {
            *stream = streams.open_network(c);
            connection.clone_from(c);
        }
        (SourceKind::Stream { description, stream }, KindRecord::GenericStreamSource { description: d })
            if description != d =>
        {
            *stream = streams.open_pipeline(d);
            description.clone_from(d);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::shaders::MaskShape;
    use crate::entities::stream::{LoopMode, SyntheticStreams};
    use chrono::FixedOffset;
    use glam::{Vec2, Vec3};

    fn session_with_media(streams: &SyntheticStreams) -> (Session, Uuid) {
        let mut session = Session::default();
        let loader = SessionLoader::new(&mut session, streams);
        let record = SourceRecord {
            id: Uuid::new_v4(),
            name: "clip".into(),
            locked: false,
            kind: KindRecord::MediaSource { uri: "clip.mp4".into(), player: MediaPlayerState::default() },
            mixing: Transform::IDENTITY,
            geometry: Transform::IDENTITY,
            layer: Transform::IDENTITY,
            appearance: Transform::IDENTITY,
            blending: BlendingRecord { color: Vec4::ONE, mode: BlendMode::Opacity },
            mask: None,
            processing: None,
        };
        let s = loader.create(&record, record.id).unwrap();
        let id = session.add_source(s);
        (session, id)
    }

    fn edit(s: &mut Source) {
        let g = &mut s.group_mut(ViewMode::Geometry).transform;
        g.translation = Vec3::new(0.3, -0.2, 0.0);
        g.rotation = Vec3::new(0.0, 0.0, 0.7);
        g.scale = Vec3::new(1.5, 0.5, 1.0);
        g.crop = Vec3::new(0.8, 0.9, 1.0);
        s.group_mut(ViewMode::Mixing).transform.translation = Vec3::new(0.4, 0.1, 0.0);
        s.group_mut(ViewMode::Layer).transform.translation = Vec3::new(-4.0, -2.0, 4.0);
        s.group_mut(ViewMode::Appearance).transform.scale = Vec3::new(2.0, 2.0, 1.0);
        s.blending_shader_mut().blending = BlendMode::Screen;
        s.blending_shader_mut().color = Vec4::new(1.0, 0.5, 0.5, 0.8);
        *s.mask_shader_mut() = MaskShader {
            mode: MaskMode::Shape,
            shape: MaskShape::Horizontal,
            blur: 0.2,
            option: 1,
            size: Vec2::new(0.4, 0.6),
        };
        s.processing_shader_mut().contrast = 0.25;
        s.processing_shader_mut().chromakey = Vec4::new(0.1, 0.9, 0.1, 1.0);
        s.set_image_processing_enabled(false);
        s.set_locked(true);
    }

    #[test]
    fn test_record_restores_source() {
        let streams = SyntheticStreams::default();
        let (mut session, id) = session_with_media(&streams);
        edit(session.find_mut(id).unwrap());

        let record = SourceRecord::from_source(session.find(id).unwrap(), &session).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let back: SourceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);

        let mut fresh = Session::default();
        let loader = SessionLoader::new(&mut fresh, &streams);
        let mut s = loader.create(&back, back.id).unwrap();
        apply_record(&mut s, &back, &streams);

        let orig = session.find(id).unwrap();
        for view in [ViewMode::Mixing, ViewMode::Geometry, ViewMode::Layer, ViewMode::Appearance] {
            assert_eq!(s.group(view).transform, orig.group(view).transform, "{view:?}");
        }
        assert_eq!(s.blending_shader().blending, BlendMode::Screen);
        assert_eq!(s.blending_shader().color, orig.blending_shader().color);
        assert_eq!(s.mask_shader(), orig.mask_shader());
        assert!(!s.image_processing_enabled());
        assert!(s.processing_shader().same_parameters(orig.processing_shader()));
        assert!(s.locked());
        assert_eq!(s.id(), id);
    }

    #[test]
    fn test_painted_mask_is_embedded() {
        let streams = SyntheticStreams { resolution: UVec2::new(64, 32), ..Default::default() };
        let (mut session, id) = session_with_media(&streams);
        session.update(16.0, None);
        session.find_mut(id).unwrap().mask_shader_mut().mode = MaskMode::Paint;

        let record = SourceRecord::from_source(session.find(id).unwrap(), &session).unwrap();
        let data = record.mask.as_ref().and_then(|m| m.image.clone()).unwrap();
        let img = FrameBufferImage::decode(&hex::decode(data).unwrap()).unwrap();
        assert_eq!((img.rgb.width(), img.rgb.height()), (32, 16));
    }

    #[test]
    fn test_document_roundtrip_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("show.mix");
        let streams = SyntheticStreams::default();

        let (mut session, id) = session_with_media(&streams);
        let clone = session.clone_source(id).unwrap();
        let clone = session.add_source(clone);
        let mut render = Source::new(SourceKind::Render, StageConfig::default());
        render.set_name("Render");
        let render = session.add_source(render);
        session.link(&[id, render]);
        session.set_resolution(UVec2::new(1920, 1080));
        let mut cam = Transform::IDENTITY;
        cam.scale = Vec3::splat(0.5);
        session.set_config(ViewMode::Layer, cam);

        SessionDocument::from_session(&session).unwrap().write(&path).unwrap();
        let loaded = load(&path, &streams, StageConfig::default()).unwrap();

        assert_eq!(loaded.ids(), vec![id, render, clone]);
        assert_eq!(loaded.find(clone).unwrap().origin(), Some(id));
        assert_eq!(loaded.find(id).unwrap().clones(), &[clone]);
        assert_eq!(loaded.resolution(), UVec2::new(1920, 1080));
        assert_eq!(loaded.config(ViewMode::Layer), cam);
        assert_eq!(loaded.mixing_groups().len(), 1);
        assert_eq!(loaded.filename(), Some(path.as_path()));
        assert!(info(&path).unwrap().starts_with("3 sources\n1920x1080\n"));
    }

    #[test]
    fn test_not_a_session() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("other.json");
        fs::write(&path, r#"{"hello": 1}"#).unwrap();
        assert!(matches!(SessionDocument::read(&path), Err(MixError::NotASession(_))));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(SessionDocument::read(&path), Err(MixError::Parse { .. })));

        let missing = tmp.path().join("missing.mix");
        assert!(matches!(load(&missing, &SyntheticStreams::default(), StageConfig::default()), Err(MixError::Io { .. })));
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let streams = SyntheticStreams::default();
        let mut session = Session::default();
        let orphan = SourceRecord {
            id: Uuid::new_v4(),
            name: "lost".into(),
            locked: false,
            kind: KindRecord::CloneSource { origin: "nobody".into() },
            mixing: Transform::IDENTITY,
            geometry: Transform::IDENTITY,
            layer: Transform::IDENTITY,
            appearance: Transform::IDENTITY,
            blending: BlendingRecord { color: Vec4::ONE, mode: BlendMode::Opacity },
            mask: None,
            processing: None,
        };
        let mut pattern = orphan.clone();
        pattern.id = Uuid::new_v4();
        pattern.name = "bars".into();
        pattern.kind = KindRecord::PatternSource { pattern: 9, resolution: [320, 240] };

        let loaded = SessionLoader::new(&mut session, &streams).load(&[orphan, pattern.clone()]);
        assert_eq!(loaded, vec![pattern.id]);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_clone_or_create() {
        let streams = SyntheticStreams::default();
        let (mut session, id) = session_with_media(&streams);
        session.find_mut(id).unwrap().group_mut(ViewMode::Layer).transform.translation.z = 3.0;
        let mut record = SourceRecord::from_source(session.find(id).unwrap(), &session).unwrap();
        record.mixing.translation = Vec3::new(0.2, 0.2, 0.0);

        // id known: becomes a clone placed slightly above
        let mut loader = SessionLoader::new(&mut session, &streams);
        let c = loader.clone_or_create(&record).unwrap();
        assert_eq!(c.origin(), Some(id));
        assert!((c.depth() - 3.2).abs() < 1e-6);
        let m = c.group(ViewMode::Mixing).transform.translation;
        assert_eq!((m.x, m.y), (-1.0, 1.0));

        // id unknown: a new media source with another id
        record.id = Uuid::new_v4();
        let n = loader.clone_or_create(&record).unwrap();
        assert!(!n.is_clone());
        assert_ne!(n.id(), record.id);
        assert!(matches!(n.kind(), SourceKind::Media { .. }));
    }

    #[test]
    fn test_apply_reopens_changed_media() {
        let streams = SyntheticStreams { broken: vec![PathBuf::from("bad.mov")], ..Default::default() };
        let (mut session, id) = session_with_media(&streams);
        let mut record = SourceRecord::from_source(session.find(id).unwrap(), &session).unwrap();
        record.kind = KindRecord::MediaSource {
            uri: "bad.mov".into(),
            player: MediaPlayerState { loop_mode: LoopMode::Bidirectional, ..Default::default() },
        };
        let s = session.find_mut(id).unwrap();
        apply_record(s, &record, &streams);
        assert!(s.failed());
        assert_eq!(s.kind().path(), Some(Path::new("bad.mov")));
    }

    #[test]
    fn test_date_format() {
        assert_eq!(format_date(0, &Utc), "01/01/1970 @ 00:00");
        assert_eq!(format_date(1_700_000_000, &Utc), "14/11/2023 @ 22:13");
        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(format_date(1_700_000_000, &east), "15/11/2023 @ 00:13");
        assert!(unix_now() > 1_700_000_000);
    }
}
