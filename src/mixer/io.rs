//! Session I/O for Mixer.
//!
//! Contains methods for:
//! - Saving in the background (save, saveas)
//! - Loading and importing in the background (load, import, open)
//! - Merging sessions into the live one (merge, merge_session_source)
//! - Clipboard (copy_selection, paste)
//! - Undo and redo through stored session snapshots

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::TryRecvError;
use glam::Mat4;
use log::{debug, info, trace, warn};
use uuid::Uuid;

use super::{Mixer, SaveOutcome, SessionFileJob};
use crate::core::mixer_events::{NotifyEvent, SessionSavedEvent};
use crate::entities::session_io::{self, APP_NAME, SessionLoader};
use crate::entities::{Session, SessionDocument, Source, SourceKind};
use crate::error::{MixError, MixResult};
use crate::utils::media;
use crate::views::ViewMode;

/// Per-source adjustment applied while sources move into the live session.
type Adjust<'a> = &'a dyn Fn(&mut Source);

impl Mixer {
    // === Save ===

    /// Save to the current session file.
    pub fn save(&mut self) -> MixResult<()> {
        let Some(path) = self.session.filename().map(Path::to_path_buf) else {
            return Err(MixError::Other(anyhow::anyhow!("session has no file name, use saveas")));
        };
        self.saveas(path)
    }

    /// Write the session to `path` in the background. The document is
    /// taken now; the file is written under the session save lock.
    pub fn saveas(&mut self, path: impl Into<PathBuf>) -> MixResult<()> {
        let mut path = path.into();
        if !media::is_session(&path) {
            path.set_extension(media::SESSION_EXT);
        }

        self.views.store(&mut self.session);
        let document = SessionDocument::from_session(&self.session)?;
        let lock = self.session.save_lock();
        let tx = self.save_tx.clone();
        self.saves_pending += 1;
        info!("Saving session {}", path.display());

        self.workers.execute(move || {
            let result = {
                let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
                document.write(&path)
            };
            // the mixer may be gone already
            let _ = tx.send(SaveOutcome { path, result, lock });
        });
        Ok(())
    }

    /// Handle finished saves. The file name is only applied if the saved
    /// session is still the live one.
    pub(super) fn drain_saves(&mut self) {
        while let Ok(outcome) = self.save_rx.try_recv() {
            self.saves_pending = self.saves_pending.saturating_sub(1);
            let SaveOutcome { path, result, lock } = outcome;
            match result {
                Ok(()) => {
                    if Arc::ptr_eq(&lock, &self.session.save_lock()) {
                        self.session.set_filename(Some(path.clone()));
                    }
                    self.settings.recent_sessions.push(path.display().to_string());
                    self.bus.emit(SessionSavedEvent(path.clone()));
                    self.notify(NotifyEvent::info(format!("Session {} saved.", path.display())));
                }
                Err(e) => self.notify(NotifyEvent::warning(format!("Failed to save session: {}", e))),
            }
        }
    }

    // === Load and import ===

    /// Load a session in the background; it replaces the live one once
    /// ready. Ignored while another load is in flight.
    pub fn load(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.loader.is_some() {
            warn!("Already loading a session, {} ignored", path.display());
            return;
        }
        info!("Loading session {}", path.display());
        self.loader = Some(self.spawn_session_job(path, 0));
    }

    /// Load a session in the background and merge its sources into the
    /// live one. Ignored while another import is in flight.
    pub fn import(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.importer.is_some() {
            warn!("Already importing a session, {} ignored", path.display());
            return;
        }
        info!("Importing session {}", path.display());
        self.importer = Some(self.spawn_session_job(path, 0));
    }

    fn spawn_session_job(&self, path: PathBuf, depth: usize) -> super::SessionJob {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let streams = Arc::clone(&self.streams);
        let stage = self.settings.stage;
        self.workers.execute(move || {
            let result = session_io::load_nested(&path, streams.as_ref(), stage, depth);
            let _ = tx.send(result);
        });
        rx
    }

    /// Open a session file: through the transition view when smooth
    /// transitions are on, as a plain background load otherwise.
    pub fn open(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.settings.smooth_transition {
            self.load(path);
            return;
        }

        let kind = SourceKind::SessionFile { path: path.clone(), session: None, failed: false };
        let mut source = Source::new(kind, self.settings.stage);
        source.set_name(&media::base_filename(&path));
        let id = self.insert_source(source, Some(ViewMode::Transition));
        self.read_session_file(id, path, true);
    }

    /// Read the file of session source `id` in the background. The source
    /// stays uninitialized until its session arrives.
    pub(super) fn read_session_file(&mut self, id: Uuid, path: PathBuf, transition: bool) {
        debug!("Reading session source file {}", path.display());
        let job = self.spawn_session_job(path.clone(), 1);
        self.session_files.push(SessionFileJob { source: id, path, job, transition });
    }

    /// Hand finished session files to their sources.
    pub(super) fn drain_session_files(&mut self) {
        let mut waiting = Vec::with_capacity(self.session_files.len());
        for pending in std::mem::take(&mut self.session_files) {
            let result = match pending.job.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => {
                    waiting.push(pending);
                    continue;
                }
                Err(TryRecvError::Disconnected) => {
                    Err(MixError::Other(anyhow::anyhow!("session worker stopped without result")))
                }
            };
            self.resolve_session_file(pending, result);
        }
        self.session_files.extend(waiting);
    }

    fn resolve_session_file(&mut self, pending: SessionFileJob, result: MixResult<Session>) {
        let SessionFileJob { source: id, path, transition, .. } = pending;
        let label = path.display().to_string();
        let Some(source) = self.find_source_mut(id) else {
            debug!("Session file {} read for a source gone since", label);
            return;
        };

        match result {
            Ok(session) => {
                info!("Session source '{}' ready ({} sources)", source.name(), session.len());
                source.kind_mut().resolve_session_file(Some(session));
                source.touch();
                if transition && self.current_view == ViewMode::Transition && self.views.transition.source().is_none() {
                    self.views.transition.attach(id);
                }
            }
            Err(e) => {
                source.kind_mut().resolve_session_file(None);
                if transition {
                    self.settings.recent_sessions.remove(&label);
                    self.delete_source(id, false);
                    if self.current_view == ViewMode::Transition {
                        self.set_view(ViewMode::Mixing);
                    }
                } else {
                    // removed as a failed source at the next update
                    self.settings.recent_imports.remove(&label);
                }
                self.notify(NotifyEvent::warning(format!("Failed to load session {}: {}", label, e)));
            }
        }
    }

    /// Source `id` wherever it waits: live, concealed or queued.
    fn find_source_mut(&mut self, id: Uuid) -> Option<&mut Source> {
        if self.session.contains(id) {
            return self.session.find_mut(id);
        }
        if self.stash.contains_key(&id) {
            return self.stash.get_mut(&id);
        }
        self.candidates.iter_mut().find(|s| s.id() == id)
    }

    /// Header summary of a session file.
    pub fn session_info(&self, path: &Path) -> MixResult<String> {
        session_io::info(path)
    }

    // === Merge ===

    /// Move every source of `incoming` into the live session.
    pub fn merge(&mut self, incoming: Session) {
        let count = self.absorb(incoming, &|_: &mut Source| {});
        let label = format!("{} sources imported.", count);
        self.store_history(&label);
        self.notify(NotifyEvent::info(label));
    }

    /// Replace session source `id` by the sources it holds, composed with
    /// its alpha, depth and geometry.
    pub fn merge_session_source(&mut self, id: Uuid) {
        let Some(wrapper) = self.session.find(id) else {
            return;
        };
        if wrapper.kind().session().is_none() {
            warn!("Source '{}' holds no session to import", wrapper.name());
            return;
        }
        let name = wrapper.name().to_string();
        let alpha = wrapper.alpha();
        let depth = wrapper.depth();
        let geometry: Mat4 = wrapper.group(ViewMode::Geometry).transform.matrix();
        let max_depth = self.settings.stage.max_depth.max(f32::EPSILON);

        let Some(inner) = self.session.find_mut(id).and_then(|w| w.kind_mut().take_session()) else {
            return;
        };
        self.delete_source(id, false);

        let adjust = move |s: &mut Source| {
            s.set_alpha(s.alpha() * alpha);
            s.set_depth(depth + s.depth() / max_depth);
            let g = &mut s.group_mut(ViewMode::Geometry).transform;
            let m = geometry * g.matrix();
            g.set_from_matrix(m);
        };
        let count = self.absorb(inner, &adjust);
        info!("Session source '{}' expanded into {} sources", name, count);
        self.store_history(&format!("{} expanded", name));
    }

    /// Expand session source `id` at the next update.
    pub fn import_session_source(&mut self, id: Uuid) {
        let holds_session = self.session.find(id).is_some_and(|s| s.kind().session().is_some());
        if holds_session && !self.session_sources_to_import.contains(&id) {
            self.session_sources_to_import.push(id);
        }
    }

    /// Move the sources of `incoming` into the live session, originals
    /// before clones, with unique names and fresh ids where needed.
    /// Mixing groups are rebuilt. Returns the number of sources moved.
    fn absorb(&mut self, mut incoming: Session, adjust: Adjust<'_>) -> usize {
        let groups: Vec<Vec<Uuid>> = incoming.mixing_groups().iter().map(|g| g.members().to_vec()).collect();
        let mut ids = incoming.ids();
        ids.sort_by_key(|id| incoming.find(*id).is_some_and(Source::is_clone));

        let mut renamed = HashMap::new();
        let mut count = 0;
        for id in ids {
            let Some(mut source) = incoming.remove_source(id) else {
                continue;
            };
            if let SourceKind::Clone { origin: Some(origin) } = source.kind_mut()
                && let Some(new) = renamed.get(&*origin)
            {
                *origin = *new;
            }
            if self.session.contains(id) || self.stash.contains_key(&id) {
                let new = source.renew_id();
                trace!("Source id {} already in use, now {}", id, new);
                renamed.insert(id, new);
            }
            let name = self.session.unique_name(source.name(), None);
            source.set_name(&name);
            adjust(&mut source);
            let new_id = self.session.add_source(source);
            self.attach(new_id);
            count += 1;
        }

        for members in groups {
            let members: Vec<Uuid> = members.iter().map(|id| *renamed.get(id).unwrap_or(id)).collect();
            self.session.link(&members);
        }
        self.views.request_deep_update();
        count
    }

    // === Clipboard ===

    /// Selected sources as a session document in JSON.
    pub fn copy_selection(&self) -> MixResult<String> {
        let mut document = SessionDocument::from_session(&self.session)?;
        document.sources.retain(|r| self.selection.contains(r.id));
        document.header.size = document.sources.len();
        document.mixing_groups.clear();
        document.to_json()
    }

    /// Queue the sources described by `text`: a clone for each source
    /// still in the session, a new source otherwise. Returns how many
    /// were queued.
    pub fn paste(&mut self, text: &str) -> usize {
        let document: SessionDocument = match serde_json::from_str(text) {
            Ok(d) => d,
            Err(e) => {
                debug!("Clipboard holds no sources: {}", e);
                return 0;
            }
        };
        if document.header.app != APP_NAME {
            debug!("Clipboard from '{}' ignored", document.header.app);
            return 0;
        }

        let created: Vec<Source> = {
            let mut loader = SessionLoader::new(&mut self.session, self.streams.as_ref());
            document.sources.iter().filter_map(|r| loader.clone_or_create(r)).collect()
        };
        let count = created.len();
        for source in created {
            self.add_source(source);
        }
        count
    }

    // === Undo ===

    pub fn undo(&mut self) -> bool {
        let Some(step) = self.history.undo() else {
            return false;
        };
        let document = step.document.clone();
        debug!("Undo to '{}'", step.label);
        self.restore(&document);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(step) = self.history.redo() else {
            return false;
        };
        let document = step.document.clone();
        debug!("Redo '{}'", step.label);
        self.restore(&document);
        true
    }

    /// Bring the live session to the state of `document`: sources it does
    /// not list are deleted, listed ones are updated in place or created.
    fn restore(&mut self, document: &SessionDocument) {
        let keep: HashSet<Uuid> = document.sources.iter().map(|r| r.id).collect();

        for record in &document.sources {
            if self.stash.contains_key(&record.id) {
                self.uncover(record.id);
            }
        }

        let mut extra: Vec<Uuid> = self.session.ids().into_iter().filter(|id| !keep.contains(id)).collect();
        extra.sort_by_key(|id| !self.session.find(*id).is_some_and(Source::is_clone));
        for id in extra {
            self.detach(id);
            self.session.delete_source(id);
        }

        let groups: Vec<Uuid> = self.session.mixing_groups().iter().map(|g| g.id()).collect();
        for g in groups {
            self.session.unlink(g);
        }

        let loaded = SessionLoader::new(&mut self.session, self.streams.as_ref()).load(&document.sources);
        for id in loaded {
            if !self.views.is_attached(id) {
                self.attach(id);
            }
        }
        for members in &document.mixing_groups {
            self.session.link(members);
        }
        self.session.set_fading(document.fading);
        self.views.request_deep_update();
    }
}
