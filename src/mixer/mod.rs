//! Mixer module - the live session and everything orchestrating it.
//!
//! Submodules add to `Mixer`:
//! - `factory` - source creation, one factory per kind
//! - `lifecycle` - insertion, deletion, replacement, concealment, groups
//! - `selection` - current source and selection
//! - `io` - save/load/import, clipboard, undo
//!
//! All mixer state lives on the main loop thread. Loading and importing run
//! as one background job each and come back through single-slot channels;
//! saving writes a snapshot in the background under the session save lock.

mod factory;
mod io;
mod lifecycle;
mod selection;

pub use lifecycle::FrameGrabber;
pub use selection::Selection;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use glam::UVec2;
use indexmap::IndexMap;
use log::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::{Settings, StageConfig};
use crate::core::History;
use crate::core::event_bus::EventBus;
use crate::core::mixer_events::{NotifyEvent, SessionLoadedEvent, SessionSwappedEvent, SourceFailedEvent};
use crate::core::workers::Workers;
use crate::entities::{Session, Source, SourceKind, StreamFactory};
use crate::error::{MixError, MixResult};
use crate::views::{View, ViewMode, Views};

/// Result of a background session load or import.
type SessionJob = Receiver<MixResult<Session>>;

/// File of a session source being read in the background.
#[derive(Debug)]
struct SessionFileJob {
    source: Uuid,
    path: PathBuf,
    job: SessionJob,
    /// Fade the session in through the transition view once read.
    transition: bool,
}

/// Result of a background save.
#[derive(Debug)]
struct SaveOutcome {
    path: PathBuf,
    result: MixResult<()>,
    /// Lock of the saved session, to recognize it once it comes back.
    lock: Arc<Mutex<()>>,
}

pub struct Mixer {
    session: Session,
    /// Staged replacement, swapped in at the next update.
    back_session: Option<Session>,
    swap_requested: bool,
    /// Superseded sessions, freed one per update.
    garbage: VecDeque<Session>,

    /// Sources waiting for insertion, one per update.
    candidates: VecDeque<Source>,
    /// Session sources whose content is merged at the next update.
    session_sources_to_import: Vec<Uuid>,
    /// Concealed sources, out of the session but shown in mixing background.
    stash: IndexMap<Uuid, Source>,

    current: Option<Uuid>,
    selection: Selection,
    views: Views,
    current_view: ViewMode,

    history: History,
    settings: Settings,
    streams: Arc<dyn StreamFactory>,
    workers: Workers,
    bus: EventBus,

    loader: Option<SessionJob>,
    importer: Option<SessionJob>,
    session_files: Vec<SessionFileJob>,
    save_tx: Sender<SaveOutcome>,
    save_rx: Receiver<SaveOutcome>,
    saves_pending: usize,

    grabbers: Vec<Box<dyn FrameGrabber>>,

    last_update: Option<Instant>,
    dt: f32,
    fps: f32,
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("sources", &self.session.len())
            .field("current", &self.current)
            .field("view", &self.current_view)
            .field("swap_requested", &self.swap_requested)
            .field("loading", &self.loader.is_some())
            .field("importing", &self.importer.is_some())
            .field("session_files", &self.session_files.len())
            .finish()
    }
}

impl Mixer {
    /// New mixer on an empty session. With `load_at_start`, the most
    /// recent session is loaded in the background.
    pub fn new(settings: Settings, streams: Arc<dyn StreamFactory>) -> Self {
        let (save_tx, save_rx) = crossbeam_channel::unbounded();
        let session = Session::new(UVec2::from_array(settings.resolution).max(UVec2::ONE), settings.stage);
        let start_view = match settings.current_view {
            ViewMode::Transition => ViewMode::Mixing,
            v => v,
        };

        let mut mixer = Self {
            session,
            back_session: None,
            swap_requested: false,
            garbage: VecDeque::new(),
            candidates: VecDeque::new(),
            session_sources_to_import: Vec::new(),
            stash: IndexMap::new(),
            current: None,
            selection: Selection::default(),
            views: Views::new(),
            current_view: ViewMode::Mixing,
            history: History::default(),
            settings,
            streams,
            workers: Workers::new(2),
            bus: EventBus::new(),
            loader: None,
            importer: None,
            session_files: Vec::new(),
            save_tx,
            save_rx,
            saves_pending: 0,
            grabbers: Vec::new(),
            last_update: None,
            dt: 0.0,
            fps: 60.0,
        };

        if mixer.settings.load_at_start
            && let Some(recent) = mixer.settings.recent_sessions.front().map(PathBuf::from)
        {
            mixer.load(recent);
        }
        mixer.store_history("Session start");
        mixer.set_view(start_view);
        mixer
    }

    // === Accessors ===

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn stage(&self) -> StageConfig {
        self.settings.stage
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn views(&self) -> &Views {
        &self.views
    }

    pub fn views_mut(&mut self) -> &mut Views {
        &mut self.views
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Milliseconds between the last two updates.
    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_some()
    }

    pub fn is_importing(&self) -> bool {
        self.importer.is_some()
    }

    /// Session sources still waiting for their file.
    pub fn pending_session_files(&self) -> usize {
        self.session_files.len()
    }

    pub fn is_saving(&self) -> bool {
        self.saves_pending > 0
    }

    /// A session swap will happen at the next update.
    pub fn swap_pending(&self) -> bool {
        self.swap_requested && self.back_session.is_some()
    }

    pub fn pending_candidates(&self) -> usize {
        self.candidates.len()
    }

    pub fn garbage_len(&self) -> usize {
        self.garbage.len()
    }

    fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.stage.poll_timeout_ms)
    }

    fn notify(&self, event: NotifyEvent) {
        match event.level {
            log::Level::Warn | log::Level::Error => warn!("{}", event.message),
            _ => info!("{}", event.message),
        }
        self.bus.emit(event);
    }

    // === Frame ===

    /// Update with the time elapsed since the previous call.
    pub fn update(&mut self) {
        let now = Instant::now();
        let dt = self
            .last_update
            .map(|t| now.duration_since(t).as_secs_f32() * 1000.0)
            .unwrap_or(0.0);
        self.last_update = Some(now);
        self.advance(dt);
    }

    /// One frame of `dt` milliseconds, in a fixed order: free one old
    /// session, drain background jobs and session files, imports, swap, insert one
    /// candidate, update the session, handle a failed source, update views.
    pub fn advance(&mut self, dt: f32) {
        // superseded sessions wait one frame before being dropped
        if let Some(old) = self.garbage.pop_front() {
            trace!("Freeing superseded session ({} sources)", old.len());
            drop(old);
        }

        self.drain_saves();

        if let Some(job) = self.importer.take() {
            match self.poll_job(&job) {
                Some(Ok(session)) => self.merge(session),
                Some(Err(e)) => self.notify(NotifyEvent::warning(format!("Failed to import session: {}", e))),
                None => self.importer = Some(job),
            }
        }

        if let Some(job) = self.loader.take() {
            match self.poll_job(&job) {
                Some(Ok(session)) => self.set(session),
                Some(Err(e)) => {
                    if let Some(path) = e.path() {
                        self.settings.recent_sessions.remove(&path.display().to_string());
                    }
                    self.notify(NotifyEvent::warning(format!("Failed to load session: {}", e)));
                }
                None => self.loader = Some(job),
            }
        }

        self.drain_session_files();

        if let Some(id) = self.session_sources_to_import.pop() {
            self.merge_session_source(id);
        }

        if self.swap_requested {
            self.swap_requested = false;
            if self.back_session.is_some() {
                self.swap();
                if let Some(f) = self.session.filename() {
                    self.settings.recent_sessions.push(f.display().to_string());
                }
            }
        }

        // only the last of several queued candidates becomes current
        if let Some(candidate) = self.candidates.pop_front() {
            let view = if self.candidates.is_empty() { Some(ViewMode::Mixing) } else { None };
            self.insert_source(candidate, view);
        }

        self.dt = dt;
        if dt > 1.0 {
            self.fps = 0.95 * self.fps + 0.05 * (1000.0 / dt);
        }
        self.session.update(dt, self.current);

        let frame = self.session.frame();
        for grabber in self.grabbers.iter_mut() {
            grabber.grab(frame, dt);
        }
        self.grabbers.retain(|g| !g.finished());

        if let Some(failed) = self.session.failed_source() {
            self.handle_failed_source(failed);
        }

        self.views.update(dt, &self.session);
        self.update_transition();
    }

    /// Completed result of a background job, if any.
    fn poll_job(&self, job: &SessionJob) -> Option<MixResult<Session>> {
        match job.recv_timeout(self.poll_timeout()) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(Err(MixError::Other(anyhow::anyhow!("session worker stopped without result"))))
            }
        }
    }

    /// Remove a source that failed this frame. Media sources leave the
    /// recent imports; a render loopback gets one recreation attempt.
    fn handle_failed_source(&mut self, id: Uuid) {
        let Some(source) = self.session.find(id) else {
            return;
        };
        let name = source.name().to_string();
        let media_path = match source.kind() {
            SourceKind::Media { path, .. } => Some(path.display().to_string()),
            _ => None,
        };
        let retry = matches!(source.kind(), SourceKind::Render) && !source.recreated();

        if let Some(path) = media_path {
            self.settings.recent_imports.remove(&path);
        }
        let recreated = retry && self.recreate_source(id);
        warn!("Source '{}' failed{}", name, if recreated { ", recreated" } else { "" });
        self.bus.emit(SourceFailedEvent { id, name: name.clone(), recreated });
        if !recreated {
            self.delete_source(id, false);
            self.notify(NotifyEvent::warning(format!("Source {} failed and was removed.", name)));
        }
    }

    /// Fade the transition source in; once complete, its session takes over.
    fn update_transition(&mut self) {
        if self.current_view != ViewMode::Transition {
            return;
        }
        let Some(id) = self.views.transition.source() else {
            return;
        };
        let progress = self.views.transition.progress();
        self.views.mixing.set_alpha(&mut self.session, id, Some(progress));
        if self.views.transition.finished() {
            debug!("Transition complete");
            self.set_view(ViewMode::Mixing);
        }
    }

    // === Session swap ===

    /// Replace the live session at the next update.
    pub fn set(&mut self, session: Session) {
        if let Some(back) = self.back_session.replace(session) {
            self.garbage.push_back(back);
        }
        self.swap_requested = true;
    }

    /// Start over with an empty session at the next update.
    pub fn clear(&mut self) {
        let res = UVec2::from_array(self.settings.resolution).max(UVec2::ONE);
        self.set(Session::new(res, self.settings.stage));
        self.views.request_deep_update();
        info!("New session ready.");
    }

    /// Close the session, through a transition to empty when enabled.
    pub fn close(&mut self) {
        if self.settings.smooth_transition {
            let stage = self.settings.stage;
            let empty = Session::new(self.session.resolution(), stage);
            let mut ts = Source::new(
                SourceKind::SessionFile { path: PathBuf::new(), session: Some(Box::new(empty)), failed: false },
                stage,
            );
            ts.set_name("Empty");
            let id = self.insert_source(ts, Some(ViewMode::Transition));
            self.views.transition.attach(id);
        } else {
            self.clear();
        }
    }

    /// Exchange front and back sessions. Every source of the old session
    /// leaves the views before any source of the new one is attached.
    fn swap(&mut self) {
        let Some(back) = self.back_session.take() else {
            return;
        };

        self.clear_selection();
        for id in self.session.ids() {
            self.detach(id);
        }
        // concealed sources go away with their session
        for (id, source) in std::mem::take(&mut self.stash) {
            self.views.detach(id);
            self.session.add_source(source);
        }

        let mut old = std::mem::replace(&mut self.session, back);

        for id in self.session.ids() {
            self.attach(id);
        }
        self.views.restore(&self.session);
        let fading = old.fading().max(self.session.fading());
        self.session.set_fading(fading);
        old.set_fading(fading);

        self.current = None;
        self.garbage.push_back(old);
        self.views.request_deep_update();

        self.history.clear();
        self.store_history("Session start");

        let sources = self.session.len();
        self.bus.emit(SessionSwappedEvent { sources });
        self.bus.emit(SessionLoadedEvent { filename: self.session.filename().map(PathBuf::from), sources });
        let name = self
            .session
            .filename()
            .map(|f| f.display().to_string())
            .unwrap_or_else(|| "untitled".to_string());
        self.notify(NotifyEvent::info(format!("Session {} loaded. {} source(s) created.", name, sources)));
    }

    // === Views ===

    pub fn current_view(&self) -> ViewMode {
        self.current_view
    }

    /// View for `mode`; the rendering space maps to the current view.
    pub fn view(&self, mode: ViewMode) -> Option<&dyn View> {
        match mode {
            ViewMode::Rendering => self.views.get(self.current_view),
            m => self.views.get(m),
        }
    }

    /// Switch the active view. Leaving the transition view hands its
    /// session over; sources the new view cannot select are deselected.
    pub fn set_view(&mut self, mode: ViewMode) {
        if self.current_view == ViewMode::Transition {
            let incoming = self
                .views
                .transition
                .detach()
                .and_then(|id| self.session.find_mut(id))
                .and_then(|s| s.kind_mut().take_session());
            match incoming {
                Some(session) => self.set(session),
                None => info!("Transition interrupted: Session source added."),
            }
        }

        self.current_view = match mode {
            ViewMode::Rendering => ViewMode::Mixing,
            m => m,
        };
        self.settings.current_view = self.current_view;

        let ineligible: Vec<Uuid> = match self.views.get(self.current_view) {
            Some(view) => self.session.iter().filter(|s| !view.can_select(s)).map(Source::id).collect(),
            None => Vec::new(),
        };
        for id in ineligible {
            self.deselect(id);
        }
        self.views.request_deep_update();
        debug!("View set to {}", self.current_view);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::thread;

    use crate::entities::SyntheticStreams;
    use crate::views::View;

    pub(crate) fn mixer() -> Mixer {
        Mixer::new(Settings::default(), Arc::new(SyntheticStreams::default()))
    }

    pub(crate) fn render_source(name: &str) -> Source {
        let mut s = Source::new(SourceKind::Render, StageConfig::default());
        s.set_name(name);
        s
    }

    /// Run frames until `done` holds, leaving time to the workers.
    pub(crate) fn run_until(m: &mut Mixer, done: impl Fn(&Mixer) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            m.advance(16.0);
            if done(m) {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_one_insertion_per_frame() {
        let mut m = mixer();
        m.add_source(render_source("a"));
        m.add_source(render_source("b"));
        m.add_source(render_source("c"));

        m.advance(16.0);
        assert_eq!(m.session().len(), 1);
        assert!(m.current_source().is_none());
        m.advance(16.0);
        assert_eq!(m.session().len(), 2);
        m.advance(16.0);
        assert_eq!(m.session().len(), 3);
        assert_eq!(m.current_source().map(|s| s.name()), Some("c"));
        assert_eq!(m.pending_candidates(), 0);
    }

    #[test]
    fn test_swap_is_atomic_for_views() {
        let mut m = mixer();
        m.insert_source(render_source("old1"), None);
        m.insert_source(render_source("old2"), None);
        let old_ids = m.session().ids();

        let mut next = Session::default();
        let new_id = next.add_source(render_source("new"));
        next.set_fading(0.4);
        m.session_mut().set_fading(0.1);
        m.set(next);
        assert!(m.swap_pending());
        // still live until the update
        assert!(old_ids.iter().all(|id| m.views().is_attached(*id)));

        m.advance(16.0);
        assert!(!m.swap_pending());
        assert!(old_ids.iter().all(|id| !m.views().is_attached(*id)));
        assert!(m.views().is_attached(new_id));
        assert!((m.session().fading() - 0.4).abs() < 1e-6);
        assert!(m.current_source().is_none());
        assert_eq!(m.garbage_len(), 1);

        m.advance(16.0);
        assert_eq!(m.garbage_len(), 0);
    }

    #[test]
    fn test_set_twice_keeps_one_back_session() {
        let mut m = mixer();
        m.set(Session::default());
        let mut second = Session::default();
        second.add_source(render_source("second"));
        m.set(second);
        assert_eq!(m.garbage_len(), 1);
        m.advance(16.0);
        assert_eq!(m.session().len(), 1);
    }

    #[test]
    fn test_set_view_deselects_ineligible() {
        let mut m = mixer();
        let a = m.insert_source(render_source("a"), None);
        let b = m.insert_source(render_source("b"), None);
        m.select(a);
        m.select(b);
        m.session_mut().find_mut(b).unwrap().set_locked(true);

        m.set_view(ViewMode::Geometry);
        assert!(m.selection().contains(a));
        assert!(!m.selection().contains(b));
        assert_eq!(m.settings().current_view, ViewMode::Geometry);

        m.set_view(ViewMode::Appearance);
        assert!(m.selection().is_empty());
    }

    #[test]
    fn test_failed_media_is_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"x").unwrap();
        let streams = SyntheticStreams { broken: vec![path.clone()], ..SyntheticStreams::default() };
        let mut m = Mixer::new(Settings::default(), Arc::new(streams));

        let s = m.create_source_file(&path).unwrap();
        assert!(m.settings().recent_imports.contains(&path.display().to_string()));
        let id = m.insert_source(s, None);
        m.advance(16.0);
        assert!(!m.session().contains(id));
        assert!(!m.settings().recent_imports.contains(&path.display().to_string()));
    }

    #[test]
    fn test_failed_render_is_recreated_once() {
        let mut m = mixer();
        let s = m.create_source_render();
        let id = m.insert_source(s, None);
        m.advance(16.0);
        assert!(m.session().find(id).unwrap().ready());

        m.session_mut().set_resolution(UVec2::new(640, 480));
        m.advance(16.0);
        let s = m.session().find(id).expect("recreated in place");
        assert!(s.recreated());
        assert_eq!(m.session().len(), 1);
    }

    #[test]
    fn test_transition_hands_session_over() {
        let mut m = mixer();
        m.settings_mut().smooth_transition = true;
        m.views_mut().transition.set_duration(32.0);
        m.insert_source(render_source("before"), None);

        m.close();
        assert_eq!(m.current_view(), ViewMode::Transition);
        run_until(&mut m, |m| m.current_view() == ViewMode::Mixing && !m.swap_pending());
        // the swap happens on the update after leaving the transition
        m.advance(16.0);
        assert!(m.session().is_empty());
        assert!(m.views().mixing.scene().workspace.is_empty());
    }

    #[test]
    fn test_grabbers_see_every_frame() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Debug)]
        struct Counter(Arc<AtomicUsize>, usize);
        impl FrameGrabber for Counter {
            fn grab(&mut self, _frame: &crate::entities::FrameBuffer, _dt: f32) {
                self.0.fetch_add(1, Ordering::SeqCst);
                self.1 -= 1;
            }
            fn finished(&self) -> bool {
                self.1 == 0
            }
        }

        let mut m = mixer();
        let count = Arc::new(AtomicUsize::new(0));
        m.add_grabber(Box::new(Counter(Arc::clone(&count), 3)));
        for _ in 0..5 {
            m.advance(16.0);
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
