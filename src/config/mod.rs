//! Application configuration: stage thresholds, user settings, paths.

pub mod paths;

pub use paths::{config_file, data_file, ensure_dirs, PathConfig};

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec2;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::views::ViewMode;

/// Numeric thresholds of the interaction model.
///
/// All view-space constants the sources and views depend on live here so a
/// host can tune them without touching code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Where new sources land in the mixing view.
    pub default_mixing_translation: Vec2,
    /// Beyond this distance from the mixing center a source is inactive.
    pub mixing_limbo_radius: f32,
    pub mixing_icon_scale: f32,
    pub inactive_icon_shrink: f32,
    /// Lower bound on |scale| for geometry transforms.
    pub min_scale: f32,
    pub layer_perspective: f32,
    pub foreground_depth: f32,
    pub background_depth: f32,
    pub max_depth: f32,
    pub min_depth: f32,
    pub layer_step_foreground: f32,
    pub layer_step_stage: f32,
    /// Corner icons shift right by this much per unit of aspect above 1.
    pub icon_aspect_offset: f32,
    pub clone_depth_offset: f32,
    pub mask_buffer_ratio: f32,
    pub poll_timeout_ms: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            default_mixing_translation: Vec2::new(-1.0, 1.0),
            mixing_limbo_radius: 1.3,
            mixing_icon_scale: 0.15,
            inactive_icon_shrink: 0.03,
            min_scale: 0.01,
            layer_perspective: 2.0,
            foreground_depth: 10.0,
            background_depth: 2.0,
            max_depth: 12.0,
            min_depth: 0.0,
            layer_step_foreground: 0.3,
            layer_step_stage: 0.15,
            icon_aspect_offset: 0.1,
            clone_depth_offset: 0.2,
            mask_buffer_ratio: 0.5,
            poll_timeout_ms: 4,
        }
    }
}

impl StageConfig {
    /// Scale clamp keeping sign: `sign(x) * max(min_scale, |x|)`.
    pub fn clamp_scale(&self, x: f32) -> f32 {
        let sign = if x < 0.0 { -1.0 } else { 1.0 };
        sign * x.abs().max(self.min_scale)
    }
}

/// Bounded most-recent-first list of file names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentList {
    pub filenames: VecDeque<String>,
    pub max: usize,
}

impl Default for RecentList {
    fn default() -> Self {
        Self { filenames: VecDeque::new(), max: 10 }
    }
}

impl RecentList {
    /// Move `name` to the front, dropping duplicates and overflow.
    pub fn push(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.filenames.retain(|f| *f != name);
        self.filenames.push_front(name);
        self.filenames.truncate(self.max);
    }

    pub fn remove(&mut self, name: &str) {
        self.filenames.retain(|f| f != name);
    }

    pub fn front(&self) -> Option<&str> {
        self.filenames.front().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filenames.iter().any(|f| f == name)
    }
}

/// Persistent user settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub recent_sessions: RecentList,
    pub recent_imports: RecentList,
    /// Fade between sessions through the transition view.
    pub smooth_transition: bool,
    /// Reopen the most recent session on startup.
    pub load_at_start: bool,
    pub current_view: ViewMode,
    /// Rendering resolution for new sessions.
    pub resolution: [u32; 2],
    pub stage: StageConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recent_sessions: RecentList::default(),
            recent_imports: RecentList::default(),
            smooth_transition: false,
            load_at_start: false,
            current_view: ViewMode::Mixing,
            resolution: [1280, 720],
            stage: StageConfig::default(),
        }
    }
}

impl Settings {
    /// Read settings, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring settings file: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}
