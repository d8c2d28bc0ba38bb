//! MIXA - live video mixing engine
//!
//! Re-exports all modules for use by the binary target and by hosts
//! embedding the mixer.

// Core plumbing (events, undo history, workers)
pub mod core;

pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod mixer;
pub mod utils;
pub mod views;

// Re-export commonly used types from core
pub use crate::core::event_bus::{BoxedEvent, EventBus, downcast_event};
pub use crate::core::mixer_events;

pub use config::{Settings, StageConfig};
pub use entities::{DefaultStreams, Session, Source, SourceKind, SourceMode, StreamFactory};
pub use error::{MixError, MixResult};
pub use mixer::{FrameGrabber, Mixer};
pub use views::ViewMode;
