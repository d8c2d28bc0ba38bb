//! Core plumbing - events, undo history, workers
//!
//! Independent of sources and views; the mixer is built on top.

pub mod event_bus;
pub mod history;
pub mod mixer_events;
pub mod workers;

// Re-exports for convenience
pub use event_bus::{EventBus, Notifier};
pub use history::History;
pub use workers::Workers;
