//! Events published by the mixer for the host application.

use std::path::PathBuf;
use uuid::Uuid;

/// User-facing message (warnings, failures, confirmations).
#[derive(Clone, Debug, PartialEq)]
pub struct NotifyEvent {
    pub level: log::Level,
    pub message: String,
}

impl NotifyEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: log::Level::Info, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: log::Level::Warn, message: message.into() }
    }
}

#[derive(Clone, Debug)]
pub struct SessionLoadedEvent {
    pub filename: Option<PathBuf>,
    pub sources: usize,
}

#[derive(Clone, Debug)]
pub struct SessionSavedEvent(pub PathBuf);

#[derive(Clone, Debug)]
pub struct SessionSwappedEvent {
    pub sources: usize,
}

#[derive(Clone, Debug)]
pub struct SourceInsertedEvent {
    pub id: Uuid,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct SourceDeletedEvent {
    pub id: Uuid,
    pub name: String,
}

/// A source stopped working during the frame update.
#[derive(Clone, Debug)]
pub struct SourceFailedEvent {
    pub id: Uuid,
    pub name: String,
    /// A replacement was created in place of the failed source.
    pub recreated: bool,
}

#[derive(Clone, Debug)]
pub struct CurrentSourceChangedEvent(pub Option<Uuid>);
