//! Error taxonomy for session I/O and source hydration.
//!
//! Runtime failures of sources are not errors: they are detected during
//! `Mixer::update` and surface as notifications. Only file and document
//! handling returns `MixError`.

use std::path::{Path, PathBuf};

/// Convenience result type used across the crate.
pub type MixResult<T> = Result<T, MixError>;

#[derive(thiserror::Error, Debug)]
pub enum MixError {
    /// File could not be read or written.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid JSON for the session schema.
    #[error("{path}: malformed session document: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Document parsed but carries no session header.
    #[error("{0} is not a mixa session file")]
    NotASession(PathBuf),

    /// A single source record could not be turned into a source.
    #[error("invalid source record: {0}")]
    InvalidRecord(String),

    /// Mask image encoding or decoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MixError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse { path: path.into(), source }
    }

    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// File the error is about, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. } | Self::Parse { path, .. } | Self::NotASession(path) => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_path() {
        let err = MixError::io(
            "/tmp/missing.mix",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/missing.mix"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_anyhow_converts() {
        let err: MixError = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
